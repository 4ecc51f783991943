//! Streams demuxed and decoded by FFmpeg
//!
//! Covers everything that is not served as MJPEG over HTTP: RTSP, progressive
//! MP4 or HLS over HTTP, and local files. The best video stream is decoded and
//! each picture converted to RGB24 at the size of the first decoded frame.

use std::time::Duration;

use ffmpeg_next as ffmpeg;
use ffmpeg::format::{context, Pixel};
use ffmpeg::software::scaling::{context::Context as Scaler, flag::Flags};
use ffmpeg::util::frame::video::Video as VideoFrame;
use ffmpeg::{codec, decoder, media, Dictionary, Packet, Rational};

use super::VideoSource;
use crate::errors::RecorderError;
use crate::types::{Frame, SourceProperties};

/// Rates above this are container time bases, not frame rates
const MAX_PLAUSIBLE_FPS: f64 = 240.0;

struct ScalerState {
    scaler: Scaler,
    input: (Pixel, u32, u32),
}

/// A `VideoSource` over any URL or path FFmpeg can open
pub struct FfmpegSource {
    input: context::Input,
    stream_index: usize,
    decoder: decoder::Video,
    scaler: Option<ScalerState>,
    properties: SourceProperties,
    pending: Option<Frame>,
    next_sequence: u64,
    draining: bool,
}

// SAFETY: the demuxer, decoder and scaler are owned exclusively by this value
// and only used through `&mut self`, so moving them together to the capture
// thread is sound.
unsafe impl Send for FfmpegSource {}

impl FfmpegSource {
    /// Open `url` and decode its first frame to learn the dimensions
    ///
    /// `read_timeout` bounds each blocking network read.
    pub fn open(url: &str, read_timeout: Duration) -> Result<Self, RecorderError> {
        ffmpeg::init()
            .map_err(|e| RecorderError::DeviceOpen(format!("Failed to initialise FFmpeg: {}", e)))?;
        ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Warning);

        let micros = read_timeout.as_micros().to_string();
        let mut options = Dictionary::new();
        options.set("rw_timeout", &micros);
        if url.starts_with("rtsp://") || url.starts_with("rtsps://") {
            options.set("timeout", &micros);
        }

        let input = ffmpeg::format::input_with_dictionary(url, options)
            .map_err(|e| RecorderError::DeviceOpen(format!("{}: {}", url, e)))?;

        let (stream_index, fps, parameters) = {
            let stream = input.streams().best(media::Type::Video).ok_or_else(|| {
                RecorderError::DeviceOpen(format!("No video stream at {}", url))
            })?;
            let fps = plausible_fps(stream.avg_frame_rate())
                .or_else(|| plausible_fps(stream.rate()))
                .unwrap_or(0.0);
            (stream.index(), fps, stream.parameters())
        };

        let decoder = codec::context::Context::from_parameters(parameters)
            .and_then(|context| context.decoder().video())
            .map_err(|e| RecorderError::DeviceOpen(format!("No decoder for {}: {}", url, e)))?;

        let mut source = Self {
            input,
            stream_index,
            decoder,
            scaler: None,
            properties: SourceProperties {
                width: 0,
                height: 0,
                fps,
            },
            pending: None,
            next_sequence: 0,
            draining: false,
        };

        let first = source
            .next_picture()
            .map_err(|e| RecorderError::DeviceOpen(format!("First frame unreadable: {}", e)))?
            .ok_or_else(|| {
                RecorderError::DeviceOpen("Stream ended before the first frame".to_string())
            })?;
        source.properties.width = first.width;
        source.properties.height = first.height;
        source.pending = Some(first);

        log::debug!(
            "Opened {} via FFmpeg ({}x{}, reported fps {})",
            url,
            source.properties.width,
            source.properties.height,
            fps
        );
        Ok(source)
    }

    fn next_picture(&mut self) -> Result<Option<Frame>, RecorderError> {
        let mut decoded = VideoFrame::empty();
        loop {
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => return self.convert(&decoded).map(Some),
                Err(ffmpeg::Error::Eof) => return Ok(None),
                // EAGAIN: the decoder wants more input
                Err(ffmpeg::Error::Other { .. }) => {}
                Err(e) => return Err(RecorderError::Stream(format!("Failed to decode frame: {}", e))),
            }
            if self.draining {
                return Ok(None);
            }

            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() != self.stream_index {
                        continue;
                    }
                    // Broken packets are common on lossy transports; skip them
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        log::debug!("Dropping undecodable packet: {}", e);
                    }
                }
                Err(ffmpeg::Error::Eof) => {
                    self.draining = true;
                    self.decoder.send_eof().map_err(|e| {
                        RecorderError::Stream(format!("Failed to flush decoder: {}", e))
                    })?;
                }
                Err(e) => return Err(RecorderError::Stream(format!("Failed to read packet: {}", e))),
            }
        }
    }

    fn convert(&mut self, decoded: &VideoFrame) -> Result<Frame, RecorderError> {
        let input = (decoded.format(), decoded.width(), decoded.height());
        let (width, height) = if self.properties.width == 0 {
            (input.1, input.2)
        } else {
            (self.properties.width, self.properties.height)
        };

        // Mid-stream size or format changes are scaled back to the opening size
        if self.scaler.as_ref().map_or(true, |state| state.input != input) {
            let scaler = Scaler::get(input.0, input.1, input.2, Pixel::RGB24, width, height, Flags::BILINEAR)
                .map_err(|e| RecorderError::Stream(format!("Failed to create scaler: {}", e)))?;
            self.scaler = Some(ScalerState { scaler, input });
        }
        let Some(state) = self.scaler.as_mut() else {
            return Err(RecorderError::Stream("Scaler unavailable".to_string()));
        };

        let mut rgb = VideoFrame::empty();
        state
            .scaler
            .run(decoded, &mut rgb)
            .map_err(|e| RecorderError::Stream(format!("Failed to convert frame: {}", e)))?;

        let stride = rgb.stride(0);
        let row_len = width as usize * 3;
        let mut data = Vec::with_capacity(row_len * height as usize);
        for row in rgb.data(0).chunks(stride).take(height as usize) {
            data.extend_from_slice(&row[..row_len]);
        }

        let frame = Frame::new(self.next_sequence, width, height, data);
        self.next_sequence += 1;
        Ok(frame)
    }
}

impl VideoSource for FfmpegSource {
    fn properties(&self) -> SourceProperties {
        self.properties
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, RecorderError> {
        if let Some(frame) = self.pending.take() {
            return Ok(Some(frame));
        }
        self.next_picture()
    }
}

fn plausible_fps(rate: Rational) -> Option<f64> {
    if rate.numerator() <= 0 || rate.denominator() <= 0 {
        return None;
    }
    let fps = f64::from(rate.numerator()) / f64::from(rate.denominator());
    (fps <= MAX_PLAUSIBLE_FPS).then_some(fps)
}
