//! Motion-JPEG over HTTP
//!
//! Cameras serve MJPEG as `multipart/x-mixed-replace`, one JPEG per part.
//! Rather than trusting part headers (many cameras get `Content-Length`
//! wrong), images are cut from the byte stream by walking their marker
//! segments up to the scan data, then scanning for EOI. Walking the header
//! segments skips embedded EXIF thumbnails, which carry their own EOI.

use std::io::{self, Read};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use image::ImageFormat;
use reqwest::header::CONTENT_TYPE;

use super::VideoSource;
use crate::errors::RecorderError;
use crate::types::{Frame, SourceProperties};

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];
const SOS: u8 = 0xDA;
const READ_CHUNK: usize = 16 * 1024;
const MAX_IMAGE_BYTES: usize = 32 * 1024 * 1024;

/// Header some MJPEG servers use to advertise their frame rate
const FRAMERATE_HEADER: &str = "x-framerate";

/// Where the reader is within the buffered bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    /// Looking for the next SOI
    Idle,
    /// Walking header segments; offset of the next marker
    Header(usize),
    /// Inside entropy-coded data; offset to resume the EOI search from
    Entropy(usize),
}

/// Outcome of inspecting one header segment
#[derive(Debug, PartialEq, Eq)]
enum Segment {
    Incomplete,
    Next(usize),
    StartOfScan(usize),
    End(usize),
    Corrupt,
}

/// Splits a byte stream into complete JPEG images
pub struct JpegStreamReader<R> {
    inner: R,
    buffer: BytesMut,
    scan: Scan,
}

impl<R: Read> JpegStreamReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: BytesMut::with_capacity(READ_CHUNK * 4),
            scan: Scan::Idle,
        }
    }

    /// Next complete JPEG image, or `None` once the stream ends
    ///
    /// A trailing partial image at end of stream is discarded.
    pub fn next_image(&mut self) -> io::Result<Option<Bytes>> {
        loop {
            if let Some(image) = self.take_image() {
                return Ok(Some(image));
            }

            if self.buffer.len() > MAX_IMAGE_BYTES {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("JPEG image exceeds {} bytes", MAX_IMAGE_BYTES),
                ));
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if n == 0 {
                return Ok(None);
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    fn take_image(&mut self) -> Option<Bytes> {
        loop {
            match self.scan {
                Scan::Idle => match find_marker(&self.buffer, SOI, 0) {
                    Some(start) => {
                        let _ = self.buffer.split_to(start);
                        self.scan = Scan::Header(SOI.len());
                    }
                    None => {
                        // Keep a trailing 0xFF in case the marker straddles reads
                        let keep = usize::from(self.buffer.last() == Some(&0xFF));
                        let drop = self.buffer.len() - keep;
                        let _ = self.buffer.split_to(drop);
                        return None;
                    }
                },
                Scan::Header(pos) => match next_segment(&self.buffer, pos) {
                    Segment::Incomplete => return None,
                    Segment::Next(next) => self.scan = Scan::Header(next),
                    Segment::StartOfScan(data) => self.scan = Scan::Entropy(data),
                    Segment::End(end) => return Some(self.finish_image(end)),
                    // Not a well-formed header; fall back to a plain EOI search
                    Segment::Corrupt => self.scan = Scan::Entropy(pos),
                },
                Scan::Entropy(pos) => match find_marker(&self.buffer, EOI, pos) {
                    Some(end) => return Some(self.finish_image(end + EOI.len())),
                    None => {
                        self.scan = Scan::Entropy(self.buffer.len().saturating_sub(1).max(pos));
                        return None;
                    }
                },
            }
        }
    }

    fn finish_image(&mut self, len: usize) -> Bytes {
        self.scan = Scan::Idle;
        self.buffer.split_to(len).freeze()
    }
}

/// Inspect the marker segment starting at `pos`
fn next_segment(buf: &[u8], pos: usize) -> Segment {
    if buf.len() < pos + 2 {
        return Segment::Incomplete;
    }
    if buf[pos] != 0xFF {
        return Segment::Corrupt;
    }
    match buf[pos + 1] {
        // Fill byte before a marker
        0xFF => Segment::Next(pos + 1),
        0xD9 => Segment::End(pos + 2),
        0xD8 => Segment::Corrupt,
        // Standalone markers carry no length
        0x01 | 0xD0..=0xD7 => Segment::Next(pos + 2),
        marker => {
            if buf.len() < pos + 4 {
                return Segment::Incomplete;
            }
            let len = usize::from(u16::from_be_bytes([buf[pos + 2], buf[pos + 3]]));
            if len < 2 {
                return Segment::Corrupt;
            }
            let next = pos + 2 + len;
            if marker == SOS {
                Segment::StartOfScan(next)
            } else {
                Segment::Next(next)
            }
        }
    }
}

fn find_marker(haystack: &[u8], marker: [u8; 2], from: usize) -> Option<usize> {
    if haystack.len() < from + 2 {
        return None;
    }
    haystack[from..]
        .windows(2)
        .position(|w| w == marker)
        .map(|pos| pos + from)
}

/// A `VideoSource` reading an MJPEG byte stream
pub struct MjpegSource {
    reader: JpegStreamReader<Box<dyn Read + Send>>,
    properties: SourceProperties,
    pending: Option<Frame>,
    next_sequence: u64,
}

impl MjpegSource {
    /// Connect to an HTTP stream, keeping it only if it carries MJPEG
    ///
    /// Returns `Ok(None)` when the server answers with another content type.
    /// `read_timeout` bounds the wait for headers and each later body read,
    /// so a stalled camera ends the recording instead of blocking it.
    pub fn connect(
        url: &str,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Option<Self>, RecorderError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .build()
            .map_err(|e| RecorderError::DeviceOpen(format!("Failed to build HTTP client: {}", e)))?;

        let response = client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| RecorderError::DeviceOpen(format!("{}: {}", url, e)))?;

        if let Some(content_type) = response.headers().get(CONTENT_TYPE) {
            let content_type = content_type.to_str().unwrap_or_default().to_ascii_lowercase();
            if !is_mjpeg_content_type(&content_type) {
                log::debug!("{} serves {:?}, not MJPEG", url, content_type);
                return Ok(None);
            }
        }

        let reported_fps = response
            .headers()
            .get(FRAMERATE_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<f64>().ok())
            .unwrap_or(0.0);

        log::debug!("Opened MJPEG stream {} (reported fps {})", url, reported_fps);
        Self::from_reader(response, reported_fps).map(Some)
    }

    /// Build a source over any byte stream carrying concatenated JPEG images
    ///
    /// The first image is decoded up front to learn the frame dimensions and
    /// is replayed by the first `read_frame`.
    pub fn from_reader<R: Read + Send + 'static>(
        reader: R,
        reported_fps: f64,
    ) -> Result<Self, RecorderError> {
        let mut reader = JpegStreamReader::new(Box::new(reader) as Box<dyn Read + Send>);

        let first = reader
            .next_image()
            .map_err(|e| RecorderError::DeviceOpen(format!("Failed to read stream: {}", e)))?
            .ok_or_else(|| {
                RecorderError::DeviceOpen("Stream ended before the first frame".to_string())
            })?;

        let frame = decode_jpeg(&first, 0)
            .map_err(|e| RecorderError::DeviceOpen(format!("First frame unreadable: {}", e)))?;

        Ok(Self {
            reader,
            properties: SourceProperties {
                width: frame.width,
                height: frame.height,
                fps: reported_fps,
            },
            pending: Some(frame),
            next_sequence: 1,
        })
    }
}

impl VideoSource for MjpegSource {
    fn properties(&self) -> SourceProperties {
        self.properties
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, RecorderError> {
        if let Some(frame) = self.pending.take() {
            return Ok(Some(frame));
        }

        let Some(image) = self
            .reader
            .next_image()
            .map_err(|e| RecorderError::Stream(format!("Failed to read stream: {}", e)))?
        else {
            return Ok(None);
        };

        let frame = decode_jpeg(&image, self.next_sequence)?;
        self.next_sequence += 1;
        Ok(Some(frame))
    }
}

fn is_mjpeg_content_type(content_type: &str) -> bool {
    content_type.starts_with("multipart/x-mixed-replace")
        || content_type.starts_with("image/jpeg")
        || content_type.starts_with("image/jpg")
        || content_type.starts_with("video/x-motion-jpeg")
}

fn decode_jpeg(data: &[u8], sequence: u64) -> Result<Frame, RecorderError> {
    let image = image::load_from_memory_with_format(data, ImageFormat::Jpeg)
        .map_err(|e| RecorderError::Stream(format!("Failed to decode JPEG frame: {}", e)))?
        .to_rgb8();
    let (width, height) = image.dimensions();
    Ok(Frame::new(sequence, width, height, image.into_raw()))
}
