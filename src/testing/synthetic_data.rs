//! Synthetic sources, sinks and payloads

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::errors::RecorderError;
use crate::media::{MediaBackend, VideoSink, VideoSource};
use crate::recording::{Mp4Writer, RecordingConfig, RecordingStats};
use crate::types::{Frame, SourceProperties};

/// A gradient frame that changes with `sequence`
pub fn synthetic_frame(sequence: u64, width: u32, height: u32) -> Frame {
    let mut data = vec![0u8; (width as usize) * (height as usize) * 3];
    let base = (sequence % 256) as u8;
    for y in 0..height {
        for x in 0..width {
            let idx = ((y * width + x) * 3) as usize;
            data[idx] = base.wrapping_add((x % 256) as u8);
            data[idx + 1] = base.wrapping_add((y % 256) as u8);
            data[idx + 2] = base.wrapping_add(((x + y) % 256) as u8);
        }
    }
    Frame::new(sequence, width, height, data)
}

/// A frame of pseudo-random pixels, the worst case for rate control
pub fn noise_frame(sequence: u64, width: u32, height: u32) -> Frame {
    let mut state = sequence.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    let data = (0..(width as usize) * (height as usize) * 3)
        .map(|_| {
            // xorshift64
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 56) as u8
        })
        .collect();
    Frame::new(sequence, width, height, data)
}

/// Encode a flat-shaded JPEG of the given size
pub fn encode_test_jpeg(width: u32, height: u32, shade: u8) -> Vec<u8> {
    let rgb = vec![shade; (width as usize) * (height as usize) * 3];
    let mut out = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut out, 80);
        if let Err(e) = encoder.encode(&rgb, width, height, ExtendedColorType::Rgb8) {
            log::error!("Failed to encode test JPEG: {}", e);
        }
    }
    out
}

/// Frame source producing gradients, optionally bounded
pub struct SyntheticSource {
    properties: SourceProperties,
    remaining: Option<u64>,
    fail_after: Option<u64>,
    interval: Duration,
    next_sequence: u64,
}

impl SyntheticSource {
    /// `frame_limit` of `None` produces frames forever
    pub fn new(properties: SourceProperties, frame_limit: Option<u64>) -> Self {
        Self {
            properties,
            remaining: frame_limit,
            fail_after: None,
            interval: Duration::ZERO,
            next_sequence: 0,
        }
    }

    /// Pause between frames, like a live camera
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Fail the read after `frames` successful ones
    pub fn failing_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }
}

impl VideoSource for SyntheticSource {
    fn properties(&self) -> SourceProperties {
        self.properties
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, RecorderError> {
        if self.fail_after == Some(self.next_sequence) {
            return Err(RecorderError::Stream("synthetic read failure".to_string()));
        }
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Ok(None);
            }
            *remaining -= 1;
        }
        if !self.interval.is_zero() {
            std::thread::sleep(self.interval);
        }

        let frame = synthetic_frame(self.next_sequence, self.properties.width, self.properties.height);
        self.next_sequence += 1;
        Ok(Some(frame))
    }
}

/// What a `SyntheticBackend` was asked to do
#[derive(Debug, Default)]
pub struct BackendLog {
    pub sources_opened: Vec<String>,
    pub sinks_opened: Vec<(PathBuf, RecordingConfig)>,
    pub frames_written: u64,
    pub sinks_finished: u64,
}

/// Sink that counts frames into a shared log and leaves an empty file behind
pub struct MemorySink {
    config: RecordingConfig,
    path: PathBuf,
    frames: u64,
    log: Arc<Mutex<BackendLog>>,
}

impl MemorySink {
    pub fn create(
        path: &Path,
        config: RecordingConfig,
        log: Arc<Mutex<BackendLog>>,
    ) -> Result<Self, RecorderError> {
        File::create(path)?;
        Ok(Self {
            config,
            path: path.to_path_buf(),
            frames: 0,
            log,
        })
    }
}

impl VideoSink for MemorySink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), RecorderError> {
        if frame.width != self.config.width || frame.height != self.config.height {
            return Err(RecorderError::Encoding(format!(
                "Frame dimensions {}x{} don't match recording config {}x{}",
                frame.width, frame.height, self.config.width, self.config.height
            )));
        }
        self.frames += 1;
        if let Ok(mut log) = self.log.lock() {
            log.frames_written += 1;
        }
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames
    }

    fn finish(self: Box<Self>) -> Result<RecordingStats, RecorderError> {
        if let Ok(mut log) = self.log.lock() {
            log.sinks_finished += 1;
        }
        Ok(RecordingStats {
            video_frames: self.frames,
            duration_secs: self.frames as f64 / self.config.fps,
            bytes_written: 0,
            skipped_frames: 0,
            output_path: self.path.to_string_lossy().to_string(),
        })
    }
}

/// In-process backend pairing `SyntheticSource` with `MemorySink` or `Mp4Writer`
pub struct SyntheticBackend {
    properties: SourceProperties,
    frame_limit: Option<u64>,
    fail_after: Option<u64>,
    interval: Duration,
    fail_open: bool,
    mp4_output: bool,
    log: Arc<Mutex<BackendLog>>,
}

impl SyntheticBackend {
    pub fn new(properties: SourceProperties, frame_limit: Option<u64>) -> Self {
        Self {
            properties,
            frame_limit,
            fail_after: None,
            interval: Duration::ZERO,
            fail_open: false,
            mp4_output: false,
            log: Arc::new(Mutex::new(BackendLog::default())),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn failing_reads_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }

    /// Refuse to open sources, like an unreachable camera
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Write real MP4 files instead of counting frames
    pub fn with_mp4_output(mut self) -> Self {
        self.mp4_output = true;
        self
    }

    pub fn log(&self) -> Arc<Mutex<BackendLog>> {
        Arc::clone(&self.log)
    }
}

impl MediaBackend for SyntheticBackend {
    fn open_source(&self, url: &str) -> Result<Box<dyn VideoSource>, RecorderError> {
        if let Ok(mut log) = self.log.lock() {
            log.sources_opened.push(url.to_string());
        }
        if self.fail_open {
            return Err(RecorderError::DeviceOpen(format!("synthetic source refused {}", url)));
        }

        let mut source =
            SyntheticSource::new(self.properties, self.frame_limit).with_interval(self.interval);
        if let Some(frames) = self.fail_after {
            source = source.failing_after(frames);
        }
        Ok(Box::new(source))
    }

    fn open_sink(
        &self,
        path: &Path,
        config: &RecordingConfig,
    ) -> Result<Box<dyn VideoSink>, RecorderError> {
        if let Ok(mut log) = self.log.lock() {
            log.sinks_opened.push((path.to_path_buf(), config.clone()));
        }
        if self.mp4_output {
            Ok(Box::new(Mp4Writer::new(path, config.clone())?))
        } else {
            Ok(Box::new(MemorySink::create(path, config.clone(), self.log())?))
        }
    }
}
