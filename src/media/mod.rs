//! Video source and sink abstractions
//!
//! A source yields decoded frames from a stream URL; a sink appends them to a
//! recording file. A `MediaBackend` opens both, which keeps the session
//! independent of where frames come from.

#[cfg(feature = "ffmpeg")]
mod ffmpeg;
mod mjpeg;

#[cfg(feature = "ffmpeg")]
pub use ffmpeg::FfmpegSource;
pub use mjpeg::{JpegStreamReader, MjpegSource};

use std::path::Path;
use std::time::Duration;

use crate::errors::RecorderError;
use crate::recording::{Mp4Writer, RecordingConfig, RecordingStats};
use crate::types::{Frame, SourceProperties};

/// A sequential frame producer
pub trait VideoSource: Send {
    fn properties(&self) -> SourceProperties;

    /// Read the next frame. `Ok(None)` means the source is exhausted.
    fn read_frame(&mut self) -> Result<Option<Frame>, RecorderError>;
}

/// An in-order frame writer backed by a file
pub trait VideoSink: Send {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), RecorderError>;

    fn frames_written(&self) -> u64;

    /// Finalize the file and report what was written
    fn finish(self: Box<Self>) -> Result<RecordingStats, RecorderError>;
}

/// Opens sources and sinks for a recording
pub trait MediaBackend {
    fn open_source(&self, url: &str) -> Result<Box<dyn VideoSource>, RecorderError>;

    fn open_sink(
        &self,
        path: &Path,
        config: &RecordingConfig,
    ) -> Result<Box<dyn VideoSink>, RecorderError>;
}

impl<B: MediaBackend + ?Sized> MediaBackend for &B {
    fn open_source(&self, url: &str) -> Result<Box<dyn VideoSource>, RecorderError> {
        (**self).open_source(url)
    }

    fn open_sink(
        &self,
        path: &Path,
        config: &RecordingConfig,
    ) -> Result<Box<dyn VideoSink>, RecorderError> {
        (**self).open_sink(path, config)
    }
}

/// Crops frames to even dimensions for 4:2:0 encoding
pub struct EvenCrop {
    inner: Box<dyn VideoSource>,
    properties: SourceProperties,
}

/// Wrap `source` so its frames have even dimensions
///
/// Sources that are already even are returned unchanged.
pub fn crop_to_even(source: Box<dyn VideoSource>) -> Box<dyn VideoSource> {
    let props = source.properties();
    let (width, height) = props.even_dimensions();
    if (width, height) == (props.width, props.height) {
        return source;
    }

    log::info!(
        "Cropping {}x{} stream to {}x{}",
        props.width,
        props.height,
        width,
        height
    );
    Box::new(EvenCrop {
        inner: source,
        properties: SourceProperties {
            width,
            height,
            ..props
        },
    })
}

impl VideoSource for EvenCrop {
    fn properties(&self) -> SourceProperties {
        self.properties
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, RecorderError> {
        let (width, height) = (self.properties.width, self.properties.height);
        Ok(self.inner.read_frame()?.map(|frame| frame.crop(width, height)))
    }
}

/// MJPEG-over-HTTP or FFmpeg ingress with H.264/MP4 output
///
/// HTTP URLs are tried as MJPEG first; anything else, and HTTP streams of
/// another content type, go to FFmpeg.
#[derive(Debug, Clone)]
pub struct DefaultBackend {
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl DefaultBackend {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            read_timeout,
        }
    }
}

impl Default for DefaultBackend {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(10))
    }
}

impl MediaBackend for DefaultBackend {
    fn open_source(&self, url: &str) -> Result<Box<dyn VideoSource>, RecorderError> {
        if is_http_url(url) {
            if let Some(source) = MjpegSource::connect(url, self.connect_timeout, self.read_timeout)? {
                return Ok(Box::new(source));
            }
        }
        open_demuxed(url, self.read_timeout)
    }

    fn open_sink(
        &self,
        path: &Path,
        config: &RecordingConfig,
    ) -> Result<Box<dyn VideoSink>, RecorderError> {
        let writer = Mp4Writer::new(path, config.clone())?;
        Ok(Box::new(writer))
    }
}

fn is_http_url(url: &str) -> bool {
    reqwest::Url::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

#[cfg(feature = "ffmpeg")]
fn open_demuxed(url: &str, read_timeout: Duration) -> Result<Box<dyn VideoSource>, RecorderError> {
    Ok(Box::new(FfmpegSource::open(url, read_timeout)?))
}

#[cfg(not(feature = "ffmpeg"))]
fn open_demuxed(url: &str, _read_timeout: Duration) -> Result<Box<dyn VideoSource>, RecorderError> {
    Err(RecorderError::DeviceOpen(format!(
        "Unsupported stream {} (built without the ffmpeg feature)",
        url
    )))
}
