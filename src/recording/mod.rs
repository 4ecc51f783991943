//! MP4 recording
//!
//! Frames are encoded to H.264 with openh264 and muxed into MP4 with muxide.
//!
//! # Example
//! ```rust,ignore
//! use ipcam_recorder::recording::{Mp4Writer, RecordingConfig};
//!
//! let config = RecordingConfig::new(1280, 720, 30.0);
//! let mut writer = Mp4Writer::new("output.mp4", config)?;
//!
//! // In your frame loop:
//! writer.write_rgb_frame(&rgb, 1280, 720)?;
//!
//! // When done:
//! let stats = writer.finish()?;
//! ```

mod config;
mod encoder;
mod recorder;

pub use config::{RecordingConfig, RecordingStats, CODEC_ID};
pub use encoder::{EncodedFrame, H264Encoder};
pub use recorder::Mp4Writer;
