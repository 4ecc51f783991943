//! ipcam-recorder: record an IP camera's web-embedded stream to MP4
//!
//! The camera's browser viewer page is fetched once and scraped for the
//! stream address (`<video src>` first, then `<img src>` for MJPEG viewers).
//! The stream (MJPEG over HTTP, or anything FFmpeg opens such as RTSP and
//! progressive MP4) is then copied frame by frame into an H.264/MP4 file on
//! a background worker until the user stops it or the stream ends.
//!
//! # Usage
//! ```rust,ignore
//! use ipcam_recorder::{RecorderConfig, RecorderSession};
//!
//! let mut session = RecorderSession::with_defaults(RecorderConfig::default())?;
//! let started = session.start("192.168.1.20:8080/browserfs.html", "/srv/recordings")?;
//! println!("Recording to {:?}", started.output_path);
//!
//! // ... later, from the control panel:
//! let summary = session.stop()?;
//! println!("{} frames written", summary.frames_written);
//! ```
//!
//! With the `tauri-plugin` feature, [`init`] registers the same actions as
//! Tauri commands.
pub mod config;
pub mod errors;
pub mod media;
pub mod recording;
pub mod resolver;
pub mod session;
pub mod types;

#[cfg(feature = "tauri-plugin")]
pub mod commands;

// Synthetic sources and sinks for offline testing
pub mod testing;

pub use config::RecorderConfig;
pub use errors::{RecorderError, RecorderResult};
#[cfg(feature = "ffmpeg")]
pub use media::FfmpegSource;
pub use media::{DefaultBackend, MediaBackend, MjpegSource, VideoSink, VideoSource};
pub use resolver::{find_stream_url, normalize_address, HttpFetcher, PageFetcher, StreamResolver};
pub use session::{RecorderSession, StopToken};
pub use types::{
    ControlState, Frame, RecordingStarted, RecordingState, RecordingSummary, SourceProperties,
    StopReason,
};

#[cfg(feature = "tauri-plugin")]
use tauri::{
    plugin::{Builder, TauriPlugin},
    Runtime,
};

/// Initialize the recorder plugin with its commands
#[cfg(feature = "tauri-plugin")]
pub fn init<R: Runtime>() -> TauriPlugin<R> {
    Builder::new("ipcam-recorder")
        .invoke_handler(tauri::generate_handler![
            commands::recording::resolve_stream_url,
            commands::recording::start_recording,
            commands::recording::stop_recording,
            commands::recording::get_recording_status,
        ])
        .build()
}

/// Initialize logging, defaulting `RUST_LOG` to this crate at info level
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "ipcam_recorder=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_crate_info() {
        let info = get_info();
        assert_eq!(info.name, "ipcam-recorder");
        assert!(!info.version.is_empty());
        assert!(!info.description.is_empty());
    }
}
