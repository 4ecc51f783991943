//! Tauri commands for the recording control panel
//!
//! Start and stop block on network and device work, so they run on the
//! blocking pool while the session sits behind a process-wide mutex.

use std::sync::{Arc, Mutex};

use tauri::command;

use crate::config::RecorderConfig;
use crate::media::DefaultBackend;
use crate::resolver::{HttpFetcher, StreamResolver};
use crate::session::RecorderSession;
use crate::types::{ControlState, RecordingStarted, RecordingState, RecordingSummary};

type DefaultSession = RecorderSession<HttpFetcher, DefaultBackend>;

lazy_static::lazy_static! {
    static ref SESSION: Arc<Mutex<Option<DefaultSession>>> = Arc::new(Mutex::new(None));
}

fn with_session<T>(
    f: impl FnOnce(&mut DefaultSession) -> Result<T, String>,
) -> Result<T, String> {
    let mut guard = SESSION
        .lock()
        .map_err(|_| "Recorder state poisoned by previous panic".to_string())?;
    if guard.is_none() {
        let session = RecorderSession::with_defaults(RecorderConfig::default())
            .map_err(|e| e.to_string())?;
        *guard = Some(session);
    }
    match guard.as_mut() {
        Some(session) => f(session),
        None => Err("Recorder session unavailable".to_string()),
    }
}

async fn run_blocking<T: Send + 'static>(
    f: impl FnOnce() -> Result<T, String> + Send + 'static,
) -> Result<T, String> {
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| format!("Recorder task failed: {}", e))?
}

/// Resolve a camera page address to its stream URL without recording
#[command]
pub async fn resolve_stream_url(address: String) -> Result<String, String> {
    run_blocking(move || {
        let config = RecorderConfig::default();
        let fetcher =
            HttpFetcher::new(config.network.request_timeout()).map_err(|e| e.to_string())?;
        StreamResolver::new(fetcher, config.network.default_scheme)
            .resolve(&address)
            .map_err(|e| {
                log::warn!("Error extracting stream URL: {}", e.detail());
                e.to_string()
            })
    })
    .await
}

/// Start recording `address` into `folder`
#[command]
pub async fn start_recording(address: String, folder: String) -> Result<RecordingStarted, String> {
    log::info!("Start requested for {} into {}", address, folder);
    run_blocking(move || with_session(|session| session.start(&address, &folder).map_err(|e| e.to_string())))
        .await
}

/// Stop the current recording and finalize its file
#[command]
pub async fn stop_recording() -> Result<RecordingSummary, String> {
    run_blocking(|| with_session(|session| session.stop().map_err(|e| e.to_string()))).await
}

/// Current control state, reconciling a worker that exited on its own
#[command]
pub async fn get_recording_status() -> Result<RecordingStatus, String> {
    run_blocking(|| {
        with_session(|session| {
            let finished = match session.poll() {
                Some(Ok(summary)) => Some(summary),
                Some(Err(e)) => return Err(e.to_string()),
                None => None,
            };
            Ok(RecordingStatus {
                state: session.state(),
                controls: session.controls(),
                stream_url: session.current_stream_url().map(str::to_string),
                output_path: session
                    .current_output()
                    .map(|p| p.to_string_lossy().to_string()),
                finished,
            })
        })
    })
    .await
}

/// Recording status information
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RecordingStatus {
    pub state: RecordingState,
    pub controls: ControlState,
    pub stream_url: Option<String>,
    pub output_path: Option<String>,
    /// Summary of a recording that ended on its own since the last poll
    pub finished: Option<RecordingSummary>,
}
