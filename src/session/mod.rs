//! Recording session: the control panel's state machine
//!
//! `Idle -> Recording` happens only after the stream is resolved and both the
//! source and the sink are open; the worker is spawned last. `Recording ->
//! Idle` happens on `stop()`, or on `poll()` once the worker has exited by
//! itself. Either way the worker is joined before the source and sink are
//! released, and ownership of both comes back through the join.

pub mod naming;
mod worker;

pub use worker::StopToken;

use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use chrono::Local;
use crossbeam_channel::{Receiver, TryRecvError};

use crate::config::RecorderConfig;
use crate::errors::RecorderError;
use crate::media::{self, DefaultBackend, MediaBackend};
use crate::recording::{RecordingConfig, CODEC_ID};
use crate::resolver::{HttpFetcher, PageFetcher, StreamResolver};
use crate::types::{ControlState, RecordingStarted, RecordingState, RecordingSummary, StopReason};
use worker::WorkerOutput;

struct ActiveRecording {
    stream_url: String,
    output_path: PathBuf,
    sink_config: RecordingConfig,
    token: StopToken,
    handle: JoinHandle<WorkerOutput>,
    completion: Receiver<StopReason>,
}

/// Drives one camera recording at a time
pub struct RecorderSession<F: PageFetcher, B: MediaBackend> {
    config: RecorderConfig,
    resolver: StreamResolver<F>,
    backend: B,
    active: Option<ActiveRecording>,
}

impl RecorderSession<HttpFetcher, DefaultBackend> {
    /// Session using HTTP page retrieval and the MJPEG/MP4 backend
    pub fn with_defaults(config: RecorderConfig) -> Result<Self, RecorderError> {
        let fetcher = HttpFetcher::new(config.network.request_timeout())?;
        let backend = DefaultBackend::new(
            config.network.stream_connect_timeout(),
            config.network.stream_read_timeout(),
        );
        Ok(Self::new(config, fetcher, backend))
    }
}

impl<F: PageFetcher, B: MediaBackend> RecorderSession<F, B> {
    pub fn new(config: RecorderConfig, fetcher: F, backend: B) -> Self {
        let resolver = StreamResolver::new(fetcher, config.network.default_scheme.clone());
        Self {
            config,
            resolver,
            backend,
            active: None,
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn state(&self) -> RecordingState {
        if self.active.is_some() {
            RecordingState::Recording
        } else {
            RecordingState::Idle
        }
    }

    pub fn controls(&self) -> ControlState {
        ControlState::from(self.state())
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Output file of the recording in progress
    pub fn current_output(&self) -> Option<&Path> {
        self.active.as_ref().map(|a| a.output_path.as_path())
    }

    /// Stream URL of the recording in progress
    pub fn current_stream_url(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.stream_url.as_str())
    }

    /// Receiver that yields once when the current worker leaves its loop
    pub fn completion(&self) -> Option<Receiver<StopReason>> {
        self.active.as_ref().map(|a| a.completion.clone())
    }

    /// Resolve the camera stream, open source and sink, then spawn the worker
    ///
    /// Blocks for the page request and device setup. Any failure leaves the
    /// session Idle with nothing running.
    pub fn start(&mut self, address: &str, folder: &str) -> Result<RecordingStarted, RecorderError> {
        if self.active.is_some() {
            return Err(RecorderError::AlreadyRecording);
        }

        let address = address.trim();
        let folder = folder.trim();
        if address.is_empty() || folder.is_empty() {
            return Err(RecorderError::InvalidInput(
                "IP Camera URL and folder path are required.".to_string(),
            ));
        }
        let folder = Path::new(folder);
        if !folder.is_dir() {
            return Err(RecorderError::InvalidInput(format!(
                "Output folder {:?} does not exist",
                folder
            )));
        }

        let stream_url = self.resolver.resolve(address).map_err(|e| {
            log::warn!("Error extracting stream URL: {}", e.detail());
            e
        })?;

        let source = self.backend.open_source(&stream_url).map_err(|e| {
            log::warn!("Failed to open stream {}: {}", stream_url, e);
            match e {
                RecorderError::DeviceOpen(_) => e,
                other => RecorderError::DeviceOpen(other.to_string()),
            }
        })?;
        let source = media::crop_to_even(source);

        let props = source.properties();
        let fps = props.effective_fps(self.config.capture.default_fps);
        if fps != props.fps {
            log::info!(
                "Source reported {} fps, recording at default {} fps",
                props.fps,
                fps
            );
        }

        let output_path = naming::recording_path(folder, &Local::now(), &self.config.capture)?;
        let sink_config = RecordingConfig::new(props.width, props.height, fps)
            .with_bitrate(self.config.capture.bitrate)
            .with_title(stream_url.clone());

        let sink = self
            .backend
            .open_sink(&output_path, &sink_config)
            .map_err(|e| {
                log::warn!("Failed to open output {:?}: {}", output_path, e);
                RecorderError::DeviceOpen(format!("Failed to open output {:?}: {}", output_path, e))
            })?;

        let token = StopToken::new();
        let (handle, completion) = worker::spawn(source, sink, token.clone())?;

        log::info!(
            "Recording {} to {:?} ({}x{} @ {} fps, {})",
            stream_url,
            output_path,
            props.width,
            props.height,
            fps,
            CODEC_ID
        );

        let started = RecordingStarted {
            stream_url: stream_url.clone(),
            output_path: output_path.clone(),
            width: props.width,
            height: props.height,
            fps,
        };

        self.active = Some(ActiveRecording {
            stream_url,
            output_path,
            sink_config,
            token,
            handle,
            completion,
        });

        Ok(started)
    }

    /// Signal the worker, join it and finalize the recording
    pub fn stop(&mut self) -> Result<RecordingSummary, RecorderError> {
        let active = self.active.take().ok_or(RecorderError::NotRecording)?;
        finalize(active)
    }

    /// Reconcile a worker that exited on its own
    ///
    /// Returns `None` while the worker is still copying frames (or when idle).
    /// Once it has exited, the recording is finalized as if stopped and the
    /// session returns to Idle.
    pub fn poll(&mut self) -> Option<Result<RecordingSummary, RecorderError>> {
        let active = self.active.as_ref()?;
        // The completion message may have been taken by another receiver clone
        let exited = active.handle.is_finished()
            || match active.completion.try_recv() {
                Ok(_) => true,
                Err(TryRecvError::Empty) => false,
                Err(TryRecvError::Disconnected) => true,
            };
        if !exited {
            return None;
        }

        let active = self.active.take()?;
        log::info!("Capture worker for {} exited on its own", active.stream_url);
        Some(finalize(active))
    }
}

impl<F: PageFetcher, B: MediaBackend> Drop for RecorderSession<F, B> {
    fn drop(&mut self) {
        if self.active.is_some() {
            if let Err(e) = self.stop() {
                log::warn!("Error stopping recording during drop: {}", e);
            }
        }
    }
}

fn finalize(active: ActiveRecording) -> Result<RecordingSummary, RecorderError> {
    active.token.cancel();

    let output = active
        .handle
        .join()
        .map_err(|_| RecorderError::Worker("capture thread panicked".to_string()))?;

    let WorkerOutput {
        source,
        sink,
        stop_reason,
    } = output;

    drop(source);
    let stats = sink.finish()?;

    log::info!(
        "Recording stopped ({:?}): {} frames, {:.2}s, {} bytes in {:?}",
        stop_reason,
        stats.video_frames,
        stats.duration_secs,
        stats.bytes_written,
        active.output_path
    );

    Ok(RecordingSummary {
        stream_url: active.stream_url,
        output_path: active.output_path,
        width: active.sink_config.width,
        height: active.sink_config.height,
        fps: active.sink_config.fps,
        frames_written: stats.video_frames,
        duration_secs: stats.duration_secs,
        bytes_written: stats.bytes_written,
        stop_reason,
    })
}
