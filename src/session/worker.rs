//! The frame-copy worker

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};

use crate::errors::RecorderError;
use crate::media::{VideoSink, VideoSource};
use crate::types::StopReason;

/// Cooperative cancellation shared between the control thread and the worker
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Handles returned to the joiner for teardown
pub(crate) struct WorkerOutput {
    pub source: Box<dyn VideoSource>,
    pub sink: Box<dyn VideoSink>,
    pub stop_reason: StopReason,
}

/// Copy frames until the token is cancelled or the source gives out
///
/// The stop reason is announced on `done` before returning so a front end
/// can notice an unsolicited exit without joining.
pub(crate) fn capture_loop(
    mut source: Box<dyn VideoSource>,
    mut sink: Box<dyn VideoSink>,
    token: StopToken,
    done: Sender<StopReason>,
) -> WorkerOutput {
    let stop_reason = loop {
        if token.is_cancelled() {
            break StopReason::Requested;
        }

        match source.read_frame() {
            Ok(Some(frame)) => {
                if let Err(e) = sink.write_frame(&frame) {
                    log::warn!("Failed to write frame {}: {}", frame.sequence, e);
                    break StopReason::WriteFailed(e.to_string());
                }
            }
            Ok(None) => {
                log::info!("Stream ended after {} frames", sink.frames_written());
                break StopReason::EndOfStream;
            }
            Err(e) => {
                log::warn!("Failed to read frame from stream: {}", e);
                break StopReason::ReadFailed(e.to_string());
            }
        }
    };

    // Receiver may already be gone if the session was dropped
    let _ = done.send(stop_reason.clone());

    WorkerOutput {
        source,
        sink,
        stop_reason,
    }
}

/// Start `capture_loop` on a named thread
pub(crate) fn spawn(
    source: Box<dyn VideoSource>,
    sink: Box<dyn VideoSink>,
    token: StopToken,
) -> Result<(JoinHandle<WorkerOutput>, Receiver<StopReason>), RecorderError> {
    let (done_tx, done_rx) = crossbeam_channel::bounded(1);

    let handle = std::thread::Builder::new()
        .name("ipcam-recorder-capture".to_string())
        .spawn(move || capture_loop(source, sink, token, done_tx))
        .map_err(|e| RecorderError::Worker(format!("spawn failed: {}", e)))?;

    Ok((handle, done_rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BackendLog, MemorySink, SyntheticSource};
    use crate::recording::RecordingConfig;
    use crate::types::SourceProperties;
    use std::sync::Mutex;

    fn props() -> SourceProperties {
        SourceProperties {
            width: 64,
            height: 48,
            fps: 25.0,
        }
    }

    fn memory_sink(dir: &tempfile::TempDir) -> (Box<dyn VideoSink>, Arc<Mutex<BackendLog>>) {
        let log = Arc::new(Mutex::new(BackendLog::default()));
        let sink = MemorySink::create(
            &dir.path().join("out.mp4"),
            RecordingConfig::new(64, 48, 25.0),
            Arc::clone(&log),
        )
        .unwrap();
        (Box::new(sink), log)
    }

    #[test]
    fn test_loop_copies_until_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let (sink, log) = memory_sink(&dir);
        let (tx, rx) = crossbeam_channel::bounded(1);

        let output = capture_loop(
            Box::new(SyntheticSource::new(props(), Some(7))),
            sink,
            StopToken::new(),
            tx,
        );

        assert_eq!(output.stop_reason, StopReason::EndOfStream);
        assert_eq!(output.sink.frames_written(), 7);
        assert_eq!(log.lock().unwrap().frames_written, 7);
        assert_eq!(rx.try_recv().unwrap(), StopReason::EndOfStream);
    }

    #[test]
    fn test_cancelled_token_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (sink, _log) = memory_sink(&dir);
        let (tx, _rx) = crossbeam_channel::bounded(1);
        let token = StopToken::new();
        token.cancel();

        let output = capture_loop(Box::new(SyntheticSource::new(props(), None)), sink, token, tx);

        assert_eq!(output.stop_reason, StopReason::Requested);
        assert_eq!(output.sink.frames_written(), 0);
    }

    #[test]
    fn test_read_failure_ends_loop() {
        let dir = tempfile::tempdir().unwrap();
        let (sink, _log) = memory_sink(&dir);
        let (tx, _rx) = crossbeam_channel::bounded(1);

        let source = SyntheticSource::new(props(), None).failing_after(3);
        let output = capture_loop(Box::new(source), sink, StopToken::new(), tx);

        assert!(matches!(output.stop_reason, StopReason::ReadFailed(_)));
        assert_eq!(output.sink.frames_written(), 3);
    }

    #[test]
    fn test_write_failure_ends_loop() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(Mutex::new(BackendLog::default()));
        // Sink expects a different size than the source produces
        let sink = MemorySink::create(
            &dir.path().join("out.mp4"),
            RecordingConfig::new(32, 32, 25.0),
            log,
        )
        .unwrap();
        let (tx, _rx) = crossbeam_channel::bounded(1);

        let output = capture_loop(
            Box::new(SyntheticSource::new(props(), Some(5))),
            Box::new(sink),
            StopToken::new(),
            tx,
        );

        assert!(matches!(output.stop_reason, StopReason::WriteFailed(_)));
    }

    #[test]
    fn test_spawned_worker_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let (sink, _log) = memory_sink(&dir);
        let token = StopToken::new();
        let source = SyntheticSource::new(props(), None)
            .with_interval(std::time::Duration::from_millis(2));

        let (handle, done) = spawn(Box::new(source), sink, token.clone()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        token.cancel();

        let output = handle.join().unwrap();
        assert_eq!(output.stop_reason, StopReason::Requested);
        assert_eq!(done.recv().unwrap(), StopReason::Requested);
    }
}
