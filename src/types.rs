//! Core data types shared by the resolver, media backends and session

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A decoded video frame in packed RGB24
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(sequence: u64, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            sequence,
            width,
            height,
            data,
        }
    }

    /// Expected RGB24 buffer length for the frame dimensions
    pub fn expected_len(&self) -> usize {
        (self.width as usize) * (self.height as usize) * 3
    }

    /// Keep the top-left `width`x`height` region
    ///
    /// Sizes larger than the frame are clamped to it.
    pub fn crop(self, width: u32, height: u32) -> Frame {
        let width = width.min(self.width);
        let height = height.min(self.height);
        if width == self.width && height == self.height {
            return self;
        }

        let src_stride = self.width as usize * 3;
        let row_len = width as usize * 3;
        let mut data = Vec::with_capacity(row_len * height as usize);
        for row in self.data.chunks_exact(src_stride).take(height as usize) {
            data.extend_from_slice(&row[..row_len]);
        }
        Frame::new(self.sequence, width, height, data)
    }
}

/// Metadata reported by a video source once opened
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceProperties {
    pub width: u32,
    pub height: u32,
    /// Reported frame rate; zero or negative means the source does not know
    pub fps: f64,
}

impl SourceProperties {
    /// Dimensions rounded down to even numbers, as H.264 4:2:0 requires
    pub fn even_dimensions(&self) -> (u32, u32) {
        (self.width & !1, self.height & !1)
    }

    /// Frame rate to record at, substituting `default_fps` for misreported rates
    pub fn effective_fps(&self, default_fps: f64) -> f64 {
        if self.fps > 0.0 && self.fps.is_finite() {
            self.fps
        } else {
            default_fps
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    #[default]
    Idle,
    Recording,
}

/// Enabled state of the control panel's start and stop actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlState {
    pub start_enabled: bool,
    pub stop_enabled: bool,
}

impl From<RecordingState> for ControlState {
    fn from(state: RecordingState) -> Self {
        match state {
            RecordingState::Idle => ControlState {
                start_enabled: true,
                stop_enabled: false,
            },
            RecordingState::Recording => ControlState {
                start_enabled: false,
                stop_enabled: true,
            },
        }
    }
}

/// Why the capture worker left its loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum StopReason {
    /// The stop signal was observed
    Requested,
    /// The source reported no more frames
    EndOfStream,
    /// Reading a frame failed
    ReadFailed(String),
    /// Writing a frame to the sink failed
    WriteFailed(String),
}

impl StopReason {
    pub fn is_requested(&self) -> bool {
        matches!(self, StopReason::Requested)
    }
}

/// What a successful start set up
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingStarted {
    pub stream_url: String,
    pub output_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// Result of a finished recording
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSummary {
    pub stream_url: String,
    pub output_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frames_written: u64,
    pub duration_secs: f64,
    pub bytes_written: u64,
    pub stop_reason: StopReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_fps_substitutes_default() {
        let props = SourceProperties {
            width: 640,
            height: 480,
            fps: 0.0,
        };
        assert_eq!(props.effective_fps(30.0), 30.0);

        let negative = SourceProperties { fps: -1.0, ..props };
        assert_eq!(negative.effective_fps(30.0), 30.0);

        let reported = SourceProperties { fps: 12.5, ..props };
        assert_eq!(reported.effective_fps(30.0), 12.5);
    }

    #[test]
    fn test_crop_keeps_top_left_region() {
        // 3x2 frame, pixel value encodes its position
        let data: Vec<u8> = (0..6u8).flat_map(|p| [p, p, p]).collect();
        let frame = Frame::new(4, 3, 2, data).crop(2, 2);

        assert_eq!((frame.width, frame.height), (2, 2));
        assert_eq!(frame.sequence, 4);
        assert_eq!(frame.data, vec![0, 0, 0, 1, 1, 1, 3, 3, 3, 4, 4, 4]);
        assert_eq!(frame.data.len(), frame.expected_len());
    }

    #[test]
    fn test_crop_to_same_size_is_identity() {
        let frame = Frame::new(0, 2, 2, vec![7; 12]);
        assert_eq!(frame.clone().crop(2, 2), frame);
        assert_eq!(frame.clone().crop(10, 10), frame);
    }

    #[test]
    fn test_even_dimensions() {
        let props = SourceProperties {
            width: 641,
            height: 481,
            fps: 25.0,
        };
        assert_eq!(props.even_dimensions(), (640, 480));
        assert_eq!(SourceProperties { width: 640, ..props }.even_dimensions(), (640, 480));
    }

    #[test]
    fn test_control_state_from_recording_state() {
        let idle = ControlState::from(RecordingState::Idle);
        assert!(idle.start_enabled);
        assert!(!idle.stop_enabled);

        let recording = ControlState::from(RecordingState::Recording);
        assert!(!recording.start_enabled);
        assert!(recording.stop_enabled);
    }

    #[test]
    fn test_stop_reason_serialization() {
        let json = serde_json::to_string(&StopReason::ReadFailed("eof".into())).unwrap();
        assert!(json.contains("read_failed"));
        assert!(json.contains("eof"));
    }
}
