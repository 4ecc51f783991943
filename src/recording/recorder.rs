//! MP4 writer combining encoder and muxer

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use muxide::api::{Metadata, MuxerBuilder, VideoCodec};

use super::config::{RecordingConfig, RecordingStats};
use super::encoder::H264Encoder;
use crate::errors::RecorderError;
use crate::media::VideoSink;
use crate::types::Frame;

/// Encodes RGB frames to H.264 and muxes them into an MP4 file
///
/// Every frame handed in is written; timestamps come from the input frame
/// index and the configured rate, not wall-clock arrival.
pub struct Mp4Writer {
    encoder: H264Encoder,
    muxer: muxide::api::Muxer<BufWriter<File>>,
    config: RecordingConfig,
    output_path: String,
    frames_in: u64,
    frame_count: u64,
    skipped_frames: u64,
    frame_duration_secs: f64,
}

impl Mp4Writer {
    /// Create the output file and prepare the encoder and muxer
    pub fn new<P: AsRef<Path>>(output_path: P, config: RecordingConfig) -> Result<Self, RecorderError> {
        if config.fps.is_nan() || config.fps <= 0.0 {
            return Err(RecorderError::Encoding(format!("Invalid frame rate {}", config.fps)));
        }
        let output_path_str = output_path.as_ref().to_string_lossy().to_string();

        // Validate before touching the filesystem
        let encoder = H264Encoder::new(config.width, config.height, config.fps, config.bitrate)?;

        let file = File::create(&output_path)?;
        let writer = BufWriter::new(file);

        let mut metadata = Metadata::new().with_current_time();
        if let Some(ref title) = config.title {
            metadata = metadata.with_title(title);
        }

        let muxer = MuxerBuilder::new(writer)
            .video(VideoCodec::H264, config.width, config.height, config.fps)
            .with_fast_start(config.fast_start)
            .with_metadata(metadata)
            .build()
            .map_err(|e| RecorderError::Muxing(format!("Failed to create muxer: {}", e)))?;

        let frame_duration_secs = 1.0 / config.fps;

        Ok(Self {
            encoder,
            muxer,
            config,
            output_path: output_path_str,
            frames_in: 0,
            frame_count: 0,
            skipped_frames: 0,
            frame_duration_secs,
        })
    }

    /// Write raw RGB24 data as the next frame
    pub fn write_rgb_frame(&mut self, rgb_data: &[u8], width: u32, height: u32) -> Result<(), RecorderError> {
        if width != self.config.width || height != self.config.height {
            return Err(RecorderError::Encoding(format!(
                "Frame dimensions {}x{} don't match recording config {}x{}",
                width, height, self.config.width, self.config.height
            )));
        }

        let encoded = self.encoder.encode_rgb(rgb_data)?;
        let pts = self.frames_in as f64 * self.frame_duration_secs;
        self.frames_in += 1;

        if encoded.data.is_empty() {
            log::warn!("Encoder produced no output for frame at {:.3}s", pts);
            self.skipped_frames += 1;
            return Ok(());
        }

        self.muxer
            .write_video(pts, &encoded.data, encoded.is_keyframe)
            .map_err(|e| RecorderError::Muxing(format!("Failed to write frame: {}", e)))?;

        self.frame_count += 1;
        Ok(())
    }

    /// Finish the recording and return statistics
    pub fn finish(self) -> Result<RecordingStats, RecorderError> {
        let muxer_stats = self
            .muxer
            .finish_with_stats()
            .map_err(|e| RecorderError::Muxing(format!("Failed to finalize recording: {}", e)))?;

        Ok(RecordingStats {
            video_frames: muxer_stats.video_frames,
            duration_secs: muxer_stats.duration_secs,
            bytes_written: muxer_stats.bytes_written,
            skipped_frames: self.skipped_frames,
            output_path: self.output_path,
        })
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl VideoSink for Mp4Writer {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), RecorderError> {
        self.write_rgb_frame(&frame.data, frame.width, frame.height)
    }

    fn frames_written(&self) -> u64 {
        self.frame_count
    }

    fn finish(self: Box<Self>) -> Result<RecordingStats, RecorderError> {
        Mp4Writer::finish(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_creation() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("creation.mp4");
        let result = Mp4Writer::new(&output, RecordingConfig::new(640, 480, 30.0));
        assert!(result.is_ok(), "Writer should be created successfully");
        assert!(output.exists());
    }

    #[test]
    fn test_writer_rejects_bad_rate_without_creating_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("bad_rate.mp4");
        assert!(Mp4Writer::new(&output, RecordingConfig::new(640, 480, 0.0)).is_err());
        assert!(!output.exists());
    }

    #[test]
    fn test_record_frames() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("frames.mp4");
        let config = RecordingConfig::new(640, 480, 30.0).with_title("Test Recording");

        let mut writer = Mp4Writer::new(&output, config).expect("Writer creation failed");

        for i in 0..30 {
            let gray = (i * 8) as u8;
            let rgb = vec![gray; 640 * 480 * 3];
            writer.write_rgb_frame(&rgb, 640, 480).expect("Frame write should succeed");
        }

        let stats = writer.finish().expect("Finish should succeed");
        assert_eq!(stats.video_frames, 30);
        assert!(stats.bytes_written > 0);
        assert!(stats.duration_secs > 0.0);

        let metadata = std::fs::metadata(&output).expect("File should exist");
        assert!(metadata.len() > 0);
    }
}
