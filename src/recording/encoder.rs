//! H.264 encoder wrapper using openh264

use openh264::encoder::{BitRate, Encoder, EncoderConfig, FrameRate, FrameType};
use openh264::formats::YUVBuffer;
use openh264::OpenH264API;

use crate::errors::RecorderError;

/// H.264 encoder for fixed-size RGB24 frames
pub struct H264Encoder {
    encoder: Encoder,
    width: u32,
    height: u32,
    frame_count: u64,
}

impl H264Encoder {
    /// Create an encoder for `width`x`height` frames
    ///
    /// openh264 infers dimensions from each YUV buffer. Frame skipping is
    /// disabled so every input frame yields output.
    pub fn new(width: u32, height: u32, fps: f64, bitrate: u32) -> Result<Self, RecorderError> {
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(RecorderError::Encoding(format!(
                "Frame dimensions must be even and non-zero, got {}x{}",
                width, height
            )));
        }
        if !fps.is_finite() || fps <= 0.0 {
            return Err(RecorderError::Encoding(format!("Invalid frame rate {}", fps)));
        }
        if bitrate == 0 {
            return Err(RecorderError::Encoding("Bitrate must be non-zero".to_string()));
        }

        let config = EncoderConfig::new()
            .bitrate(BitRate::from_bps(bitrate))
            .max_frame_rate(FrameRate::from_hz(fps as f32))
            .skip_frames(false);

        let encoder = Encoder::with_api_config(OpenH264API::from_source(), config)
            .map_err(|e| RecorderError::Encoding(format!("Failed to create encoder: {}", e)))?;

        Ok(Self {
            encoder,
            width,
            height,
            frame_count: 0,
        })
    }

    /// Encode an RGB24 frame, returning Annex B NAL units
    pub fn encode_rgb(&mut self, rgb_data: &[u8]) -> Result<EncodedFrame, RecorderError> {
        let expected_size = (self.width as usize) * (self.height as usize) * 3;
        if rgb_data.len() != expected_size {
            return Err(RecorderError::Encoding(format!(
                "Invalid frame size: expected {} bytes, got {}",
                expected_size,
                rgb_data.len()
            )));
        }

        let yuv = rgb_to_yuv420(rgb_data, self.width, self.height);
        let yuv_buffer = YUVBuffer::from_vec(yuv, self.width as usize, self.height as usize);

        let bitstream = self
            .encoder
            .encode(&yuv_buffer)
            .map_err(|e| RecorderError::Encoding(format!("Encoding failed: {}", e)))?;

        self.frame_count += 1;

        let is_keyframe = matches!(bitstream.frame_type(), FrameType::IDR | FrameType::I);

        Ok(EncodedFrame {
            data: bitstream.to_vec(),
            is_keyframe,
        })
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

/// Result of encoding a single frame
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// Encoded H.264 data in Annex B format
    pub data: Vec<u8>,
    pub is_keyframe: bool,
}

/// Convert RGB24 to planar YUV420 (BT.601)
fn rgb_to_yuv420(rgb: &[u8], width: u32, height: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;

    let y_size = w * h;
    let uv_size = (w / 2) * (h / 2);
    let mut yuv = vec![0u8; y_size + uv_size * 2];

    let (y_plane, uv_planes) = yuv.split_at_mut(y_size);
    let (u_plane, v_plane) = uv_planes.split_at_mut(uv_size);

    for y in 0..h {
        for x in 0..w {
            let rgb_idx = (y * w + x) * 3;
            let r = rgb[rgb_idx] as i32;
            let g = rgb[rgb_idx + 1] as i32;
            let b = rgb[rgb_idx + 2] as i32;

            let y_val = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
            y_plane[y * w + x] = y_val.clamp(0, 255) as u8;

            // 2x2 chroma subsampling
            if y % 2 == 0 && x % 2 == 0 {
                let uv_idx = (y / 2) * (w / 2) + (x / 2);
                let u_val = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
                let v_val = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
                u_plane[uv_idx] = u_val.clamp(0, 255) as u8;
                v_plane[uv_idx] = v_val.clamp(0, 255) as u8;
            }
        }
    }

    yuv
}
