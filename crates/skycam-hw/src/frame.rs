//! Captured frame type and conversion to `image` buffers.

use image::{DynamicImage, GrayImage, ImageBuffer, Luma};

use crate::sdk::FrameInfo;

/// A frame read from the camera, trimmed to its reported size.
#[derive(Clone)]
pub struct Frame {
    /// Raw pixel data, 16-bit samples little-endian.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
    pub channels: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame data too short: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("unsupported frame layout: {channels} channel(s) at {bits} bits")]
    UnsupportedLayout { channels: u32, bits: u32 },
}

/// Bytes occupied by a frame of the given layout.
pub fn frame_len(info: &FrameInfo) -> usize {
    info.width as usize
        * info.height as usize
        * info.bits_per_pixel.div_ceil(8) as usize
        * info.channels as usize
}

impl Frame {
    /// Build a frame from a readout buffer, keeping only the bytes `info` describes.
    pub fn from_readout(mut buf: Vec<u8>, info: FrameInfo) -> Result<Self, FrameError> {
        let expected = frame_len(&info);
        if buf.len() < expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: buf.len(),
            });
        }
        buf.truncate(expected);
        Ok(Self {
            data: buf,
            width: info.width,
            height: info.height,
            bits_per_pixel: info.bits_per_pixel,
            channels: info.channels,
        })
    }

    pub fn info(&self) -> FrameInfo {
        FrameInfo {
            width: self.width,
            height: self.height,
            bits_per_pixel: self.bits_per_pixel,
            channels: self.channels,
        }
    }

    /// Average sample value in the frame's own bit depth.
    pub fn mean_level(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        if self.bits_per_pixel > 8 {
            let samples = self.data.len() / 2;
            let sum: u64 = self
                .data
                .chunks_exact(2)
                .map(|c| u64::from(u16::from_le_bytes([c[0], c[1]])))
                .sum();
            sum as f64 / samples as f64
        } else {
            self.data.iter().map(|&b| u64::from(b)).sum::<u64>() as f64 / self.data.len() as f64
        }
    }

    /// Convert a single-channel frame to an 8- or 16-bit grayscale image.
    pub fn to_image(&self) -> Result<DynamicImage, FrameError> {
        if self.channels != 1 {
            return Err(FrameError::UnsupportedLayout {
                channels: self.channels,
                bits: self.bits_per_pixel,
            });
        }
        let expected = frame_len(&self.info());
        if self.data.len() < expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: self.data.len(),
            });
        }
        let image = match self.bits_per_pixel {
            1..=8 => GrayImage::from_raw(self.width, self.height, self.data[..expected].to_vec())
                .map(DynamicImage::ImageLuma8),
            9..=16 => {
                let samples: Vec<u16> = self.data[..expected]
                    .chunks_exact(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]))
                    .collect();
                ImageBuffer::<Luma<u16>, _>::from_raw(self.width, self.height, samples)
                    .map(DynamicImage::ImageLuma16)
            }
            _ => None,
        };
        image.ok_or(FrameError::UnsupportedLayout {
            channels: self.channels,
            bits: self.bits_per_pixel,
        })
    }
}
