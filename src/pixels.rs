//! Decoded RGB8 pixel buffers

use crate::error::{OptimError, Result};

/// A decoded image: `height × width × 3` sRGB samples, row-major, interleaved RGB.
///
/// Construction validates the shape, so every `PixelBuffer` in the crate is
/// non-empty and its length matches its dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    pub const CHANNELS: usize = 3;

    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 || data.is_empty() {
            return Err(OptimError::EmptyBuffer);
        }

        let expected = width as usize * height as usize * Self::CHANNELS;
        if data.len() != expected {
            return Err(OptimError::InvalidBuffer {
                expected,
                actual: data.len(),
            });
        }

        Ok(Self { width, height, data })
    }

    /// Buffer with every sample set to `value`
    pub fn filled(width: u32, height: u32, value: u8) -> Result<Self> {
        let len = width as usize * height as usize * Self::CHANNELS;
        Self::from_rgb(width, height, vec![value; len])
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn samples(&self) -> &[u8] {
        &self.data
    }
}
