//! Captured pixel buffers and their reduction to LED colors

use std::convert::TryFrom;

use thiserror::Error;

use crate::color::LedColor;

mod averager;
pub use averager::*;

pub mod sampler;
pub use sampler::{CaptureError, RegionSampler};

#[derive(Debug, Clone, Error)]
pub enum RawImageError {
    #[error("invalid data ({data} bytes) for the given dimensions ({width} x {height} x {channels} = {expected})")]
    InvalidData {
        data: usize,
        width: u32,
        height: u32,
        channels: usize,
        expected: usize,
    },
    #[error("invalid dimensions ({width} x {height})")]
    InvalidDimensions { width: u32, height: u32 },
}

/// Snapshot of a screen region, as packed 8-bit RGB rows
///
/// A buffer is produced by one capture call and dropped once every LED drawing from it has
/// been averaged.
#[derive(Clone)]
pub struct CaptureBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl CaptureBuffer {
    pub const CHANNELS: usize = 3;

    /// Build a buffer by evaluating `f` at every pixel
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> LedColor) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * Self::CHANNELS);

        for y in 0..height {
            for x in 0..width {
                let (r, g, b) = f(x, y).into_components();
                data.extend_from_slice(&[r, g, b]);
            }
        }

        Self {
            data,
            width,
            height,
        }
    }

    /// Build a buffer filled with a single color
    pub fn solid(width: u32, height: u32, color: LedColor) -> Self {
        Self::from_fn(width, height, |_, _| color)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Get the color of the pixel at (`x`, `y`)
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are outside the buffer.
    pub fn color_at(&self, x: u32, y: u32) -> LedColor {
        assert!(x < self.width, "x = {} out of bounds (width {})", x, self.width);
        assert!(y < self.height, "y = {} out of bounds (height {})", y, self.height);

        let idx = (y as usize * self.width as usize + x as usize) * Self::CHANNELS;
        LedColor::new(self.data[idx], self.data[idx + 1], self.data[idx + 2])
    }
}

impl std::fmt::Debug for CaptureBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut f = f.debug_struct("CaptureBuffer");
        f.field("width", &self.width);
        f.field("height", &self.height);

        if self.data.len() > 32 {
            f.field("data", &format!("[{} bytes]", self.data.len()));
        } else {
            f.field("data", &self.data);
        }

        f.finish()
    }
}

impl TryFrom<(Vec<u8>, u32, u32)> for CaptureBuffer {
    type Error = RawImageError;

    fn try_from((data, width, height): (Vec<u8>, u32, u32)) -> Result<Self, Self::Error> {
        if width == 0 || height == 0 {
            return Err(RawImageError::InvalidDimensions { width, height });
        }

        let channels = Self::CHANNELS;
        let expected = width as usize * height as usize * channels;

        if data.len() != expected {
            return Err(RawImageError::InvalidData {
                data: data.len(),
                width,
                height,
                channels,
                expected,
            });
        }

        Ok(Self {
            data,
            width,
            height,
        })
    }
}

impl From<::image::RgbImage> for CaptureBuffer {
    fn from(image: ::image::RgbImage) -> Self {
        let (width, height) = image.dimensions();

        Self {
            data: image.into_raw(),
            width,
            height,
        }
    }
}
