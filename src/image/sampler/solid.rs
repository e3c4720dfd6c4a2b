use crate::{color::LedColor, models::ScreenRegion};

use super::{CaptureBuffer, CaptureError, RegionSampler};

/// Sampler returning a uniform test pattern for every region
#[derive(Debug, Clone, Copy)]
pub struct SolidSampler {
    color: LedColor,
}

impl SolidSampler {
    pub fn new(color: LedColor) -> Self {
        Self { color }
    }
}

impl RegionSampler for SolidSampler {
    fn capture(&mut self, region: &ScreenRegion) -> Result<CaptureBuffer, CaptureError> {
        Ok(CaptureBuffer::solid(region.width, region.height, self.color))
    }
}
