//! Screen capture collaborators

use thiserror::Error;

use crate::models::{self, ScreenRegion};

use super::CaptureBuffer;

mod file;
pub use file::ImageSampler;

mod solid;
pub use solid::SolidSampler;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("image error: {0}")]
    Image(#[from] ::image::ImageError),
    #[error("region {region} is outside the captured screen")]
    OutOfBounds { region: ScreenRegion },
    #[error("sampler returned a {width}x{height} buffer for region {region}")]
    Dimensions {
        region: ScreenRegion,
        width: u32,
        height: u32,
    },
}

/// Source of screen pixels
///
/// Implementations return a snapshot of exactly `region.width` x `region.height` pixels taken
/// at call time.
pub trait RegionSampler: Send {
    fn capture(&mut self, region: &ScreenRegion) -> Result<CaptureBuffer, CaptureError>;
}

/// Build the sampler described by the capture configuration
pub fn build(config: &models::Capture) -> Result<Box<dyn RegionSampler>, CaptureError> {
    let sampler: Box<dyn RegionSampler> = match config {
        models::Capture::Solid(solid) => Box::new(SolidSampler::new(solid.color)),
        models::Capture::Image(image) => Box::new(ImageSampler::open(image)?),
    };

    Ok(sampler)
}
