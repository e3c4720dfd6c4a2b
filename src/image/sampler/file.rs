use ::image::{imageops, RgbImage};

use crate::models::{self, ScreenRegion};

use super::{CaptureBuffer, CaptureError, RegionSampler};

/// Sampler reading regions from a still image of the screen
///
/// The image stands for the virtual-screen rectangle `screen`. Its pixel size may differ from
/// the rectangle's: regions are mapped proportionally into the image and the crop is resized
/// back to the requested region size.
pub struct ImageSampler {
    image: RgbImage,
    screen: ScreenRegion,
}

impl ImageSampler {
    pub fn new(image: RgbImage, screen: ScreenRegion) -> Self {
        Self { image, screen }
    }

    #[instrument(skip(config), fields(path = %config.path.display()))]
    pub fn open(config: &models::ImageCapture) -> Result<Self, CaptureError> {
        let image = ::image::open(&config.path)?.to_rgb8();

        debug!(
            width = image.width(),
            height = image.height(),
            "loaded screen image"
        );

        Ok(Self::new(
            image,
            ScreenRegion::new(config.x, config.y, config.width, config.height),
        ))
    }

    /// Map a virtual-screen region to image pixels as (x, y, width, height)
    fn image_rect(&self, region: &ScreenRegion) -> Option<(u32, u32, u32, u32)> {
        if !self.screen.contains(region) {
            return None;
        }

        let sx = self.image.width() as f64 / self.screen.width as f64;
        let sy = self.image.height() as f64 / self.screen.height as f64;

        let x = ((region.x - self.screen.x) as f64 * sx).floor() as u32;
        let y = ((region.y - self.screen.y) as f64 * sy).floor() as u32;
        let width = ((region.width as f64 * sx).round() as u32)
            .max(1)
            .min(self.image.width() - x);
        let height = ((region.height as f64 * sy).round() as u32)
            .max(1)
            .min(self.image.height() - y);

        Some((x, y, width, height))
    }
}

impl RegionSampler for ImageSampler {
    fn capture(&mut self, region: &ScreenRegion) -> Result<CaptureBuffer, CaptureError> {
        let (x, y, width, height) = self
            .image_rect(region)
            .ok_or(CaptureError::OutOfBounds { region: *region })?;

        let view = imageops::crop_imm(&self.image, x, y, width, height).to_image();

        let view = if (width, height) == (region.width, region.height) {
            view
        } else {
            imageops::resize(
                &view,
                region.width,
                region.height,
                imageops::FilterType::Nearest,
            )
        };

        Ok(view.into())
    }
}
