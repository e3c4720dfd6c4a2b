//! Screen geometry to LED index mapping

use crate::{
    frame::LedFrame,
    image::{average, Area, CaptureError, RegionSampler, SampleFlags},
    models::{Geometry, GeometryError, ScreenRegion},
    pipeline::PauseFlag,
};

/// One LED fed by a captured region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    /// Area of the region's capture buffer averaged for this LED
    pub area: Area,
    /// Destination index in the frame
    pub index: usize,
}

/// A region captured once per cycle and the LEDs drawing from it
#[derive(Debug, Clone)]
struct StripPlan {
    region: ScreenRegion,
    flags: SampleFlags,
    assignments: Vec<Assignment>,
}

/// Turns screen captures into LED frames for one device geometry
#[derive(Debug, Clone)]
pub struct LedMapper {
    strips: Vec<StripPlan>,
    stride: usize,
    led_count: usize,
}

impl LedMapper {
    pub fn new(geometry: &Geometry) -> Result<Self, GeometryError> {
        let led_count = geometry.check()?;

        let strips = geometry
            .strips
            .iter()
            .enumerate()
            .map(|(strip_idx, strip)| {
                let region = strip
                    .region
                    .translate(geometry.offset_x, geometry.offset_y)
                    .ok_or(GeometryError::OffsetOverflow {
                        strip: strip_idx,
                        dx: geometry.offset_x,
                        dy: geometry.offset_y,
                    })?;

                Ok(StripPlan {
                    region,
                    flags: strip.sample_flags(geometry.gamma),
                    assignments: (0..strip.led_count())
                        .map(|k| Assignment {
                            area: strip.bucket_area(strip.bucket_for(k)),
                            index: strip.first_index + k as usize,
                        })
                        .collect(),
                })
            })
            .collect::<Result<Vec<_>, GeometryError>>()?;

        Ok(Self {
            strips,
            stride: geometry.stride,
            led_count,
        })
    }

    /// Length of the frames produced by [`LedMapper::refresh`]
    pub fn led_count(&self) -> usize {
        self.led_count
    }

    /// Virtual screen regions captured every cycle
    pub fn regions(&self) -> impl Iterator<Item = &ScreenRegion> {
        self.strips.iter().map(|strip| &strip.region)
    }

    /// All (area, index) pairs, grouped by region in capture order
    pub fn assignments(&self) -> impl Iterator<Item = (&ScreenRegion, &Assignment)> {
        self.strips.iter().flat_map(|strip| {
            strip
                .assignments
                .iter()
                .map(move |assignment| (&strip.region, assignment))
        })
    }

    /// Run one capture cycle
    ///
    /// Returns `None` without capturing anything when `pause` is set. Otherwise every region
    /// is captured exactly once and each LED is averaged from its region's buffer.
    pub fn refresh(
        &self,
        sampler: &mut dyn RegionSampler,
        pause: &PauseFlag,
    ) -> Result<Option<LedFrame>, CaptureError> {
        if pause.is_paused() {
            return Ok(None);
        }

        let buffers = self
            .strips
            .iter()
            .map(|strip| {
                let buffer = sampler.capture(&strip.region)?;

                if (buffer.width(), buffer.height()) != (strip.region.width, strip.region.height)
                {
                    return Err(CaptureError::Dimensions {
                        region: strip.region,
                        width: buffer.width(),
                        height: buffer.height(),
                    });
                }

                Ok(buffer)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut frame = LedFrame::new(self.led_count);

        for (strip, buffer) in self.strips.iter().zip(buffers.iter()) {
            for assignment in &strip.assignments {
                frame.set(
                    assignment.index,
                    average(buffer, assignment.area, self.stride, strip.flags),
                );
            }
        }

        Ok(Some(frame))
    }
}
