use derive_more::Display;
use serde_derive::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

use super::default_false;
use crate::{
    color::DEFAULT_GAMMA,
    image::{Area, SampleFlags},
};

/// Rectangle in virtual screen coordinates
///
/// Monitors share one coordinate space, so a second monitor to the right of a 4K one
/// starts at `x = 3840`.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[display("{width}x{height}+{x}+{y}")]
pub struct ScreenRegion {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl ScreenRegion {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Move the region by the given offset, `None` if it leaves the coordinate space
    pub fn translate(&self, dx: i32, dy: i32) -> Option<Self> {
        Some(Self {
            x: self.x.checked_add(dx)?,
            y: self.y.checked_add(dy)?,
            ..*self
        })
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// true if `other` lies entirely inside this region
    pub fn contains(&self, other: &ScreenRegion) -> bool {
        let (x0, y0) = (self.x as i64, self.y as i64);
        let (x1, y1) = (x0 + self.width as i64, y0 + self.height as i64);
        let (ox, oy) = (other.x as i64, other.y as i64);

        ox >= x0 && oy >= y0 && ox + other.width as i64 <= x1 && oy + other.height as i64 <= y1
    }
}

/// Axis along which a capture strip is cut into LED buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    /// Columns, left to right
    Horizontal,
    /// Rows, top to bottom
    Vertical,
}

/// One captured region and the LEDs it feeds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CaptureStrip {
    /// Region relative to the monitor origin of the geometry
    pub region: ScreenRegion,
    pub axis: Axis,
    /// Number of equal buckets the strip is cut into
    #[validate(range(min = 1))]
    pub segments: u32,
    /// Number of LEDs fed by this strip, defaults to `segments`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leds: Option<u32>,
    /// Frame index of the first LED of this strip
    pub first_index: usize,
    /// LEDs run from the last bucket to the first one
    #[serde(default = "default_false")]
    pub reverse: bool,
    #[serde(default = "default_false")]
    pub reverse_x: bool,
    #[serde(default = "default_false")]
    pub reverse_y: bool,
    #[serde(default = "default_false")]
    pub gamma: bool,
}

impl CaptureStrip {
    pub fn led_count(&self) -> u32 {
        self.leds.unwrap_or(self.segments)
    }

    fn extent(&self) -> u32 {
        match self.axis {
            Axis::Horizontal => self.region.width,
            Axis::Vertical => self.region.height,
        }
    }

    /// Size of one bucket along the strip axis, in pixels
    pub fn bucket_size(&self) -> u32 {
        self.extent() / self.segments
    }

    /// Bucket sampled for the `k`-th LED of this strip
    pub fn bucket_for(&self, k: u32) -> u32 {
        if self.reverse {
            self.segments - 1 - k
        } else {
            k
        }
    }

    /// Area of the capture buffer covered by a bucket
    ///
    /// Neighbouring buckets are separated by one pixel.
    pub fn bucket_area(&self, bucket: u32) -> Area {
        let size = self.bucket_size();

        match self.axis {
            Axis::Horizontal => Area::new(bucket * size, 0, size - 1, self.region.height),
            Axis::Vertical => Area::new(0, bucket * size, self.region.width, size - 1),
        }
    }

    pub fn sample_flags(&self, gamma: f32) -> SampleFlags {
        SampleFlags {
            reverse_x: self.reverse_x,
            reverse_y: self.reverse_y,
            gamma: if self.gamma { Some(gamma) } else { None },
        }
    }
}

fn default_gamma() -> f32 {
    DEFAULT_GAMMA
}

fn default_stride() -> usize {
    2
}

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("geometry has no capture strips")]
    NoStrips,
    #[error("strip {strip}: region {region} is outside the {width}x{height} screen")]
    OutsideScreen {
        strip: usize,
        region: ScreenRegion,
        width: u32,
        height: u32,
    },
    #[error("strip {strip}: region {region} is empty")]
    EmptyRegion { strip: usize, region: ScreenRegion },
    #[error("strip {strip}: offset ({dx}, {dy}) moves the region out of the virtual screen")]
    OffsetOverflow { strip: usize, dx: i32, dy: i32 },
    #[error("strip {strip}: {leds} leds do not fit in {segments} segments")]
    TooManyLeds { strip: usize, leds: u32, segments: u32 },
    #[error("strip {strip}: buckets of {size} px are too small to sample")]
    BucketTooSmall { strip: usize, size: u32 },
    #[error("strip {strip}: led indices end at {end} but the layout only has {led_count} leds")]
    IndexOutOfRange {
        strip: usize,
        end: u64,
        led_count: u64,
    },
    #[error("led index {index} is assigned more than once")]
    DuplicateIndex { index: usize },
}

/// LED layout of one device
///
/// Strip regions are expressed in a reference `width` x `height` screen whose origin sits at
/// (`offset_x`, `offset_y`) in virtual screen coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct Geometry {
    #[validate(range(min = 1))]
    pub width: u32,
    #[validate(range(min = 1))]
    pub height: u32,
    #[serde(default)]
    pub offset_x: i32,
    #[serde(default)]
    pub offset_y: i32,
    #[serde(default = "default_stride")]
    #[validate(range(min = 1))]
    pub stride: usize,
    #[serde(default = "default_gamma")]
    #[validate(range(min = 0.1, max = 10.0))]
    pub gamma: f32,
    #[validate(length(min = 1))]
    #[validate(nested)]
    pub strips: Vec<CaptureStrip>,
}

impl Geometry {
    /// Arduino strip running up the left edge, across the top and down the right edge of the
    /// second of two side-by-side 4K monitors
    pub fn microcontroller() -> Self {
        const WIDTH: u32 = 3840;
        const HEIGHT: u32 = 2160;
        const LEDS_SIDE: u32 = 55;
        const LEDS_TOP: u32 = 75;
        const SIDE_DEPTH: u32 = 300;
        const TOP_DEPTH: u32 = 180;

        let edge = |region, axis, leds: Option<u32>, segments, first_index, reverse| {
            CaptureStrip {
                region,
                axis,
                segments,
                leds,
                first_index,
                reverse,
                reverse_x: true,
                reverse_y: false,
                gamma: true,
            }
        };

        Self {
            width: WIDTH,
            height: HEIGHT,
            offset_x: 3840,
            offset_y: 0,
            stride: 2,
            gamma: DEFAULT_GAMMA,
            strips: vec![
                edge(
                    ScreenRegion::new(0, 0, SIDE_DEPTH, HEIGHT),
                    Axis::Vertical,
                    None,
                    LEDS_SIDE,
                    0,
                    true,
                ),
                edge(
                    ScreenRegion::new(0, 0, WIDTH, TOP_DEPTH),
                    Axis::Horizontal,
                    None,
                    LEDS_TOP,
                    LEDS_SIDE as usize,
                    false,
                ),
                // The right side of the install is five LEDs short
                edge(
                    ScreenRegion::new((WIDTH - SIDE_DEPTH) as i32, 0, SIDE_DEPTH, HEIGHT),
                    Axis::Vertical,
                    Some(LEDS_SIDE - 5),
                    LEDS_SIDE,
                    (LEDS_SIDE + LEDS_TOP) as usize,
                    false,
                ),
            ],
        }
    }

    /// Raspberry Pi strips along the top and bottom edges of a 1080p monitor
    pub fn single_board() -> Self {
        const WIDTH: u32 = 1920;
        const HEIGHT: u32 = 1080;
        const LEDS: u32 = 144;
        const DEPTH: u32 = 180;

        let edge = |y, first_index| CaptureStrip {
            region: ScreenRegion::new(0, y, WIDTH, DEPTH),
            axis: Axis::Horizontal,
            segments: LEDS,
            leds: None,
            first_index,
            reverse: false,
            reverse_x: false,
            reverse_y: false,
            gamma: false,
        };

        Self {
            width: WIDTH,
            height: HEIGHT,
            offset_x: 0,
            offset_y: 0,
            stride: 2,
            gamma: DEFAULT_GAMMA,
            strips: vec![
                edge(0, 0),
                edge((HEIGHT - DEPTH) as i32, LEDS as usize),
            ],
        }
    }

    pub fn screen(&self) -> ScreenRegion {
        ScreenRegion::new(0, 0, self.width, self.height)
    }

    /// Check the layout and return the number of LEDs it drives
    ///
    /// Strip index ranges must cover `0..count` with every index assigned exactly once.
    pub fn check(&self) -> Result<usize, GeometryError> {
        if self.strips.is_empty() {
            return Err(GeometryError::NoStrips);
        }

        let screen = self.screen();

        // Indices must cover 0..led_count exactly once, so no strip may end past it
        let led_count: u64 = self.strips.iter().map(|s| s.led_count() as u64).sum();
        let mut assigned = vec![false; led_count as usize];

        for (strip_idx, strip) in self.strips.iter().enumerate() {
            if strip.region.is_empty() {
                return Err(GeometryError::EmptyRegion {
                    strip: strip_idx,
                    region: strip.region,
                });
            }

            if !screen.contains(&strip.region) {
                return Err(GeometryError::OutsideScreen {
                    strip: strip_idx,
                    region: strip.region,
                    width: self.width,
                    height: self.height,
                });
            }

            if strip.led_count() > strip.segments {
                return Err(GeometryError::TooManyLeds {
                    strip: strip_idx,
                    leds: strip.led_count(),
                    segments: strip.segments,
                });
            }

            if strip.bucket_size() < 2 {
                return Err(GeometryError::BucketTooSmall {
                    strip: strip_idx,
                    size: strip.bucket_size(),
                });
            }

            if strip
                .region
                .translate(self.offset_x, self.offset_y)
                .is_none()
            {
                return Err(GeometryError::OffsetOverflow {
                    strip: strip_idx,
                    dx: self.offset_x,
                    dy: self.offset_y,
                });
            }

            let end = (strip.first_index as u64).saturating_add(strip.led_count() as u64);
            if end > led_count {
                return Err(GeometryError::IndexOutOfRange {
                    strip: strip_idx,
                    end,
                    led_count,
                });
            }

            for index in strip.first_index..end as usize {
                if std::mem::replace(&mut assigned[index], true) {
                    return Err(GeometryError::DuplicateIndex { index });
                }
            }
        }

        Ok(assigned.len())
    }
}

/// Device geometry, either by preset name or spelled out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeometrySource {
    Preset(Preset),
    Custom(Geometry),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    Microcontroller,
    SingleBoard,
}

impl GeometrySource {
    pub fn resolve(&self) -> Geometry {
        match self {
            GeometrySource::Preset(Preset::Microcontroller) => Geometry::microcontroller(),
            GeometrySource::Preset(Preset::SingleBoard) => Geometry::single_board(),
            GeometrySource::Custom(geometry) => geometry.clone(),
        }
    }
}

impl Validate for GeometrySource {
    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        match self {
            GeometrySource::Preset(_) => Ok(()),
            GeometrySource::Custom(geometry) => geometry.validate(),
        }
    }
}
