use crate::color::{gamma_correct, LedColor};

use super::CaptureBuffer;

/// Sub-rectangle of a [`CaptureBuffer`], in buffer pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Area {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Area {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Scan orientation and correction applied while averaging an [`Area`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SampleFlags {
    /// Scan columns from the right edge of the area towards its left edge
    pub reverse_x: bool,
    /// Scan rows from the bottom edge of the area towards its top edge
    pub reverse_y: bool,
    /// Gamma exponent applied to the averaged color
    pub gamma: Option<f32>,
}

/// Sample positions along one axis: every `stride`-th pixel of `start..start + len`, counted
/// from the near edge, or from the far edge when `reverse` is set.
fn axis_samples(
    start: u32,
    len: u32,
    stride: usize,
    reverse: bool,
) -> impl Iterator<Item = u32> + Clone {
    (0..len)
        .step_by(stride)
        .map(move |offset| if reverse { start + len - 1 - offset } else { start + offset })
}

/// Number of pixels [`average`] reads for an area of the given size
pub fn sample_count(width: u32, height: u32, stride: usize) -> u64 {
    let stride = stride as u64;
    ((width as u64 + stride - 1) / stride) * ((height as u64 + stride - 1) / stride)
}

/// Reduce an area of a captured buffer to its mean color
///
/// Only every `stride`-th pixel along each axis is read. Channel sums are divided by the
/// sample count and truncated.
///
/// # Panics
///
/// Panics if `stride` is zero, if the area is empty or if it does not fit inside the buffer.
pub fn average(buffer: &CaptureBuffer, area: Area, stride: usize, flags: SampleFlags) -> LedColor {
    assert!(stride >= 1, "sampling stride must be at least 1");
    assert!(
        area.width > 0 && area.height > 0,
        "empty sampling area {:?}",
        area
    );
    assert!(
        area.x as u64 + area.width as u64 <= buffer.width() as u64
            && area.y as u64 + area.height as u64 <= buffer.height() as u64,
        "sampling area {:?} exceeds {}x{} buffer",
        area,
        buffer.width(),
        buffer.height()
    );

    let xs = axis_samples(area.x, area.width, stride, flags.reverse_x);
    let ys = axis_samples(area.y, area.height, stride, flags.reverse_y);

    let mut r_acc = 0u64;
    let mut g_acc = 0u64;
    let mut b_acc = 0u64;
    let mut cnt = 0u64;

    for y in ys {
        for x in xs.clone() {
            let (r, g, b) = buffer.color_at(x, y).into_components();
            r_acc += r as u64;
            g_acc += g as u64;
            b_acc += b as u64;
            cnt += 1;
        }
    }

    let color = LedColor::new(
        (r_acc / cnt) as u8,
        (g_acc / cnt) as u8,
        (b_acc / cnt) as u8,
    );

    match flags.gamma {
        Some(exponent) => gamma_correct(color, exponent),
        None => color,
    }
}
