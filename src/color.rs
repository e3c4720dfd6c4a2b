//! LED color type and the corrections applied to sampled colors

/// Color of a single LED, as linear 8-bit RGB
pub type LedColor = palette::rgb::LinSrgb<u8>;

/// Color used to turn a LED off
pub const OFF: LedColor = LedColor::new(0, 0, 0);

/// Default exponent for [`gamma`] correction
pub const DEFAULT_GAMMA: f32 = 2.2;

/// Apply gamma correction to a single 8-bit channel
///
/// # Parameters
///
/// * `x`: channel value
/// * `gamma`: correction exponent, 1.0 leaves the value unchanged
pub fn gamma(x: u8, gamma: f32) -> u8 {
    ((x as f32 / 255.0).powf(gamma) * 255.0) as u8
}

/// Apply gamma correction to every channel of a color
pub fn gamma_correct(color: LedColor, exponent: f32) -> LedColor {
    let (r, g, b) = color.into_components();
    LedColor::new(gamma(r, exponent), gamma(g, exponent), gamma(b, exponent))
}
