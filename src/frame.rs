//! Complete LED color assignment for one refresh cycle

use std::ops::Index;

use crate::color::{LedColor, OFF};

/// Colors for every LED of a strip, in wiring order
///
/// The length is fixed when the frame is created. A mapper fills a fresh frame every cycle and
/// hands it over to the device by value.
#[derive(Debug, Clone, PartialEq)]
pub struct LedFrame {
    colors: Vec<LedColor>,
}

impl LedFrame {
    /// Create a frame of `len` LEDs, all off
    pub fn new(len: usize) -> Self {
        Self {
            colors: vec![OFF; len],
        }
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Set the color of the LED at `index`
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn set(&mut self, index: usize, color: LedColor) {
        self.colors[index] = color;
    }

    pub fn get(&self, index: usize) -> Option<LedColor> {
        self.colors.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LedColor> {
        self.colors.iter()
    }

    pub fn as_slice(&self) -> &[LedColor] {
        &self.colors
    }
}

impl Index<usize> for LedFrame {
    type Output = LedColor;

    fn index(&self, index: usize) -> &Self::Output {
        &self.colors[index]
    }
}

impl From<Vec<LedColor>> for LedFrame {
    fn from(colors: Vec<LedColor>) -> Self {
        Self { colors }
    }
}
