//! Logical frames: one color per logical pixel plus a shared brightness.

use crate::Color;

/// One full strip's worth of pixels, in logical index order.
#[derive(Clone, Debug, PartialEq)]
pub struct LogicalFrame {
    pixels: Vec<Color>,
    brightness: f32,
}

impl LogicalFrame {
    pub fn new(pixels: Vec<Color>, brightness: f32) -> Self {
        Self { pixels, brightness }
    }

    /// All pixels off. Used for turning the strip off.
    pub fn black(len: usize) -> Self {
        Self::new(vec![Color::BLACK; len], 1.0)
    }

    /// A dark strip with only `index` lit; handy for wiring checks and
    /// throughput measurement.
    pub fn single_pixel(len: usize, index: usize, color: Color) -> Self {
        let mut frame = Self::black(len);
        if let Some(pixel) = frame.pixels.get_mut(index) {
            *pixel = color;
        }
        frame
    }

    /// A sweep of [`single_pixel`](Self::single_pixel) frames, one per index.
    pub fn sweep(len: usize, color: Color) -> Vec<Self> {
        (0..len).map(|i| Self::single_pixel(len, i, color)).collect()
    }

    pub fn pixels(&self) -> &[Color] {
        &self.pixels
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn brightness(&self) -> f32 {
        self.brightness
    }

    pub fn with_brightness(mut self, brightness: f32) -> Self {
        self.brightness = brightness;
        self
    }
}
