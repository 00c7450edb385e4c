//! Per-pixel wire encoding for APA102-style ("DotStar") LEDs.
//!
//! Every LED in the chain takes four bytes: a global brightness byte whose top
//! three bits are always set, followed by three gamma-corrected color bytes in
//! the strip's channel order.

use crate::Color;
use crate::config::ChannelMapping;

/// Fixed gamma exponent for the LED transfer curve.
pub const GAMMA: f64 = 2.5;

/// Protocol marker carried in the top three bits of every brightness byte.
const BRIGHTNESS_MARKER: u8 = 0b1110_0000;

/// Highest 5-bit brightness level.
const MAX_BRIGHTNESS_LEVEL: u8 = 0x1F;

// ── Gamma ───────────────────────────────────────────────────────────

/// Precomputed `byte → byte` gamma curve.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GammaTable([u8; 256]);

impl GammaTable {
    pub fn new(gamma: f64) -> Self {
        let mut table = [0u8; 256];
        for (v, slot) in table.iter_mut().enumerate() {
            let corrected = (v as f64 / 255.0).powf(gamma) * 255.0;
            *slot = corrected.clamp(0.0, 255.0).round() as u8;
        }
        Self(table)
    }

    #[inline]
    pub fn correct(&self, value: u8) -> u8 {
        self.0[value as usize]
    }
}

impl Default for GammaTable {
    fn default() -> Self {
        Self::new(GAMMA)
    }
}

// ── Brightness ──────────────────────────────────────────────────────

/// Global brightness byte for `brightness` in `[0, 1]`.
///
/// The 5-bit level never drops below 1, so a dimmed frame is never gated dark
/// by the LED driver itself. Callers clamp `brightness` beforehand.
pub fn brightness_byte(brightness: f32) -> u8 {
    let level = (f32::from(MAX_BRIGHTNESS_LEVEL) * brightness).round() as u8;
    BRIGHTNESS_MARKER | level.clamp(1, MAX_BRIGHTNESS_LEVEL)
}

// ── Codec ───────────────────────────────────────────────────────────

/// Encodes logical pixels into the 4-byte wire form.
#[derive(Clone, Debug, Default)]
pub struct PixelCodec {
    gamma: GammaTable,
    mapping: ChannelMapping,
}

impl PixelCodec {
    pub fn new(mapping: ChannelMapping) -> Self {
        Self {
            gamma: GammaTable::default(),
            mapping,
        }
    }

    /// Encode one pixel: `[brightness, byte0, byte1, byte2]`.
    pub fn encode(&self, pixel: Color, brightness: f32) -> [u8; 4] {
        self.encode_with(pixel, brightness_byte(brightness))
    }

    /// Encode with a precomputed brightness byte (shared across a frame).
    #[inline]
    pub fn encode_with(&self, pixel: Color, brightness: u8) -> [u8; 4] {
        let g = &self.gamma;
        let [c0, c1, c2] = self.mapping.arrange([
            g.correct(pixel.r),
            g.correct(pixel.g),
            g.correct(pixel.b),
        ]);
        [brightness, c0, c1, c2]
    }
}
