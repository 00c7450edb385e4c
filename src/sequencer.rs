//! Image → frame sequence: scan an image sideways across the strip.
//!
//! The image is resized so its height equals the strip length. Each column,
//! top to bottom, then becomes one logical frame, so the horizontal axis turns
//! into time.

use crate::Color;
use crate::error::{LightbarError, Result};
use crate::frame::LogicalFrame;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ── Resampling ──────────────────────────────────────────────────────

/// Resampling filter used when fitting an image to the strip height.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResamplingMode {
    Nearest,
    Box,
    Bilinear,
    Hamming,
    #[default]
    Bicubic,
    Lanczos,
}

impl ResamplingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ResamplingMode::Nearest => "NEAREST",
            ResamplingMode::Box => "BOX",
            ResamplingMode::Bilinear => "BILINEAR",
            ResamplingMode::Hamming => "HAMMING",
            ResamplingMode::Bicubic => "BICUBIC",
            ResamplingMode::Lanczos => "LANCZOS",
        }
    }

    /// Resize `image` to exactly `width` x `height`.
    fn resize(self, image: &RgbImage, width: u32, height: u32) -> RgbImage {
        let shrinking = width <= image.width() && height <= image.height();
        let filter = match self {
            // Area averaging: every source pixel lands in exactly one target.
            ResamplingMode::Box if shrinking => return imageops::thumbnail(image, width, height),
            ResamplingMode::Box | ResamplingMode::Nearest => FilterType::Nearest,
            ResamplingMode::Bilinear => FilterType::Triangle,
            // Closest short-support windowed kernel the image crate offers.
            ResamplingMode::Hamming => FilterType::Gaussian,
            ResamplingMode::Bicubic => FilterType::CatmullRom,
            ResamplingMode::Lanczos => FilterType::Lanczos3,
        };
        imageops::resize(image, width, height, filter)
    }
}

impl FromStr for ResamplingMode {
    type Err = LightbarError;

    /// Case-insensitive; `LANCZOS3`, `ANTIALIAS` and `CATMULLROM` are accepted
    /// as aliases.
    fn from_str(s: &str) -> Result<Self> {
        let mode = match s.trim().to_ascii_uppercase().as_str() {
            "NEAREST" => ResamplingMode::Nearest,
            "BOX" => ResamplingMode::Box,
            "BILINEAR" | "LINEAR" | "TRIANGLE" => ResamplingMode::Bilinear,
            "HAMMING" => ResamplingMode::Hamming,
            "BICUBIC" | "CUBIC" | "CATMULLROM" => ResamplingMode::Bicubic,
            "LANCZOS" | "LANCZOS3" | "ANTIALIAS" => ResamplingMode::Lanczos,
            _ => return Err(LightbarError::InvalidResamplingMode(s.to_string())),
        };
        Ok(mode)
    }
}

impl fmt::Display for ResamplingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Image preparation ───────────────────────────────────────────────

/// Composite `image` over black, dropping transparency.
pub fn flatten_on_black(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let mut canvas = RgbaImage::from_pixel(image.width(), image.height(), Rgba([0, 0, 0, 255]));
    imageops::overlay(&mut canvas, &image.to_rgba8(), 0, 0);
    DynamicImage::ImageRgba8(canvas).to_rgb8()
}

/// Width that keeps the aspect ratio once the height becomes `target_height`.
pub fn scaled_width(width: u32, height: u32, target_height: u32) -> u32 {
    let scaled = (f64::from(target_height) * f64::from(width) / f64::from(height)).round();
    (scaled as u32).max(1)
}

/// Fit `image` to `target_height` pixels tall, keeping its aspect ratio.
///
/// An image that is already the right height is returned untouched; a
/// same-size resample would only blur it.
pub fn fit_to_height(image: &DynamicImage, target_height: u32, mode: ResamplingMode) -> Result<RgbImage> {
    if image.width() == 0 || image.height() == 0 || target_height == 0 {
        return Err(LightbarError::EmptyImage);
    }
    let flat = flatten_on_black(image);
    if flat.height() == target_height {
        return Ok(flat);
    }
    let width = scaled_width(flat.width(), flat.height(), target_height);
    Ok(mode.resize(&flat, width, target_height))
}

// ── Sequencer ───────────────────────────────────────────────────────

/// A resized image ready to be played column by column.
#[derive(Clone, Debug)]
pub struct ImageSequencer {
    image: RgbImage,
    brightness: f32,
}

impl ImageSequencer {
    /// Resize `image` for a strip of `target_height` pixels.
    pub fn new(image: &DynamicImage, target_height: usize, mode: ResamplingMode) -> Result<Self> {
        let target = u32::try_from(target_height).map_err(|_| {
            LightbarError::Configuration(format!("strip length {target_height} is too large"))
        })?;
        Ok(Self::from_resized(fit_to_height(image, target, mode)?))
    }

    /// Wrap an image that already has the strip's height.
    pub fn from_resized(image: RgbImage) -> Self {
        Self {
            image,
            brightness: 1.0,
        }
    }

    /// Brightness stamped on every produced frame.
    pub fn with_brightness(mut self, brightness: f32) -> Self {
        self.brightness = brightness;
        self
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// Number of frames per pass: the resized width.
    pub fn frame_count(&self) -> usize {
        self.image.width() as usize
    }

    /// A fresh pass over the columns. Every call yields identical frames.
    pub fn frames(&self) -> Columns<'_> {
        Columns {
            image: &self.image,
            x: 0,
            brightness: self.brightness,
        }
    }
}

/// Iterator over an image's columns as logical frames.
#[derive(Clone, Debug)]
pub struct Columns<'a> {
    image: &'a RgbImage,
    x: u32,
    brightness: f32,
}

impl Iterator for Columns<'_> {
    type Item = LogicalFrame;

    fn next(&mut self) -> Option<LogicalFrame> {
        if self.x >= self.image.width() {
            return None;
        }
        let x = self.x;
        self.x += 1;
        let pixels = (0..self.image.height())
            .map(|y| Color::from(*self.image.get_pixel(x, y)))
            .collect();
        Some(LogicalFrame::new(pixels, self.brightness))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.image.width().saturating_sub(self.x) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Columns<'_> {}
