//! Drive a segmented APA102 lightbar from images.
//!
//! The pipeline, leaves first:
//! - [`codec`] turns one pixel into its 4-byte wire form
//! - [`framer`] adds the start/end frames around a chain's pixels
//! - [`topology`] fans a logical frame out over the wired segments
//! - [`sequencer`] turns an image into one frame per column
//! - [`playback`] paces frames onto the strip and reports timing
//!
//! [`lightbar`] ties these together behind `prepare`, `display` and
//! `turn_off`. The [`render`], [`server`] and [`store`] modules are the
//! HTTP server's plumbing around that core.

pub mod codec;
pub mod config;
pub mod error;
pub mod frame;
pub mod framer;
pub mod lightbar;
pub mod playback;
pub mod render;
pub mod sequencer;
pub mod server;
pub mod store;
pub mod topology;
pub mod transport;

pub use config::{ChannelMapping, Direction, LightbarConfig, LightbarSettings};
pub use error::{LightbarError, Result};
pub use frame::LogicalFrame;
pub use lightbar::{DisplaySettings, Lightbar, Prepared, prepare};
pub use playback::{CancelToken, PlaybackReport, PlaybackScheduler};
pub use sequencer::{ImageSequencer, ResamplingMode};
pub use topology::{FrameSink, SegmentLayout, SegmentTopology};
pub use transport::Transport;

// ── Color ──────────────────────────────────────────────────────────

/// One logical pixel, 8 bits per channel, before gamma and channel mapping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl From<image::Rgb<u8>> for Color {
    fn from(image::Rgb([r, g, b]): image::Rgb<u8>) -> Self {
        Self::new(r, g, b)
    }
}

// ── Signals ────────────────────────────────────────────────────────

/// Return a [`CancelToken`] that trips on Ctrl+C.
///
/// Pass it to [`PlaybackScheduler`] as the observer so a long run stops
/// cleanly between frames.
pub fn setup_signal_handler() -> std::result::Result<CancelToken, ctrlc::Error> {
    let token = CancelToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || handler_token.cancel())?;
    Ok(token)
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn color_new() {
        let c = Color::new(10, 20, 30);
        assert_eq!(c.r, 10);
        assert_eq!(c.g, 20);
        assert_eq!(c.b, 30);
    }

    #[test]
    fn black_is_default() {
        assert_eq!(Color::default(), Color::BLACK);
    }

    #[test]
    fn color_from_image_pixel() {
        assert_eq!(Color::from(image::Rgb([1, 2, 3])), Color::new(1, 2, 3));
    }
}
