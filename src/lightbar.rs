//! The lightbar as seen by its callers: prepare an image, display frames,
//! turn the strip off.

use crate::Color;
use crate::codec::{PixelCodec, brightness_byte};
use crate::config::LightbarConfig;
use crate::error::{LightbarError, Result};
use crate::frame::LogicalFrame;
use crate::playback::{
    DEFAULT_FPS, PlaybackObserver, PlaybackReport, PlaybackScheduler, ThroughputReport,
};
use crate::sequencer::{ImageSequencer, ResamplingMode};
use crate::topology::{FrameSink, SegmentTopology};
use crate::transport::Transport;
use image::{DynamicImage, Rgba, RgbaImage, RgbImage};
use serde::{Deserialize, Serialize};

/// Per-display rendering parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DisplaySettings {
    /// Global brightness, 0.0 - 1.0
    pub brightness: f32,
    /// Target frame rate; out-of-range values fall back to 30
    pub fps: f64,
    /// Extra passes over the sequence after the first
    pub repeat: usize,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            brightness: 1.0,
            fps: DEFAULT_FPS,
            repeat: 0,
        }
    }
}

// ── Prepare ─────────────────────────────────────────────────────────

/// An image fitted to the strip, plus its wire-encoded preview.
pub struct Prepared {
    /// The image resized to the strip height
    pub resized: RgbImage,
    /// Same size as `resized`; each pixel holds the four wire bytes
    /// `[brightness, byte0, byte1, byte2]` in RGBA order
    pub preview: RgbaImage,
}

/// Fit `image` to the strip and encode a preview. No hardware I/O.
pub fn prepare(
    image: &DynamicImage,
    config: &LightbarConfig,
    mode: ResamplingMode,
    brightness: f32,
) -> Result<Prepared> {
    let sequencer = ImageSequencer::new(image, config.total_pixels(), mode)?;
    let codec = PixelCodec::new(config.mapping());
    let preview = encode_preview(sequencer.image(), &codec, brightness.clamp(0.0, 1.0));
    Ok(Prepared {
        resized: sequencer.into_image(),
        preview,
    })
}

/// Encode every pixel of `image` into its wire bytes, kept in image layout.
pub fn encode_preview(image: &RgbImage, codec: &PixelCodec, brightness: f32) -> RgbaImage {
    let brightness = brightness_byte(brightness);
    RgbaImage::from_fn(image.width(), image.height(), |x, y| {
        Rgba(codec.encode_with(Color::from(*image.get_pixel(x, y)), brightness))
    })
}

// ── Lightbar ────────────────────────────────────────────────────────

/// A segmented strip plus the scheduler that drives it.
///
/// Owns every transport. Only one playback can run at a time: `display`
/// takes `&mut self` and blocks until it returns.
pub struct Lightbar<T> {
    topology: SegmentTopology<T>,
    scheduler: PlaybackScheduler,
}

impl<T: Transport> Lightbar<T> {
    pub fn new(topology: SegmentTopology<T>) -> Self {
        Self {
            topology,
            scheduler: PlaybackScheduler::new(),
        }
    }

    pub fn total_pixels(&self) -> usize {
        self.topology.total_pixels()
    }

    /// Unpaced throughput run over `frames`; see
    /// [`PlaybackScheduler::measure_throughput`].
    pub fn measure_throughput<O>(
        &mut self,
        frames: &[LogicalFrame],
        n: usize,
        report_every: usize,
        observer: &O,
    ) -> Result<ThroughputReport>
    where
        O: PlaybackObserver + ?Sized,
    {
        self.scheduler
            .measure_throughput(&mut self.topology, frames, n, report_every, observer)
    }

    /// Play `frames` with `settings`, blocking until done or stopped by
    /// `observer`. Frames of the wrong length are rejected before any write.
    pub fn display<I, O>(
        &mut self,
        frames: I,
        settings: &DisplaySettings,
        observer: &mut O,
    ) -> Result<PlaybackReport>
    where
        I: ExactSizeIterator<Item = LogicalFrame> + Clone,
        O: PlaybackObserver + ?Sized,
    {
        let expected = self.total_pixels();
        if let Some(first) = frames.clone().next() {
            if first.len() != expected {
                return Err(LightbarError::FrameSizeMismatch {
                    expected,
                    actual: first.len(),
                });
            }
        }

        let brightness = settings.brightness;
        let frames = frames.map(move |frame| frame.with_brightness(brightness));
        self.scheduler.play(
            &mut self.topology,
            frames,
            settings.fps,
            settings.repeat,
            observer,
        )
    }

    /// Play every column of a prepared image.
    pub fn display_image<O>(
        &mut self,
        sequencer: &ImageSequencer,
        settings: &DisplaySettings,
        observer: &mut O,
    ) -> Result<PlaybackReport>
    where
        O: PlaybackObserver + ?Sized,
    {
        self.display(sequencer.frames(), settings, observer)
    }

    /// One all-dark frame.
    pub fn turn_off(&mut self) -> Result<PlaybackReport> {
        let black = LogicalFrame::black(self.total_pixels());
        self.scheduler
            .play(&mut self.topology, std::iter::once(black), DEFAULT_FPS, 0, &mut ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChannelMapping, Direction, SegmentConfig};
    use crate::framer::framed_len;
    use crate::transport::testing::RecordingTransport;
    use image::Rgb;
    use pretty_assertions::assert_eq;

    fn config() -> LightbarConfig {
        let segments = vec![
            SegmentConfig {
                address: "a".to_string(),
                pixel_count: 3,
                direction: Direction::Forward,
            },
            SegmentConfig {
                address: "b".to_string(),
                pixel_count: 2,
                direction: Direction::Reversed,
            },
        ];
        LightbarConfig::new(5, segments, 1_000_000, ChannelMapping::new(2, 1, 0).unwrap())
            .unwrap()
    }

    fn lightbar() -> (Lightbar<RecordingTransport>, RecordingTransport, RecordingTransport) {
        let a = RecordingTransport::new();
        let b = RecordingTransport::new();
        let topology = SegmentTopology::new(&config(), vec![a.clone(), b.clone()]).unwrap();
        (Lightbar::new(topology), a, b)
    }

    #[test]
    fn prepare_fits_height_and_encodes_preview() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 10, Rgb([255, 0, 0])));
        let prepared = prepare(&image, &config(), ResamplingMode::Nearest, 0.0).unwrap();

        assert_eq!(prepared.resized.dimensions(), (10, 5));
        assert_eq!(prepared.preview.dimensions(), (10, 5));
        // BGR mapping puts red last; brightness floor is level 1.
        assert_eq!(prepared.preview.get_pixel(0, 0), &Rgba([0xE1, 0, 0, 255]));
    }

    #[test]
    fn display_writes_each_column_to_every_segment() {
        let (mut lightbar, a, b) = lightbar();
        let sequencer = ImageSequencer::from_resized(RgbImage::new(4, 5));
        let settings = DisplaySettings {
            brightness: 0.5,
            ..DisplaySettings::default()
        };

        let report = lightbar.display_image(&sequencer, &settings, &mut ()).unwrap();

        assert_eq!(report.frames_written, 4);
        assert_eq!(a.sent().len(), 4);
        assert_eq!(b.sent().len(), 4);
        assert_eq!(a.sent()[0].len(), framed_len(3));
        assert_eq!(a.sent()[0][4], brightness_byte(0.5));
    }

    #[test]
    fn wrong_frame_length_is_rejected_before_any_write() {
        let (mut lightbar, a, _) = lightbar();
        let frames = vec![LogicalFrame::black(7)];

        let err = lightbar
            .display(frames.into_iter(), &DisplaySettings::default(), &mut ())
            .unwrap_err();

        assert!(matches!(
            err,
            LightbarError::FrameSizeMismatch {
                expected: 5,
                actual: 7
            }
        ));
        assert!(a.sent().is_empty());
    }

    #[test]
    fn mis_sized_frame_mid_sequence_aborts_playback() {
        let (mut lightbar, a, b) = lightbar();
        let frames = vec![LogicalFrame::black(5), LogicalFrame::black(4)];

        let err = lightbar
            .display(frames.into_iter(), &DisplaySettings::default(), &mut ())
            .unwrap_err();

        match err {
            LightbarError::PlaybackAborted { report, source } => {
                assert_eq!(report.frames_written, 1);
                assert!(matches!(
                    *source,
                    LightbarError::FrameSizeMismatch {
                        expected: 5,
                        actual: 4
                    }
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(a.sent().len(), 1);
        assert_eq!(b.sent().len(), 1);
    }

    #[test]
    fn throughput_run_hits_the_transports() {
        let (mut lightbar, a, _) = lightbar();
        let sweep = LogicalFrame::sweep(5, Color::new(0, 0, 255));
        let report = lightbar.measure_throughput(&sweep, 7, 0, &()).unwrap();
        assert_eq!(report.frames, 7);
        assert_eq!(a.sent().len(), 7);
    }

    #[test]
    fn turn_off_sends_one_dark_frame() {
        let (mut lightbar, a, b) = lightbar();
        let report = lightbar.turn_off().unwrap();

        assert_eq!(report.frames_written, 1);
        let expected_a: Vec<u8> = crate::framer::wrap(vec![[0xFF, 0, 0, 0]; 3]);
        assert_eq!(a.sent(), vec![expected_a]);
        assert_eq!(b.sent().len(), 1);
    }
}
