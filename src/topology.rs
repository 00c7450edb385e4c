//! Fan-out of one logical strip onto independently wired segments.
//!
//! Segments consume contiguous, disjoint slices of the logical frame in their
//! configured order. A reversed segment is wired tail-to-head, so its slice is
//! flipped before encoding. Direction never changes which pixels a segment
//! gets, only their order on its own wire.

use crate::codec::{PixelCodec, brightness_byte};
use crate::config::{Direction, LightbarConfig, SegmentConfig};
use crate::error::{LightbarError, Result};
use crate::frame::LogicalFrame;
use crate::framer::wrap;
use crate::transport::Transport;
use crate::Color;
use std::io;
use std::ops::Range;

/// Where each segment's pixels live in the logical index space.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentLayout {
    spans: Vec<Span>,
    total_pixels: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Span {
    range: Range<usize>,
    direction: Direction,
}

impl SegmentLayout {
    /// Lay out the segments of a validated configuration.
    pub fn new(config: &LightbarConfig) -> Self {
        let mut start = 0;
        let spans = config
            .segments()
            .iter()
            .map(|segment| {
                let range = start..start + segment.pixel_count;
                start = range.end;
                Span {
                    range,
                    direction: segment.direction,
                }
            })
            .collect();
        Self {
            spans,
            total_pixels: config.total_pixels(),
        }
    }

    pub fn total_pixels(&self) -> usize {
        self.total_pixels
    }

    /// Encode and frame `frame` into one wire buffer per segment, in segment
    /// order.
    ///
    /// A frame shorter than the layout leaves the missing segments with no
    /// pixels; [`SegmentTopology`] rejects such frames before splitting.
    pub fn split(&self, frame: &LogicalFrame, codec: &PixelCodec) -> Vec<Vec<u8>> {
        let brightness = brightness_byte(frame.brightness());
        self.spans
            .iter()
            .map(|span| {
                let slice = frame.pixels().get(span.range.clone()).unwrap_or(&[]);
                let encode = |pixel: &Color| codec.encode_with(*pixel, brightness);
                match span.direction {
                    Direction::Forward => wrap(slice.iter().map(encode)),
                    Direction::Reversed => wrap(slice.iter().rev().map(encode)),
                }
            })
            .collect()
    }
}

// ── Output ──────────────────────────────────────────────────────────

/// Something that can put a whole logical frame on the strip.
pub trait FrameSink {
    /// Logical strip length the sink expects.
    fn total_pixels(&self) -> usize;

    fn write_frame(&mut self, frame: &LogicalFrame) -> Result<()>;
}

/// The segmented strip: layout, codec, and exclusive ownership of every
/// segment's transport.
pub struct SegmentTopology<T> {
    layout: SegmentLayout,
    codec: PixelCodec,
    transports: Vec<T>,
}

impl<T: Transport> SegmentTopology<T> {
    /// Pair each configured segment with its transport, in segment order.
    pub fn new(config: &LightbarConfig, transports: Vec<T>) -> Result<Self> {
        if transports.len() != config.segments().len() {
            return Err(LightbarError::Configuration(format!(
                "{} segments configured but {} transports supplied",
                config.segments().len(),
                transports.len()
            )));
        }
        Ok(Self {
            layout: SegmentLayout::new(config),
            codec: PixelCodec::new(config.mapping()),
            transports,
        })
    }

    /// Open a transport for every configured segment.
    pub fn open<F>(config: &LightbarConfig, mut open: F) -> Result<Self>
    where
        F: FnMut(&SegmentConfig) -> io::Result<T>,
    {
        let transports = config
            .segments()
            .iter()
            .map(|segment| {
                open(segment).map_err(|e| {
                    LightbarError::Configuration(format!(
                        "cannot open transport {}: {e}",
                        segment.address
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(config, transports)
    }
}

impl<T: Transport> FrameSink for SegmentTopology<T> {
    fn total_pixels(&self) -> usize {
        self.layout.total_pixels()
    }

    /// Segments are written one after another; a failure stops the frame at
    /// the failing segment. A frame of the wrong length writes nothing.
    fn write_frame(&mut self, frame: &LogicalFrame) -> Result<()> {
        let expected = self.layout.total_pixels();
        if frame.len() != expected {
            return Err(LightbarError::FrameSizeMismatch {
                expected,
                actual: frame.len(),
            });
        }
        let buffers = self.layout.split(frame, &self.codec);
        for (segment, (buffer, transport)) in buffers.iter().zip(&mut self.transports).enumerate() {
            transport
                .send(buffer)
                .map_err(|source| LightbarError::TransportWrite { segment, source })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelMapping;
    use crate::framer::{START_FRAME, end_frame_len, framed_len};
    use crate::transport::testing::{FailingTransport, RecordingTransport};
    use pretty_assertions::assert_eq;

    fn config(segments: &[(usize, Direction)]) -> LightbarConfig {
        let segments = segments
            .iter()
            .enumerate()
            .map(|(i, &(pixel_count, direction))| SegmentConfig {
                address: format!("/dev/spidev{i}.0"),
                pixel_count,
                direction,
            })
            .collect::<Vec<_>>();
        let total = segments.iter().map(|s| s.pixel_count).sum();
        LightbarConfig::new(total, segments, 1_000_000, ChannelMapping::rgb()).unwrap()
    }

    /// Every pixel encodes to a distinct wire group (gamma keeps 100..=240 apart).
    fn indexed_frame(len: usize) -> LogicalFrame {
        LogicalFrame::new(
            (0..len).map(|i| Color::new(100 + 10 * i as u8, 0, 0)).collect(),
            1.0,
        )
    }

    /// Logical index of each pixel group in a framed buffer, in wire order.
    fn wire_indices(buffer: &[u8], frame: &LogicalFrame, codec: &PixelCodec) -> Vec<usize> {
        let encoded: Vec<[u8; 4]> = frame
            .pixels()
            .iter()
            .map(|p| codec.encode(*p, frame.brightness()))
            .collect();
        let count = (0..=frame.len())
            .find(|&n| framed_len(n) == buffer.len())
            .expect("buffer is a framed pixel run");
        assert_eq!(&buffer[..START_FRAME.len()], &START_FRAME[..]);
        assert!(buffer[framed_len(count) - end_frame_len(count)..].iter().all(|&b| b == 0xFF));
        buffer[START_FRAME.len()..START_FRAME.len() + 4 * count]
            .chunks_exact(4)
            .map(|group| {
                encoded
                    .iter()
                    .position(|e| e[..] == *group)
                    .expect("group matches a logical pixel")
            })
            .collect()
    }

    #[test]
    fn forward_then_reversed_segment_scenario() {
        let cfg = config(&[(10, Direction::Forward), (5, Direction::Reversed)]);
        let layout = SegmentLayout::new(&cfg);
        let codec = PixelCodec::new(cfg.mapping());
        let frame = indexed_frame(15);

        let buffers = layout.split(&frame, &codec);

        assert_eq!(buffers.len(), 2);
        assert_eq!(buffers[0].len(), framed_len(10));
        assert_eq!(buffers[1].len(), framed_len(5));
        assert_eq!(
            wire_indices(&buffers[0], &frame, &codec),
            (0..10).collect::<Vec<_>>()
        );
        assert_eq!(wire_indices(&buffers[1], &frame, &codec), vec![14, 13, 12, 11, 10]);
    }

    #[test]
    fn split_buffers_are_framed_encoded_pixels() {
        let cfg = config(&[(10, Direction::Forward), (5, Direction::Reversed)]);
        let layout = SegmentLayout::new(&cfg);
        let codec = PixelCodec::new(cfg.mapping());
        let frame = indexed_frame(15);

        let buffers = layout.split(&frame, &codec);

        let expected: Vec<u8> = wrap([14, 13, 12, 11, 10].map(|i| codec.encode(frame.pixels()[i], 1.0)));
        assert_eq!(buffers[1], expected);
    }

    #[test]
    fn logical_slices_concatenate_to_the_original_frame() {
        let cfg = config(&[
            (3, Direction::Reversed),
            (4, Direction::Forward),
            (2, Direction::Reversed),
        ]);
        let layout = SegmentLayout::new(&cfg);
        let codec = PixelCodec::new(cfg.mapping());
        let frame = indexed_frame(9);

        let mut rebuilt = Vec::new();
        for (buffer, span) in layout.split(&frame, &codec).iter().zip(&layout.spans) {
            let mut indices = wire_indices(buffer, &frame, &codec);
            if span.direction == Direction::Reversed {
                indices.reverse();
            }
            rebuilt.extend(indices);
        }
        assert_eq!(rebuilt, (0..9).collect::<Vec<_>>());
    }

    #[test]
    fn mis_sized_frame_writes_nothing() {
        let cfg = config(&[(3, Direction::Forward), (2, Direction::Forward)]);
        let a = RecordingTransport::new();
        let b = RecordingTransport::new();
        let mut topology = SegmentTopology::new(&cfg, vec![a.clone(), b.clone()]).unwrap();

        let err = topology.write_frame(&LogicalFrame::black(3)).unwrap_err();

        assert!(matches!(
            err,
            LightbarError::FrameSizeMismatch {
                expected: 5,
                actual: 3
            }
        ));
        assert!(a.sent().is_empty());
        assert!(b.sent().is_empty());
    }

    #[test]
    fn single_segment_is_just_one_buffer() {
        let layout = SegmentLayout::new(&config(&[(144, Direction::Forward)]));
        let buffers = layout.split(&LogicalFrame::black(144), &PixelCodec::default());
        assert_eq!(buffers.len(), 1);
        assert_eq!(buffers[0].len(), 4 + 144 * 4 + 9);
    }

    #[test]
    fn write_frame_sends_one_buffer_per_transport() {
        let cfg = config(&[(2, Direction::Forward), (2, Direction::Reversed)]);
        let a = RecordingTransport::new();
        let b = RecordingTransport::new();
        let mut topology = SegmentTopology::new(&cfg, vec![a.clone(), b.clone()]).unwrap();

        topology.write_frame(&LogicalFrame::black(4)).unwrap();

        assert_eq!(a.sent().len(), 1);
        assert_eq!(b.sent().len(), 1);
        assert_eq!(a.sent()[0], vec![0, 0, 0, 0, 0xE0 | 31, 0, 0, 0, 0xFF, 0, 0, 0, 0xFF]);
    }

    #[test]
    fn transport_count_must_match_segments() {
        let cfg = config(&[(2, Direction::Forward), (2, Direction::Forward)]);
        let result = SegmentTopology::new(&cfg, vec![RecordingTransport::new()]);
        assert!(matches!(result, Err(LightbarError::Configuration(_))));
    }

    #[test]
    fn failed_write_names_the_segment() {
        let cfg = config(&[(1, Direction::Forward), (1, Direction::Forward)]);
        let transports = vec![
            FailingTransport { ok_writes: 1 },
            FailingTransport { ok_writes: 0 },
        ];
        let mut topology = SegmentTopology::new(&cfg, transports).unwrap();

        let err = topology.write_frame(&LogicalFrame::black(2)).unwrap_err();
        assert!(matches!(err, LightbarError::TransportWrite { segment: 1, .. }));
    }

    #[test]
    fn open_reports_unopenable_devices() {
        let cfg = config(&[(1, Direction::Forward)]);
        let result = SegmentTopology::<RecordingTransport>::open(&cfg, |_| {
            Err(io::Error::new(io::ErrorKind::NotFound, "no such device"))
        });
        assert!(matches!(result, Err(LightbarError::Configuration(_))));
    }
}
