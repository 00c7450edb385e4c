//! Error taxonomy shared by every layer of the lightbar.

use crate::playback::PlaybackReport;
use std::io;
use thiserror::Error;

/// Everything that can go wrong between a settings file and the wire.
#[derive(Debug, Error)]
pub enum LightbarError {
    /// Segment counts don't add up, or the channel mapping is not a permutation.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid resampling mode `{0}`")]
    InvalidResamplingMode(String),

    /// A serial write failed. Never retried.
    #[error("write to segment {segment} failed: {source}")]
    TransportWrite {
        segment: usize,
        #[source]
        source: io::Error,
    },

    /// Playback stopped on an error; the report covers the work done up to it.
    #[error("playback aborted after {} frames: {source}", .report.frames_written)]
    PlaybackAborted {
        report: PlaybackReport,
        source: Box<LightbarError>,
    },

    #[error("frame has {actual} pixels, strip has {expected}")]
    FrameSizeMismatch { expected: usize, actual: usize },

    #[error("image has no pixels")]
    EmptyImage,

    #[error("file not supported: {0}")]
    UnsupportedUpload(String),

    #[error("image not found: {0}")]
    ImageNotFound(String),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LightbarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_write_keeps_io_source() {
        let err = LightbarError::TransportWrite {
            segment: 1,
            source: io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"),
        };
        assert_eq!(err.to_string(), "write to segment 1 failed: unplugged");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn aborted_playback_reports_progress() {
        let report = PlaybackReport {
            frame_count: 10,
            passes: 2,
            frames_written: 3,
            ..PlaybackReport::default()
        };
        let err = LightbarError::PlaybackAborted {
            report,
            source: Box::new(LightbarError::EmptyImage),
        };
        assert_eq!(
            err.to_string(),
            "playback aborted after 3 frames: image has no pixels"
        );
    }
}
