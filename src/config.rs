//! Lightbar settings: the JSON file on disk and its validated form.
//!
//! The settings file is read once per process. [`LightbarSettings`] mirrors
//! the file as written; [`LightbarSettings::validate`] turns it into an
//! immutable [`LightbarConfig`] that the topology, render thread and server
//! receive explicitly.

use crate::error::{LightbarError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// ── Direction ───────────────────────────────────────────────────────

/// Wiring direction of a segment relative to the logical pixel index.
///
/// Stored as an integer in the settings file: `0` forward, `1` reversed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Direction {
    #[default]
    Forward,
    /// Physically wired tail-to-head.
    Reversed,
}

impl TryFrom<i64> for Direction {
    type Error = String;

    fn try_from(value: i64) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Direction::Forward),
            1 => Ok(Direction::Reversed),
            other => Err(format!("direction must be 0 or 1, got {other}")),
        }
    }
}

impl From<Direction> for i64 {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Forward => 0,
            Direction::Reversed => 1,
        }
    }
}

// ── Channel mapping ─────────────────────────────────────────────────

/// Byte position (0..=2) of each color channel inside an encoded pixel.
///
/// Strips from different batches disagree on channel order (BGR is common),
/// so the order is part of the site configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelMapping {
    red: usize,
    green: usize,
    blue: usize,
}

impl ChannelMapping {
    /// Build a mapping, rejecting anything that isn't a permutation of 0..=2.
    pub fn new(red: usize, green: usize, blue: usize) -> Result<Self> {
        let mut seen = [false; 3];
        for index in [red, green, blue] {
            match seen.get_mut(index) {
                Some(slot) if !*slot => *slot = true,
                _ => {
                    return Err(LightbarError::Configuration(format!(
                        "channel indices must be a permutation of 0, 1, 2 (got red={red}, green={green}, blue={blue})"
                    )));
                }
            }
        }
        Ok(Self { red, green, blue })
    }

    /// Plain RGB order.
    pub fn rgb() -> Self {
        Self { red: 0, green: 1, blue: 2 }
    }

    /// Place `[r, g, b]` at their configured byte positions.
    pub fn arrange(&self, [r, g, b]: [u8; 3]) -> [u8; 3] {
        let mut out = [0u8; 3];
        out[self.red] = r;
        out[self.green] = g;
        out[self.blue] = b;
        out
    }
}

impl Default for ChannelMapping {
    fn default() -> Self {
        Self::rgb()
    }
}

// ── Settings file ───────────────────────────────────────────────────

/// One physical device entry as written in the settings file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSettings {
    /// Transport address, e.g. `/dev/spidev0.0`
    #[serde(alias = "transportAddress")]
    pub address: String,
    /// Pixels on this segment; falls back to `numPixelsEach` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_count: Option<usize>,
    /// 0 = forward, 1 = reversed
    #[serde(default)]
    #[schema(value_type = i64)]
    pub direction: Direction,
}

/// The settings file, as stored on disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LightbarSettings {
    /// Logical strip length across all segments
    pub num_pixels: usize,
    /// Legacy uniform segment length
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_pixels_each: Option<usize>,
    pub devices: Vec<DeviceSettings>,
    /// Transport clock rate in Hz
    pub speed: u32,
    pub red_index: usize,
    pub green_index: usize,
    pub blue_index: usize,
}

impl LightbarSettings {
    /// Read and parse a settings file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Check every invariant and produce the immutable session configuration.
    pub fn validate(&self) -> Result<LightbarConfig> {
        if self.devices.is_empty() {
            return Err(LightbarError::Configuration(
                "at least one device is required".to_string(),
            ));
        }

        let mut segments = Vec::with_capacity(self.devices.len());
        for (i, device) in self.devices.iter().enumerate() {
            let pixel_count = device
                .pixel_count
                .or(self.num_pixels_each)
                .ok_or_else(|| {
                    LightbarError::Configuration(format!(
                        "device {i} ({}) has no pixelCount and numPixelsEach is not set",
                        device.address
                    ))
                })?;
            segments.push(SegmentConfig {
                address: device.address.clone(),
                pixel_count,
                direction: device.direction,
            });
        }

        let mapping = ChannelMapping::new(self.red_index, self.green_index, self.blue_index)?;
        LightbarConfig::new(self.num_pixels, segments, self.speed, mapping)
    }
}

// ── Validated configuration ─────────────────────────────────────────

/// One segment of the validated configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentConfig {
    pub address: String,
    pub pixel_count: usize,
    pub direction: Direction,
}

/// Validated, immutable configuration for one lightbar session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LightbarConfig {
    total_pixels: usize,
    segments: Vec<SegmentConfig>,
    speed_hz: u32,
    mapping: ChannelMapping,
}

impl LightbarConfig {
    pub fn new(
        total_pixels: usize,
        segments: Vec<SegmentConfig>,
        speed_hz: u32,
        mapping: ChannelMapping,
    ) -> Result<Self> {
        if let Some(empty) = segments.iter().position(|s| s.pixel_count == 0) {
            return Err(LightbarError::Configuration(format!(
                "segment {empty} has no pixels"
            )));
        }
        let sum: usize = segments.iter().map(|s| s.pixel_count).sum();
        if sum != total_pixels {
            return Err(LightbarError::Configuration(format!(
                "segment pixel counts sum to {sum}, but the strip has {total_pixels} pixels"
            )));
        }
        Ok(Self {
            total_pixels,
            segments,
            speed_hz,
            mapping,
        })
    }

    /// Logical strip length used by every layer above the topology.
    pub fn total_pixels(&self) -> usize {
        self.total_pixels
    }

    pub fn segments(&self) -> &[SegmentConfig] {
        &self.segments
    }

    pub fn speed_hz(&self) -> u32 {
        self.speed_hz
    }

    pub fn mapping(&self) -> ChannelMapping {
        self.mapping
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn settings_json(devices: &str) -> String {
        format!(
            r#"{{
                "numPixels": 15,
                "devices": {devices},
                "speed": 8000000,
                "redIndex": 2, "greenIndex": 1, "blueIndex": 0
            }}"#
        )
    }

    #[test]
    fn parses_and_validates_segmented_settings() {
        let json = settings_json(
            r#"[{"address": "/dev/spidev0.0", "pixelCount": 10, "direction": 0},
                {"transportAddress": "/dev/spidev1.0", "pixelCount": 5, "direction": 1}]"#,
        );
        let settings: LightbarSettings = serde_json::from_str(&json).unwrap();
        let config = settings.validate().unwrap();

        assert_eq!(config.total_pixels(), 15);
        assert_eq!(config.speed_hz(), 8_000_000);
        assert_eq!(
            config.segments()[1],
            SegmentConfig {
                address: "/dev/spidev1.0".to_string(),
                pixel_count: 5,
                direction: Direction::Reversed,
            }
        );
        assert_eq!(config.mapping().arrange([1, 2, 3]), [3, 2, 1]);
    }

    #[test]
    fn legacy_uniform_segment_length_fills_missing_counts() {
        let json = r#"{
            "numPixels": 144, "numPixelsEach": 72,
            "devices": [{"address": "/dev/spidev0.0"}, {"address": "/dev/spidev1.0"}],
            "speed": 500000, "redIndex": 0, "greenIndex": 1, "blueIndex": 2
        }"#;
        let settings: LightbarSettings = serde_json::from_str(json).unwrap();
        let config = settings.validate().unwrap();
        let counts: Vec<usize> = config.segments().iter().map(|s| s.pixel_count).collect();
        assert_eq!(counts, vec![72, 72]);
    }

    #[test]
    fn unknown_direction_is_rejected_at_parse_time() {
        let json = settings_json(r#"[{"address": "a", "pixelCount": 15, "direction": 2}]"#);
        assert!(serde_json::from_str::<LightbarSettings>(&json).is_err());
    }

    #[rstest]
    #[case::sum_too_small(r#"[{"address": "a", "pixelCount": 10}]"#)]
    #[case::sum_too_large(r#"[{"address": "a", "pixelCount": 10}, {"address": "b", "pixelCount": 6}]"#)]
    #[case::empty_segment(r#"[{"address": "a", "pixelCount": 15}, {"address": "b", "pixelCount": 0}]"#)]
    #[case::missing_count(r#"[{"address": "a"}]"#)]
    #[case::no_devices("[]")]
    fn invalid_topologies_fail_validation(#[case] devices: &str) {
        let settings: LightbarSettings = serde_json::from_str(&settings_json(devices)).unwrap();
        assert!(matches!(
            settings.validate(),
            Err(LightbarError::Configuration(_))
        ));
    }

    #[rstest]
    #[case(0, 1, 2, true)]
    #[case(2, 0, 1, true)]
    #[case(0, 0, 2, false)]
    #[case(0, 1, 3, false)]
    fn channel_mapping_must_be_a_permutation(
        #[case] r: usize,
        #[case] g: usize,
        #[case] b: usize,
        #[case] valid: bool,
    ) {
        assert_eq!(ChannelMapping::new(r, g, b).is_ok(), valid);
    }

    #[test]
    fn settings_round_trip_keeps_direction_as_integer() {
        let json = settings_json(r#"[{"address": "a", "pixelCount": 15, "direction": 1}]"#);
        let settings: LightbarSettings = serde_json::from_str(&json).unwrap();
        let value = serde_json::to_value(&settings).unwrap();
        assert_eq!(value["devices"][0]["direction"], 1);
    }

    #[test]
    fn load_reads_settings_from_disk() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("lightbar_settings.json");
        std::fs::write(
            &path,
            settings_json(r#"[{"address": "a", "pixelCount": 15}]"#),
        )
        .unwrap();
        let settings = LightbarSettings::load(&path).unwrap();
        assert_eq!(settings.num_pixels, 15);
    }
}
