//! On-disk image store and the active-image artifacts.
//!
//! Layout under the data directory:
//! - `images/<name>/original.png`, `thumbnail.png`, `stats.json`
//! - `active.png` (encoded preview), `active-raw.png` (resized image),
//!   `active-stats.json`

use crate::error::{LightbarError, Result};
use crate::lightbar::Prepared;
use crate::sequencer::{ResamplingMode, flatten_on_black};
use image::{DynamicImage, ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const ALLOWED_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "bmp", "tiff", "gif", "webp"];

/// URL prefix the data directory is served under, whatever its name on disk.
pub const DATA_URL_PREFIX: &str = "data";

/// Stems that would collide with the store's own files and routes.
const RESERVED_STEMS: [&str; 5] = ["data", "images", "active", "upload-image", "lightbar-settings"];

/// Pixel dimensions of a stored image.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

/// One stored rendition and where to fetch it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ImageStat {
    pub size: ImageSize,
    /// Server path, e.g. `data/images/sunset/original.png`
    pub url: String,
}

/// `stats.json` of an uploaded image.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ImageStats {
    pub original: ImageStat,
    pub thumbnail: ImageStat,
}

/// `active-stats.json`: what is currently prepared for display.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActiveStats {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub brightness: f32,
    /// Source image name
    pub name: String,
    pub resampling: ResamplingMode,
}

/// Check a client-supplied file name: one known image extension and a stem
/// that doesn't collide with reserved names.
pub fn allowed_image(file_name: &str) -> bool {
    let path = Path::new(file_name);
    let (Some(stem), Some(ext)) = (
        path.file_stem().and_then(|s| s.to_str()),
        path.extension().and_then(|e| e.to_str()),
    ) else {
        return false;
    };
    // A single suffix only: "a.tar.png" has stem "a.tar".
    !stem.contains('.')
        && !RESERVED_STEMS.contains(&stem)
        && ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
}

/// Reduce `stem` to a safe directory name.
fn sanitize_stem(stem: &str) -> Option<String> {
    let cleaned: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_matches('_').to_string();
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Server path of a file under the data directory.
fn data_url(relative: &str) -> String {
    format!("{DATA_URL_PREFIX}/{relative}")
}

/// Centered square crop, used as the thumbnail.
pub fn crop_square(image: &RgbImage) -> RgbImage {
    let (width, height) = image.dimensions();
    let side = width.min(height);
    let x = (width - side) / 2;
    let y = (height - side) / 2;
    image::imageops::crop_imm(image, x, y, side, side).to_image()
}

/// Images and active artifacts rooted at one data directory.
#[derive(Clone, Debug)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    /// Open (creating if needed) the store at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("images"))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn image_dir(&self, name: &str) -> PathBuf {
        self.root.join("images").join(name)
    }

    /// Store an uploaded image under its file stem.
    ///
    /// Transparency is flattened onto black and a centered square crop is
    /// saved as the thumbnail. Re-uploading a name replaces it.
    pub fn save_upload(&self, file_name: &str, bytes: &[u8]) -> Result<(String, ImageStats)> {
        let stem = Path::new(file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|_| allowed_image(file_name))
            .and_then(sanitize_stem)
            .ok_or_else(|| LightbarError::UnsupportedUpload(file_name.to_string()))?;

        let decoded = image::load_from_memory(bytes)?;
        let original = flatten_on_black(&decoded);
        let thumbnail = crop_square(&original);

        let dir = self.image_dir(&stem);
        fs::create_dir_all(&dir)?;
        original.save_with_format(dir.join("original.png"), ImageFormat::Png)?;
        thumbnail.save_with_format(dir.join("thumbnail.png"), ImageFormat::Png)?;

        let stats = ImageStats {
            original: ImageStat {
                size: ImageSize {
                    width: original.width(),
                    height: original.height(),
                },
                url: data_url(&format!("images/{stem}/original.png")),
            },
            thumbnail: ImageStat {
                size: ImageSize {
                    width: thumbnail.width(),
                    height: thumbnail.height(),
                },
                url: data_url(&format!("images/{stem}/thumbnail.png")),
            },
        };
        fs::write(dir.join("stats.json"), serde_json::to_string_pretty(&stats)?)?;

        tracing::info!("Stored image {} ({}x{})", stem, original.width(), original.height());
        Ok((stem, stats))
    }

    /// Stats of every stored image, keyed by name.
    ///
    /// Directories without readable stats are skipped.
    pub fn list_images(&self) -> BTreeMap<String, ImageStats> {
        let mut entries = BTreeMap::new();

        let read_dir = match fs::read_dir(self.root.join("images")) {
            Ok(rd) => rd,
            Err(_) => return entries,
        };

        for entry in read_dir.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let stats = fs::read_to_string(path.join("stats.json"))
                .ok()
                .and_then(|text| serde_json::from_str::<ImageStats>(&text).ok());
            match stats {
                Some(stats) => {
                    entries.insert(name, stats);
                }
                None => tracing::warn!("Skipping {}: missing or invalid stats.json", path.display()),
            }
        }

        entries
    }

    /// Decode a stored original.
    pub fn load_original(&self, name: &str) -> Result<DynamicImage> {
        let path = sanitize_stem(name)
            .filter(|clean| clean == name)
            .map(|clean| self.image_dir(&clean).join("original.png"))
            .filter(|path| path.is_file())
            .ok_or_else(|| LightbarError::ImageNotFound(name.to_string()))?;
        Ok(image::open(path)?)
    }

    /// Persist a prepared image as the active one.
    pub fn save_active(&self, prepared: &Prepared, stats: &ActiveStats) -> Result<()> {
        prepared
            .preview
            .save_with_format(self.root.join("active.png"), ImageFormat::Png)?;
        prepared
            .resized
            .save_with_format(self.root.join("active-raw.png"), ImageFormat::Png)?;
        fs::write(
            self.root.join("active-stats.json"),
            serde_json::to_string_pretty(stats)?,
        )?;
        Ok(())
    }

    /// Stats of the active image, if one has been prepared.
    pub fn active_stats(&self) -> Result<Option<ActiveStats>> {
        let path = self.root.join("active-stats.json");
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&fs::read_to_string(path)?)?))
    }

    /// The active resized image with its stats.
    pub fn load_active(&self) -> Result<Option<(RgbImage, ActiveStats)>> {
        let Some(stats) = self.active_stats()? else {
            return Ok(None);
        };
        let image = image::open(self.root.join("active-raw.png"))?.to_rgb8();
        Ok(Some((image, stats)))
    }
}
