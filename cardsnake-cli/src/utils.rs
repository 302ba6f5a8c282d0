//! Common utility functions shared across CLI commands.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use cardsnake_core::{BriefExtractor, Catalog, EngineConfig, PerceptualHasher};
use image::DynamicImage;
use tracing::debug;
use walkdir::WalkDir;

/// Image extensions picked up when walking a directory.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Load the engine configuration: `--config` file when given, otherwise
/// `CARDSNAKE_*` environment variables over defaults.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => {
            if !path.exists() {
                bail!("Failed to read config file: {}", path.display());
            }
            debug!(path = %path.display(), "Loading configuration file");
            EngineConfig::from_json_file(path)
                .with_context(|| format!("Invalid configuration file: {}", path.display()))?
        }
        None => EngineConfig::from_env(),
    };
    config.validate().context("Invalid engine configuration")?;
    Ok(config)
}

/// Load a catalog snapshot, trying CBOR first then JSON.
pub fn load_catalog(path: &Path) -> Result<Catalog> {
    if !path.exists() {
        bail!("Failed to read catalog file: {}", path.display());
    }
    let catalog = Catalog::load(path)
        .with_context(|| format!("Failed to parse catalog file: {}", path.display()))?;
    debug!(path = %path.display(), entries = catalog.len(), "Loaded catalog");
    Ok(catalog)
}

/// Load a catalog, or start an empty one when the file does not exist yet.
pub fn load_or_new_catalog(path: &Path) -> Result<Catalog> {
    if path.exists() {
        load_catalog(path)
    } else {
        debug!(path = %path.display(), "Starting a new catalog");
        Ok(Catalog::new())
    }
}

/// Write a catalog snapshot.
pub fn save_catalog(catalog: &Catalog, path: &Path) -> Result<()> {
    catalog
        .save(path)
        .with_context(|| format!("Failed to write catalog file: {}", path.display()))
}

/// Read and decode an image file.
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read image: {}", path.display()))?;
    image::load_from_memory(&bytes)
        .with_context(|| format!("Failed to decode image: {}", path.display()))
}

/// Whether a path looks like a supported image by its extension.
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// All image files under `dir`, recursively, in sorted order.
pub fn collect_images(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("Failed to read image directory: {}", dir.display());
    }

    let mut images: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_image_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    images.sort();
    Ok(images)
}

/// File stem as a string, or an empty string.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Name of the directory containing `path`, used as the set code.
pub fn parent_name(path: &Path) -> String {
    path.parent()
        .and_then(|p| p.file_name())
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Reference extractors matching the engine configuration.
pub fn extractors(config: &EngineConfig) -> (PerceptualHasher, BriefExtractor) {
    (
        PerceptualHasher::new(config.algorithm).with_art_ratio(config.art_ratio),
        BriefExtractor::default(),
    )
}
