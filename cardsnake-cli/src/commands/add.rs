//! Add command implementation.

use std::path::PathBuf;

use anyhow::Result;
use cardsnake_core::{DescriptorExtractor, EngineConfig, FingerprintExtractor};
use colored::Colorize;
use tracing::info;

use crate::utils;

/// Execute the add command.
pub fn execute(
    image_path: PathBuf,
    catalog_path: PathBuf,
    code: String,
    name: Option<String>,
    config: &EngineConfig,
) -> Result<()> {
    let image = utils::load_image(&image_path)?;
    let mut catalog = utils::load_or_new_catalog(&catalog_path)?;

    let (hasher, describer) = utils::extractors(config);
    let fingerprints = hasher.fingerprint_pair(&image)?;
    let descriptors = describer.descriptors(&image)?;

    let name = name.unwrap_or_else(|| utils::file_stem(&image_path));
    let id = catalog.add_user_picture(&code, &name, Some(fingerprints), Some(descriptors));
    if let Some(entry) = catalog.get(&id) {
        info!(%id, variations = entry.variations.len(), "Added user picture");
    }

    utils::save_catalog(&catalog, &catalog_path)?;

    println!("{} {}", "Added:".green().bold(), id);
    if let Some(entry) = catalog.get(&id) {
        if let Some(stored_name) = &entry.name {
            println!("   {} {}", "Name:".dimmed(), stored_name);
        }
        if !entry.variations.is_empty() {
            println!("   {} {}", "Variation of:".dimmed(), entry.variations.len());
        }
    }
    Ok(())
}
