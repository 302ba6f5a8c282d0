//! Build command implementation.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::Result;
use cardsnake_core::{CardId, CatalogEntry, DescriptorExtractor, EngineConfig, FingerprintExtractor};
use colored::Colorize;
use tracing::{debug, info, warn};

use crate::utils;

/// Execute the build command.
///
/// Entries with fingerprints and descriptors are kept unless `force` is
/// set, so re-running after adding pictures only processes the new ones.
pub fn execute(dir: PathBuf, output: PathBuf, force: bool, config: &EngineConfig) -> Result<()> {
    let images = utils::collect_images(&dir)?;
    info!(dir = %dir.display(), images = images.len(), "Found reference images");

    let mut catalog = utils::load_or_new_catalog(&output)?;
    let (hasher, describer) = utils::extractors(config);
    let pending: BTreeSet<CardId> = catalog
        .missing_fingerprints()
        .into_iter()
        .chain(catalog.missing_descriptors())
        .collect();

    let mut processed = 0usize;
    let mut kept = 0usize;
    let mut failed = 0usize;

    for path in &images {
        let id = CardId::new(utils::file_stem(path));
        if !force && catalog.contains(&id) && !pending.contains(&id) {
            debug!(%id, "Entry already complete");
            kept += 1;
            continue;
        }

        let image = match utils::load_image(path) {
            Ok(image) => image,
            Err(e) => {
                warn!(path = %path.display(), error = %format!("{e:#}"), "Skipping unreadable image");
                failed += 1;
                continue;
            }
        };

        if !catalog.contains(&id) {
            let mut entry = CatalogEntry::new(id.clone())
                .with_name(utils::parent_name(path), utils::file_stem(path));
            entry.picture = path
                .strip_prefix(&dir)
                .ok()
                .map(|relative| relative.display().to_string());
            catalog.insert(entry);
        }

        let fingerprints = hasher.fingerprint_pair(&image)?;
        let descriptors = describer.descriptors(&image)?;
        debug!(%id, primary = %fingerprints.primary, descriptors = descriptors.len(), "Processed image");

        catalog.set_fingerprints(&id, fingerprints, force);
        catalog.set_descriptors(&id, descriptors, force);
        processed += 1;
    }

    utils::save_catalog(&catalog, &output)?;

    println!(
        "{} {} ({} processed, {} kept, {} failed)",
        "Catalog written:".green().bold(),
        output.display(),
        processed,
        kept,
        failed
    );
    println!("   {} {}", "Entries:".dimmed(), catalog.len());
    Ok(())
}
