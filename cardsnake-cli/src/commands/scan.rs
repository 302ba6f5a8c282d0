//! Scan command implementation.

use std::ops::Range;
use std::path::PathBuf;

use anyhow::{bail, Result};
use cardsnake_core::{AdaptiveRadiusSearch, EngineConfig, FaceFilter, FingerprintExtractor, FingerprintStore};
use colored::Colorize;

use crate::utils;

/// Execute the scan command: candidate counts per radius against the
/// primary and mirrored columns.
pub fn execute(image_path: PathBuf, catalog_path: PathBuf, radii: Range<u32>, config: &EngineConfig) -> Result<()> {
    if radii.is_empty() {
        bail!("Empty radius range {}..{}", radii.start, radii.end);
    }

    let image = utils::load_image(&image_path)?;
    let catalog = utils::load_catalog(&catalog_path)?;
    let store = FingerprintStore::load(catalog.entries(), FaceFilter::Any)?;

    let (hasher, _) = utils::extractors(config);
    let query = hasher.fingerprint_pair(&image)?;
    let scan = AdaptiveRadiusSearch::dual_orientation_scan(&store, query.primary, radii);

    println!("{} {}", "Fingerprint:".dimmed(), query.primary);
    println!("{:>6}  {:>8}  {:>8}", "radius", "upright", "flipped");
    for (radius, (upright, flipped)) in scan {
        let row = format!("{radius:>6}  {upright:>8}  {flipped:>8}");
        if upright > flipped {
            println!("{}", row.green());
        } else if flipped > upright {
            println!("{}", row.yellow());
        } else {
            println!("{row}");
        }
    }
    Ok(())
}
