//! Faces command implementation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use cardsnake_core::CardId;
use colored::Colorize;
use tracing::{info, warn};

use crate::utils;

/// Read a `{"<card id>": <face count>, ...}` file.
fn load_counts(path: &Path) -> Result<BTreeMap<CardId, u32>> {
    if !path.exists() {
        bail!("Failed to read face counts file: {}", path.display());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read face counts file: {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse face counts file: {}", path.display()))
}

/// Execute the faces command.
///
/// Imports face counts into the catalog. Counts already present are kept
/// unless `force` is set; ids the catalog does not know are skipped.
pub fn execute(catalog_path: PathBuf, counts_path: PathBuf, force: bool) -> Result<()> {
    let mut catalog = utils::load_catalog(&catalog_path)?;
    let counts = load_counts(&counts_path)?;

    let mut updated = 0usize;
    let mut unknown = Vec::new();
    for (id, faces) in &counts {
        if !catalog.contains(id) {
            warn!(%id, "Face count for unknown card");
            unknown.push(id.clone());
            continue;
        }
        if catalog.set_faces(id, *faces, force) {
            updated += 1;
        }
    }

    let missing = catalog.missing_faces();
    info!(updated, unknown = unknown.len(), missing = missing.len(), "Imported face counts");
    utils::save_catalog(&catalog, &catalog_path)?;

    println!(
        "{} {} ({} updated, {} unknown)",
        "Face counts imported:".green().bold(),
        catalog_path.display(),
        updated,
        unknown.len()
    );
    if !missing.is_empty() {
        println!("   {} {}", "Still missing:".yellow(), missing.len());
        for id in &missing {
            println!("   {}", id.as_str().dimmed());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_counts() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("faces.json");
        std::fs::write(&path, r#"{"delver": 1, "shock": 0}"#).unwrap();

        let counts = load_counts(&path).unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[&CardId::from("delver")], 1);
    }

    #[test]
    fn test_load_counts_rejects_bad_values() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("faces.json");
        std::fs::write(&path, r#"{"delver": -1}"#).unwrap();
        assert!(load_counts(&path).is_err());
        assert!(load_counts(&temp.path().join("missing.json")).is_err());
    }
}
