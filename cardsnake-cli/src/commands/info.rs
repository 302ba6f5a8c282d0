//! Info command implementation.

use std::path::PathBuf;

use anyhow::Result;
use cardsnake_core::Catalog;
use colored::Colorize;
use serde::Serialize;

use crate::utils;
use crate::OutputFormat;

#[derive(Debug, Serialize, PartialEq, Eq)]
struct CatalogSummary {
    version: u32,
    entries: usize,
    fingerprints: usize,
    descriptors: usize,
    descriptor_total: usize,
    faces: usize,
    user_pictures: usize,
}

fn summarize(catalog: &Catalog) -> CatalogSummary {
    let entries: Vec<_> = catalog.entries().collect();
    CatalogSummary {
        version: catalog.version,
        entries: entries.len(),
        fingerprints: entries.iter().filter(|e| e.fingerprints.is_some()).count(),
        descriptors: entries.iter().filter(|e| e.descriptors.is_some()).count(),
        descriptor_total: entries
            .iter()
            .filter_map(|e| e.descriptors.as_ref())
            .map(Vec::len)
            .sum(),
        faces: entries.iter().filter(|e| e.faces.is_some_and(|n| n > 0)).count(),
        user_pictures: entries
            .iter()
            .filter(|e| e.code.as_deref() == Some("USER"))
            .count(),
    }
}

/// Execute the info command.
pub fn execute(catalog_path: PathBuf, format: OutputFormat) -> Result<()> {
    let catalog = utils::load_catalog(&catalog_path)?;
    let summary = summarize(&catalog);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Text => {
            println!("{} {}", "Catalog:".bold(), catalog_path.display());
            println!("   {} {}", "Version:".dimmed(), summary.version);
            println!("   {} {}", "Entries:".dimmed(), summary.entries);
            println!("   {} {}", "With fingerprints:".dimmed(), summary.fingerprints);
            println!(
                "   {} {} ({} descriptors)",
                "With descriptors:".dimmed(),
                summary.descriptors,
                summary.descriptor_total
            );
            println!("   {} {}", "With faces:".dimmed(), summary.faces);
            println!("   {} {}", "User pictures:".dimmed(), summary.user_pictures);
        }
    }
    Ok(())
}
