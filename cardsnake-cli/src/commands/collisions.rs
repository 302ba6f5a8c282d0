//! Collisions command implementation.

use std::path::PathBuf;

use anyhow::Result;
use cardsnake_core::{CardId, FaceFilter, FingerprintStore};
use colored::Colorize;
use serde::Serialize;

use crate::utils;
use crate::OutputFormat;

#[derive(Serialize)]
struct Collision {
    fingerprint: String,
    ids: Vec<CardId>,
}

/// Execute the collisions command.
pub fn execute(catalog_path: PathBuf, format: OutputFormat) -> Result<()> {
    let catalog = utils::load_catalog(&catalog_path)?;
    let store = FingerprintStore::load(catalog.entries(), FaceFilter::Any)?;

    let collisions: Vec<Collision> = store
        .collisions()
        .into_iter()
        .map(|(fingerprint, ids)| Collision {
            fingerprint: fingerprint.to_hex(),
            ids,
        })
        .collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&collisions)?),
        OutputFormat::Text if collisions.is_empty() => {
            println!("{}", "No duplicate fingerprints".green());
        }
        OutputFormat::Text => {
            println!(
                "{} {}",
                "Duplicate fingerprints:".yellow().bold(),
                collisions.len()
            );
            for collision in &collisions {
                let ids: Vec<&str> = collision.ids.iter().map(CardId::as_str).collect();
                println!("   {} {}", collision.fingerprint.dimmed(), ids.join(", "));
            }
        }
    }
    Ok(())
}
