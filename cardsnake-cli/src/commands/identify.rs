//! Identify command implementation.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use cardsnake_core::{Confidence, EngineConfig, FaceFilter, Identification, Identifier};
use colored::Colorize;
use tracing::info;

use crate::utils;
use crate::OutputFormat;

/// Arguments of the identify command.
pub struct IdentifyArgs {
    pub image: PathBuf,
    pub catalog: PathBuf,
    pub min_matches: Option<usize>,
    pub faces: Option<u32>,
    pub format: OutputFormat,
    pub strict: bool,
}

/// Execute the identify command.
pub fn execute(args: IdentifyArgs, config: EngineConfig) -> Result<()> {
    let image = utils::load_image(&args.image)?;
    let catalog = utils::load_catalog(&args.catalog)?;
    let min_matches = args.min_matches.unwrap_or(config.verify.min_matches);
    let filter = args.faces.map_or(FaceFilter::Any, FaceFilter::AtLeast);

    let mut engine = Identifier::from_catalog(catalog, filter, config)
        .context("Failed to prepare the identification engine")?;
    let result = engine
        .identify(&image, min_matches)
        .with_context(|| format!("Identification failed for {}", args.image.display()))?;

    info!(
        matches = result.matches.len(),
        candidates = result.candidates.len(),
        confidence = ?result.confidence,
        "Identified"
    );

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print_text(&result),
    }

    if args.strict {
        if result.is_empty() {
            bail!("No match above {} verified descriptors", min_matches);
        }
        if result.confidence == Confidence::Low {
            bail!("Low confidence candidate search");
        }
    }
    Ok(())
}

fn print_text(result: &Identification) {
    println!();
    match result.best() {
        Some(best) => {
            println!("{} {}", "MATCH".green().bold(), best.id.to_string().bold());
            println!("   {} {}", "Verified matches:".dimmed(), best.matches);
        }
        None => println!("{}", "No match".yellow().bold()),
    }

    println!(
        "   {} {} (radius {}, {} flip(s))",
        "Orientation:".dimmed(),
        result.orientation,
        result.radius,
        result.flips
    );
    println!("   {} {}", "Candidates:".dimmed(), result.candidates.len());
    if result.confidence == Confidence::Low {
        println!("   {} {}", "Confidence:".dimmed(), "low".yellow());
    }

    for runner_up in result.matches.iter().skip(1) {
        println!("   {} {} ({})", "Also:".dimmed(), runner_up.id, runner_up.matches);
    }
}
