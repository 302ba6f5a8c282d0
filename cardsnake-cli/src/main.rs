//! CardSnake CLI - trading card identification tool.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod exit_codes;
mod utils;

use exit_codes::ExitCode;

#[derive(Parser)]
#[command(name = "cardsnake")]
#[command(author, version, about = "Two-tier trading card identification", long_about = None)]
#[command(after_help = "Exit codes:
  0   Success
  1   General error
  64  Usage error (invalid arguments or configuration)
  65  No confident match (with --strict)
  66  Input file missing or unreadable
  74  Cannot write output")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Engine configuration file (JSON); defaults come from CARDSNAKE_* variables
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or update a catalog snapshot from a directory of card images
    Build {
        /// Directory of reference images (set code = parent directory name)
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Catalog file to write (.json for JSON, anything else for CBOR)
        #[arg(short, long, value_name = "CATALOG")]
        output: PathBuf,

        /// Recompute entries that are already complete
        #[arg(long)]
        force: bool,
    },

    /// Add a user picture to a catalog
    Add {
        /// Picture of the card
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Catalog file (created when missing)
        #[arg(short, long, value_name = "CATALOG")]
        catalog: PathBuf,

        /// Set code recorded for the picture
        #[arg(long, default_value = "USER")]
        code: String,

        /// Card name (defaults to the file stem)
        #[arg(long)]
        name: Option<String>,
    },

    /// Import per-card face counts from a JSON file of id -> count
    Faces {
        /// Catalog file
        #[arg(short, long, value_name = "CATALOG")]
        catalog: PathBuf,

        /// JSON object mapping card ids to face counts
        #[arg(long, value_name = "FILE")]
        from: PathBuf,

        /// Overwrite counts that are already set
        #[arg(long)]
        force: bool,
    },

    /// Identify the card shown in an image
    Identify {
        /// Card region to identify
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Catalog file
        #[arg(short, long, value_name = "CATALOG")]
        catalog: PathBuf,

        /// Report cards with more verified matches than this
        #[arg(long)]
        min_matches: Option<usize>,

        /// Only consider catalog entries with at least this many faces
        #[arg(long)]
        faces: Option<u32>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Fail when nothing matches or the search had low confidence
        #[arg(long)]
        strict: bool,
    },

    /// Show candidate counts per radius for both orientations
    Scan {
        /// Card region to scan
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Catalog file
        #[arg(short, long, value_name = "CATALOG")]
        catalog: PathBuf,

        /// First radius
        #[arg(long, default_value_t = 4)]
        from: u32,

        /// Last radius (exclusive)
        #[arg(long, default_value_t = 18)]
        to: u32,
    },

    /// List fingerprints shared by more than one card
    Collisions {
        /// Catalog file
        #[arg(short, long, value_name = "CATALOG")]
        catalog: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Summarize a catalog
    Info {
        /// Catalog file
        #[arg(short, long, value_name = "CATALOG")]
        catalog: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = utils::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Build { dir, output, force } => commands::build::execute(dir, output, force, &config),
        Commands::Add {
            image,
            catalog,
            code,
            name,
        } => commands::add::execute(image, catalog, code, name, &config),
        Commands::Faces {
            catalog,
            from,
            force,
        } => commands::faces::execute(catalog, from, force),
        Commands::Identify {
            image,
            catalog,
            min_matches,
            faces,
            format,
            strict,
        } => commands::identify::execute(
            commands::identify::IdentifyArgs {
                image,
                catalog,
                min_matches,
                faces,
                format,
                strict,
            },
            config,
        ),
        Commands::Scan {
            image,
            catalog,
            from,
            to,
        } => commands::scan::execute(image, catalog, from..to, &config),
        Commands::Collisions { catalog, format } => commands::collisions::execute(catalog, format),
        Commands::Info { catalog, format } => commands::info::execute(catalog, format),
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli) {
        let exit = ExitCode::from_anyhow(&err);
        if let Some(message) = &exit.message {
            eprintln!("{} {}", "Error:".red().bold(), message);
        }
        std::process::exit(exit.code);
    }
}
