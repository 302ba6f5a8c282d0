//! Example demonstrating the identification pipeline's tracing output.
//!
//! Builds a small catalog of generated cards, then identifies one of them
//! upright and upside down with debug logging enabled.
//!
//! Run with: cargo run -p cardsnake-core --example identify_tracing

use cardsnake_core::{
    BriefExtractor, Catalog, CatalogEntry, DescriptorExtractor, EngineConfig, FaceFilter,
    FingerprintExtractor, Identifier, PerceptualHasher,
};
use image::{DynamicImage, ImageBuffer, Rgb};
use tracing_subscriber::{fmt, EnvFilter};

fn generated_card(seed: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(ImageBuffer::from_fn(180, 252, |x, y| {
        if y >= 144 {
            return Rgb([235, 230, 220]);
        }
        let h = (x / 9).wrapping_mul(73_856_093)
            ^ (y / 9).wrapping_mul(19_349_663)
            ^ seed.wrapping_mul(83_492_791);
        let v = h.wrapping_mul(2_654_435_761);
        Rgb([(v >> 24) as u8, (v >> 16) as u8, (v >> 8) as u8])
    }))
}

fn main() {
    // Initialize tracing subscriber with debug level
    fmt()
        .with_env_filter(EnvFilter::new("cardsnake_core=debug,info"))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    println!("=== CardSnake Tracing Demo ===\n");

    let hasher = PerceptualHasher::default();
    let describer = BriefExtractor::default();
    let mut catalog = Catalog::new();
    for seed in 1..=12 {
        let image = generated_card(seed);
        let (Ok(fingerprints), Ok(descriptors)) =
            (hasher.fingerprint_pair(&image), describer.descriptors(&image))
        else {
            eprintln!("Failed to process card {seed}");
            return;
        };
        catalog.insert(
            CatalogEntry::new(format!("card-{seed}"))
                .with_fingerprints(fingerprints)
                .with_descriptors(descriptors),
        );
    }

    let mut engine = match Identifier::from_catalog(catalog, FaceFilter::Any, EngineConfig::default()) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Failed to create engine: {}", e);
            return;
        }
    };

    for (label, query) in [
        ("upright", generated_card(7)),
        ("upside down", generated_card(7).rotate180()),
    ] {
        println!("\nIdentifying card-7 ({label})...\n");
        match engine.identify(&query, 5) {
            Ok(result) => match result.best() {
                Some(best) => println!(
                    "Best: {} ({} matches, {}, confidence {:?})",
                    best.id, best.matches, result.orientation, result.confidence
                ),
                None => println!("No match ({:?} confidence)", result.confidence),
            },
            Err(e) => eprintln!("Identification failed: {}", e),
        }
    }

    println!("\nIndex holds {} cards", engine.index_size());
}
