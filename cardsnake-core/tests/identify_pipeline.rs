//! End-to-end identification tests on synthetic card images.
//!
//! Each synthetic card has a unique blocky texture in its art box and a
//! plain text box below it, roughly the layout of a real card.

use std::io::Cursor;

use cardsnake_core::{
    BriefExtractor, CardId, Catalog, CatalogEntry, Confidence, DescriptorExtractor, EngineConfig,
    FaceFilter, FingerprintExtractor, Identifier, Orientation, PerceptualHasher,
};
use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};

const CARD_WIDTH: u32 = 180;
const CARD_HEIGHT: u32 = 252;

/// Build a card whose art box texture is determined by `seed`.
fn synthetic_card(seed: u32) -> RgbImage {
    let art_height = (CARD_WIDTH as f32 * 0.8) as u32;
    ImageBuffer::from_fn(CARD_WIDTH, CARD_HEIGHT, |x, y| {
        if y >= art_height {
            return Rgb([235, 230, 220]);
        }
        let (bx, by) = (x / 9, y / 9);
        let h = bx.wrapping_mul(73_856_093)
            ^ by.wrapping_mul(19_349_663)
            ^ seed.wrapping_mul(83_492_791);
        let v = h.wrapping_mul(2_654_435_761);
        Rgb([(v >> 24) as u8, (v >> 16) as u8, (v >> 8) as u8])
    })
}

fn compress_jpeg(img: &DynamicImage, quality: u8) -> DynamicImage {
    let mut buffer = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);
    img.write_with_encoder(encoder).expect("JPEG encoding failed");
    image::load_from_memory(&buffer.into_inner()).expect("JPEG decoding failed")
}

/// Catalog of `count` synthetic cards named `card-<seed>`.
fn build_catalog(count: u32) -> Catalog {
    let hasher = PerceptualHasher::default();
    let describer = BriefExtractor::default();
    let mut catalog = Catalog::new();

    for seed in 1..=count {
        let image = DynamicImage::ImageRgb8(synthetic_card(seed));
        let entry = CatalogEntry::new(format!("card-{seed}"))
            .with_fingerprints(hasher.fingerprint_pair(&image).unwrap())
            .with_descriptors(describer.descriptors(&image).unwrap());
        catalog.insert(entry);
    }
    catalog
}

/// Never flips: every query is read upright.
fn upright_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.search.min_candidates = 2;
    config.search.flip_threshold = 64;
    config
}

// ============================================================================
// Upright queries
// ============================================================================

#[test]
fn test_identifies_exact_card() {
    let catalog = build_catalog(8);
    let mut engine = Identifier::from_catalog(catalog, FaceFilter::Any, upright_config()).unwrap();

    let query = DynamicImage::ImageRgb8(synthetic_card(5));
    let result = engine.identify(&query, 5).unwrap();

    assert_eq!(result.orientation, Orientation::Upright);
    assert!(result.candidates.contains(&CardId::from("card-5")));
    let best = result.best().expect("card-5 should be identified");
    assert_eq!(best.id, CardId::from("card-5"));
    assert!(best.matches > 5);
}

#[test]
fn test_identifies_recompressed_card() {
    let catalog = build_catalog(8);
    let mut engine = Identifier::from_catalog(catalog, FaceFilter::Any, upright_config()).unwrap();

    let query = compress_jpeg(&DynamicImage::ImageRgb8(synthetic_card(3)), 90);
    let result = engine.identify(&query, 5).unwrap();

    assert_eq!(
        result.best().map(|m| m.id.clone()),
        Some(CardId::from("card-3")),
        "JPEG recompression should not change the identification: {result:?}"
    );
}

#[test]
fn test_repeated_queries_reuse_the_index() {
    let catalog = build_catalog(6);
    let mut engine = Identifier::from_catalog(catalog, FaceFilter::Any, upright_config()).unwrap();
    let query = DynamicImage::ImageRgb8(synthetic_card(2));

    let first = engine.identify(&query, 5).unwrap();
    let size = engine.index_size();
    let generation = engine.index().generation();

    let second = engine.identify(&query, 5).unwrap();
    assert_eq!(first, second);
    assert_eq!(engine.index_size(), size);
    assert_eq!(engine.index().generation(), generation, "no clear for a repeated query");
}

// ============================================================================
// Upside-down queries
// ============================================================================

#[test]
fn test_identifies_upside_down_card() {
    let catalog = build_catalog(8);
    // Any settled radius exceeds a zero threshold, so the first attempt always
    // flips; the flipped fingerprint then matches its card exactly.
    let mut config = EngineConfig::default();
    config.search.min_candidates = 1;
    config.search.flip_threshold = 0;
    let mut engine = Identifier::from_catalog(catalog, FaceFilter::Any, config).unwrap();

    let query = DynamicImage::ImageRgb8(synthetic_card(7)).rotate180();
    let result = engine.identify(&query, 5).unwrap();

    assert_eq!(result.orientation, Orientation::Flipped);
    assert_eq!(result.confidence, Confidence::Normal);
    assert_eq!(result.radius, 1);
    assert_eq!(result.best().map(|m| m.id.clone()), Some(CardId::from("card-7")));
}

// ============================================================================
// Edge cases
// ============================================================================

#[test]
fn test_blank_region_has_no_matches() {
    let catalog = build_catalog(4);
    let mut engine = Identifier::from_catalog(catalog, FaceFilter::Any, upright_config()).unwrap();

    let blank = DynamicImage::ImageRgb8(RgbImage::from_pixel(CARD_WIDTH, CARD_HEIGHT, Rgb([90, 90, 90])));
    let result = engine.identify(&blank, 5).unwrap();

    assert!(result.is_empty());
    assert_eq!(engine.index_size(), 0);
}

#[test]
fn test_catalog_snapshot_round_trip_identifies_the_same() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.cbor");
    build_catalog(5).save(&path).unwrap();

    let loaded = Catalog::load(&path).unwrap();
    let mut engine = Identifier::from_catalog(loaded, FaceFilter::Any, upright_config()).unwrap();
    let result = engine.identify(&DynamicImage::ImageRgb8(synthetic_card(4)), 5).unwrap();

    assert_eq!(result.best().map(|m| m.id.clone()), Some(CardId::from("card-4")));
}

#[test]
fn test_face_filter_without_faces_is_empty_catalog() {
    let catalog = build_catalog(3);
    let result = Identifier::from_catalog(catalog, FaceFilter::AtLeast(1), EngineConfig::default());
    assert!(matches!(result, Err(cardsnake_core::CardError::EmptyCatalog { .. })));
}
