//! CardSnake Core - two-tier trading card identification
//!
//! This crate identifies a physical trading card from a camera region by
//! matching it against a large reference catalog.
//!
//! # Features
//!
//! - 64-bit perceptual fingerprints with Hamming distance (DCT or Blockhash)
//! - Adaptive radius candidate search with upside-down fallback
//! - Bounded incremental descriptor index that clears instead of evicting
//! - k-NN ratio-test verification of 256-bit binary descriptors
//! - CBOR and JSON catalog snapshots
//!
//! # Example
//!
//! ```no_run
//! use cardsnake_core::{Catalog, EngineConfig, FaceFilter, Identifier};
//!
//! # fn example() -> cardsnake_core::Result<()> {
//! let catalog = Catalog::load(std::path::Path::new("catalog.cbor"))?;
//! let mut engine = Identifier::from_catalog(catalog, FaceFilter::Any, EngineConfig::from_env())?;
//!
//! let region = image::open("frame.jpg")?;
//! let result = engine.identify(&region, 10)?;
//! if let Some(best) = result.best() {
//!     println!("{} ({} matches)", best.id, best.matches);
//! }
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod features;
pub mod fingerprint;
pub mod index;
pub mod search;
pub mod store;
pub mod verify;

// Re-export main types for convenience
pub use catalog::{
    user_card_id, CardId, Catalog, CatalogEntry, DescriptorSource, FingerprintSource,
    CATALOG_VERSION,
};
pub use config::EngineConfig;
pub use engine::{Identification, Identifier, QueryFeatures};
pub use error::{CardError, Result};
pub use features::{
    BriefConfig, BriefExtractor, Descriptor, DescriptorExtractor, Keypoint, DESCRIPTOR_SIZE,
};
pub use fingerprint::{
    hamming_distance, Fingerprint, FingerprintExtractor, FingerprintPair, HashAlgorithm,
    PerceptualHasher, FINGERPRINT_SIZE,
};
pub use index::{EnsureReport, IncrementalMatchIndex, MatchIndexEntry};
pub use search::{AdaptiveRadiusSearch, CandidateSet, Confidence, SearchConfig, SearchStrategy};
pub use store::{Column, FaceFilter, FingerprintStore, Orientation};
pub use verify::{CandidateVerifier, MatchScore, VerifyConfig};
