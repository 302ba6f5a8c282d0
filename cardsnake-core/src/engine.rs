//! Two-tier identification pipeline.
//!
//! [`Identifier`] wires the tiers together: the fingerprint search narrows
//! the catalog to a candidate set, the match index loads descriptors for
//! those candidates, and the verifier ranks them.

use std::sync::Arc;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::catalog::{CardId, Catalog, DescriptorSource};
use crate::config::EngineConfig;
use crate::error::{CardError, Result};
use crate::features::{BriefExtractor, Descriptor, DescriptorExtractor};
use crate::fingerprint::{FingerprintExtractor, FingerprintPair, PerceptualHasher};
use crate::index::IncrementalMatchIndex;
use crate::search::{AdaptiveRadiusSearch, CandidateSet, Confidence};
use crate::store::{FaceFilter, FingerprintStore, Orientation};
use crate::verify::{CandidateVerifier, MatchScore};

/// Pre-extracted features of a query region.
#[derive(Debug, Clone, Default)]
pub struct QueryFeatures {
    /// Fingerprints of the region as captured and rotated by 180°
    pub fingerprints: FingerprintPair,
    /// Descriptors of the region as captured
    pub descriptors: Vec<Descriptor>,
    /// Descriptors of the rotated region; the upright ones are used when absent
    pub flipped_descriptors: Option<Vec<Descriptor>>,
}

/// Result of one identification.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Identification {
    /// Verified cards, best first
    pub matches: Vec<MatchScore>,
    /// Fingerprint candidates the matches were drawn from
    pub candidates: Vec<CardId>,
    pub confidence: Confidence,
    pub orientation: Orientation,
    pub radius: u32,
    pub flips: u32,
}

impl Identification {
    pub fn best(&self) -> Option<&MatchScore> {
        self.matches.first()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    fn unverified(set: CandidateSet) -> Self {
        Self {
            matches: Vec::new(),
            candidates: set.ids,
            confidence: set.confidence,
            orientation: set.orientation,
            radius: set.radius,
            flips: set.flips,
        }
    }
}

/// Card identification engine.
///
/// Holds the fingerprint store, the incremental match index and the
/// descriptor source. `identify` takes `&mut self`: one query pipeline runs
/// at a time per engine.
pub struct Identifier<S: DescriptorSource> {
    store: Arc<FingerprintStore>,
    search: AdaptiveRadiusSearch,
    index: IncrementalMatchIndex,
    verifier: CandidateVerifier,
    source: S,
    fingerprinter: Box<dyn FingerprintExtractor>,
    describer: Box<dyn DescriptorExtractor>,
    config: EngineConfig,
}

impl Identifier<Catalog> {
    /// Build an engine backed by an in-memory catalog.
    pub fn from_catalog(catalog: Catalog, face_filter: FaceFilter, config: EngineConfig) -> Result<Self> {
        let store = FingerprintStore::load(catalog.entries(), face_filter)?;
        Self::new(store, catalog, config)
    }
}

impl<S: DescriptorSource> Identifier<S> {
    /// Create an engine with the reference extractors.
    pub fn new(store: impl Into<Arc<FingerprintStore>>, source: S, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let fingerprinter = PerceptualHasher::new(config.algorithm).with_art_ratio(config.art_ratio);
        Ok(Self {
            store: store.into(),
            search: AdaptiveRadiusSearch::new(config.search.clone()),
            index: IncrementalMatchIndex::new(config.index_capacity),
            verifier: CandidateVerifier::new(config.verify.clone()),
            source,
            fingerprinter: Box::new(fingerprinter),
            describer: Box::new(BriefExtractor::default()),
            config,
        })
    }

    /// Replace the extractors. They must match the ones the catalog was
    /// built with.
    pub fn with_extractors(
        mut self,
        fingerprinter: Box<dyn FingerprintExtractor>,
        describer: Box<dyn DescriptorExtractor>,
    ) -> Self {
        self.fingerprinter = fingerprinter;
        self.describer = describer;
        self
    }

    /// Identify the card shown in `region`.
    ///
    /// Only cards with more than `min_match_count` verified descriptor
    /// matches are reported. A region without descriptors yields an empty
    /// identification, not an error.
    #[instrument(skip(self, region), fields(width = region.width(), height = region.height()))]
    pub fn identify(&mut self, region: &DynamicImage, min_match_count: usize) -> Result<Identification> {
        if region.width() == 0 || region.height() == 0 {
            return Err(CardError::MalformedInput(format!(
                "region has zero size ({}x{})",
                region.width(),
                region.height()
            )));
        }

        let fingerprints = self.fingerprinter.fingerprint_pair(region)?;
        let describer = &self.describer;
        let extract = |orientation: Orientation| match orientation {
            Orientation::Upright => describer.descriptors(region),
            Orientation::Flipped => describer.descriptors(&region.rotate180()),
        };

        let set = self.search.search(&self.store, fingerprints);
        let descriptors = extract(set.orientation)?;
        Ok(self.verify_candidates(set, &descriptors, min_match_count))
    }

    /// Identify from pre-extracted features.
    pub fn identify_features(&mut self, query: &QueryFeatures, min_match_count: usize) -> Identification {
        let set = self.search.search(&self.store, query.fingerprints);
        let descriptors = match (set.orientation, &query.flipped_descriptors) {
            (Orientation::Flipped, Some(flipped)) => flipped,
            _ => &query.descriptors,
        };
        self.verify_candidates(set, descriptors, min_match_count)
    }

    fn verify_candidates(
        &mut self,
        set: CandidateSet,
        descriptors: &[Descriptor],
        min_match_count: usize,
    ) -> Identification {
        if descriptors.is_empty() {
            debug!("Query has no descriptors, nothing to verify");
            return Identification::unverified(set);
        }

        let report = self.index.ensure_present(&set.ids, &self.source);
        let matches = self
            .verifier
            .verify_with_threshold(descriptors, &self.index, min_match_count);

        info!(
            candidates = set.len(),
            fetched = report.fetched(),
            index_size = self.index.len(),
            matches = matches.len(),
            orientation = %set.orientation,
            radius = set.radius,
            "Identification complete"
        );

        Identification {
            matches,
            ..Identification::unverified(set)
        }
    }

    /// Drop every cached descriptor set.
    pub fn reset_index(&mut self) {
        self.index.clear();
    }

    /// Number of cards currently in the match index.
    pub fn index_size(&self) -> usize {
        self.index.len()
    }

    /// Change the match index capacity. Clears the index when it no longer
    /// fits.
    pub fn set_capacity(&mut self, max_items: usize) -> Result<()> {
        if max_items == 0 {
            return Err(CardError::ConfigError(
                "index capacity must be at least 1".into(),
            ));
        }
        self.index.set_capacity(max_items);
        self.config.index_capacity = max_items;
        Ok(())
    }

    /// Swap in a rebuilt fingerprint store after the catalog changed.
    /// The match index is cleared because its ids may be stale.
    pub fn replace_store(&mut self, store: impl Into<Arc<FingerprintStore>>) {
        self.store = store.into();
        self.index.clear();
    }

    pub fn store(&self) -> &Arc<FingerprintStore> {
        &self.store
    }

    pub fn index(&self) -> &IncrementalMatchIndex {
        &self.index
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogEntry;
    use crate::features::DESCRIPTOR_SIZE;
    use crate::fingerprint::Fingerprint;
    use crate::store::tests::{at_distance, entries_at};
    use sha3::{Digest, Sha3_256};

    /// Pseudo-random descriptors, unique per card name.
    fn card_descriptors(name: &str, count: usize) -> Vec<Descriptor> {
        (0..count)
            .map(|j| {
                let mut hasher = Sha3_256::new();
                hasher.update(name.as_bytes());
                hasher.update((j as u32).to_le_bytes());
                let digest = hasher.finalize();
                let mut bits = [0u8; DESCRIPTOR_SIZE];
                bits.copy_from_slice(&digest);
                Descriptor::from_bits(bits)
            })
            .collect()
    }

    /// Flip a few bits so the query is close to, but not equal to, the card.
    fn perturbed(descriptors: &[Descriptor]) -> Vec<Descriptor> {
        descriptors
            .iter()
            .map(|d| {
                let mut bits = d.bits;
                bits[0] ^= 0b0000_0111;
                Descriptor::from_bits(bits)
            })
            .collect()
    }

    /// Rows at distances {0, 1, 2, 3, 40, 50} from zero, each with 16
    /// descriptors.
    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        for entry in entries_at(&[0, 1, 2, 3, 40, 50]) {
            let descriptors = card_descriptors(entry.id.as_str(), 16);
            catalog.insert(entry.with_descriptors(descriptors));
        }
        catalog
    }

    fn engine() -> Identifier<Catalog> {
        Identifier::from_catalog(catalog(), FaceFilter::Any, EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_identify_features_upright() {
        let mut engine = engine();
        let query = QueryFeatures {
            fingerprints: FingerprintPair::new(Fingerprint::new(0), Fingerprint::new(u64::MAX)),
            descriptors: perturbed(&card_descriptors("card-2", 16)),
            flipped_descriptors: None,
        };

        let result = engine.identify_features(&query, 10);
        assert_eq!(result.orientation, Orientation::Upright);
        assert_eq!(result.confidence, Confidence::Normal);
        assert_eq!(result.candidates.len(), 4);
        assert_eq!(result.best().map(|m| m.id.as_str()), Some("card-2"));
        assert_eq!(result.best().map(|m| m.matches), Some(16));
        assert_eq!(result.matches.len(), 1, "other candidates share no descriptors");
        assert_eq!(engine.index_size(), 4);
    }

    #[test]
    fn test_identify_features_flipped_uses_rotated_descriptors() {
        let mut engine = engine();
        let query = QueryFeatures {
            fingerprints: FingerprintPair::new(at_distance(60), Fingerprint::new(0)),
            descriptors: card_descriptors("noise", 16),
            flipped_descriptors: Some(card_descriptors("card-1", 16)),
        };

        let result = engine.identify_features(&query, 10);
        assert_eq!(result.orientation, Orientation::Flipped);
        assert_eq!(result.flips, 1);
        assert_eq!(result.best().map(|m| m.id.as_str()), Some("card-1"));
    }

    #[test]
    fn test_min_match_count_is_strict() {
        let mut engine = engine();
        let query = QueryFeatures {
            fingerprints: FingerprintPair::new(Fingerprint::new(0), Fingerprint::new(u64::MAX)),
            descriptors: card_descriptors("card-0", 16),
            flipped_descriptors: None,
        };

        assert_eq!(engine.identify_features(&query, 15).matches.len(), 1);
        assert!(engine.identify_features(&query, 16).is_empty());
    }

    #[test]
    fn test_empty_descriptors_yield_empty_identification() {
        let mut engine = engine();
        let query = QueryFeatures {
            fingerprints: FingerprintPair::new(Fingerprint::new(0), Fingerprint::new(u64::MAX)),
            ..QueryFeatures::default()
        };

        let result = engine.identify_features(&query, 0);
        assert!(result.is_empty());
        assert!(!result.candidates.is_empty());
        assert_eq!(engine.index_size(), 0, "index untouched without descriptors");
    }

    #[test]
    fn test_zero_size_region_is_malformed() {
        let mut engine = engine();
        let region = DynamicImage::new_luma8(0, 40);
        assert!(matches!(
            engine.identify(&region, 10),
            Err(CardError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_cache_control() {
        let mut engine = engine();
        let query = QueryFeatures {
            fingerprints: FingerprintPair::new(Fingerprint::new(0), Fingerprint::new(u64::MAX)),
            descriptors: card_descriptors("card-3", 16),
            flipped_descriptors: None,
        };

        engine.identify_features(&query, 10);
        assert_eq!(engine.index_size(), 4);

        engine.reset_index();
        assert_eq!(engine.index_size(), 0);

        engine.set_capacity(2).unwrap();
        engine.identify_features(&query, 10);
        assert_eq!(engine.index_size(), 2, "candidate set truncated to capacity");
        assert_eq!(engine.config().index_capacity, 2);
        assert!(engine.set_capacity(0).is_err());
    }

    #[test]
    fn test_replace_store_clears_index() {
        let mut engine = engine();
        let query = QueryFeatures {
            fingerprints: FingerprintPair::new(Fingerprint::new(0), Fingerprint::new(u64::MAX)),
            descriptors: card_descriptors("card-0", 16),
            flipped_descriptors: None,
        };
        engine.identify_features(&query, 10);
        assert!(engine.index_size() > 0);

        let entries = vec![CatalogEntry::new("card-0").with_fingerprints(FingerprintPair::new(
            Fingerprint::new(0),
            Fingerprint::new(u64::MAX),
        ))];
        engine.replace_store(FingerprintStore::load(&entries, FaceFilter::Any).unwrap());
        assert_eq!(engine.store().len(), 1);
        assert_eq!(engine.index_size(), 0);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = EngineConfig {
            index_capacity: 0,
            ..EngineConfig::default()
        };
        assert!(Identifier::from_catalog(catalog(), FaceFilter::Any, config).is_err());
    }
}
