//! Descriptor-level candidate verification.
//!
//! The match index is treated as one multi-card nearest-neighbour structure:
//! every query descriptor is matched against the union of all indexed
//! descriptors, the ratio test discards ambiguous matches, and the surviving
//! matches are counted per owning card.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::CardId;
use crate::error::{CardError, Result};
use crate::features::Descriptor;
use crate::index::IncrementalMatchIndex;

/// Tuning for descriptor verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// Neighbours retrieved per query descriptor (the ratio test uses two)
    pub k: usize,
    /// Accept a match when `best < ratio * second_best`
    pub ratio: f32,
    /// A card is reported when its match count exceeds this
    pub min_matches: usize,
    /// Optional threshold scaling: `max(min_matches, ceil(scale * query_len))`
    pub scale: Option<f32>,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            k: 2,
            ratio: 0.83,
            min_matches: 10,
            scale: None,
        }
    }
}

impl VerifyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.k < 2 {
            return Err(CardError::ConfigError(
                "k must be at least 2 for the ratio test".into(),
            ));
        }
        if !(self.ratio > 0.0 && self.ratio <= 1.0) {
            return Err(CardError::ConfigError(format!(
                "ratio must be within (0, 1], got {}",
                self.ratio
            )));
        }
        if let Some(scale) = self.scale {
            if !(scale.is_finite() && scale >= 0.0) {
                return Err(CardError::ConfigError(format!(
                    "scale must be a non-negative number, got {}",
                    scale
                )));
            }
        }
        Ok(())
    }

    /// Effective threshold for a query of `query_len` descriptors.
    pub fn threshold(&self, min_matches: usize, query_len: usize) -> usize {
        match self.scale {
            Some(scale) => min_matches.max((scale * query_len as f32).ceil() as usize),
            None => min_matches,
        }
    }
}

/// A card and the number of descriptor matches that survived the ratio test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchScore {
    pub id: CardId,
    pub matches: usize,
}

/// One neighbour of a query descriptor in the train set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbor {
    /// Position in the train set
    pub train: usize,
    pub distance: u32,
}

/// Brute-force k-nearest-neighbour matching, nearest first.
///
/// Ties keep the earlier train descriptor first. Fewer than `k` neighbours
/// are returned when the train set is smaller than `k`.
pub fn knn_match(query: &[Descriptor], train: &[&Descriptor], k: usize) -> Vec<Vec<Neighbor>> {
    query
        .iter()
        .map(|q| {
            let mut best: Vec<Neighbor> = Vec::with_capacity(k + 1);
            for (j, t) in train.iter().enumerate() {
                let distance = q.distance(t);
                if best.len() == k && best.last().is_some_and(|w| distance >= w.distance) {
                    continue;
                }
                let at = best.partition_point(|n| n.distance <= distance);
                best.insert(at, Neighbor { train: j, distance });
                best.truncate(k);
            }
            best
        })
        .collect()
}

/// Ratio test: the nearest neighbour must be clearly closer than the second.
#[inline]
pub fn passes_ratio(best: u32, second: u32, ratio: f32) -> bool {
    (best as f32) < ratio * second as f32
}

/// Ranks indexed cards by descriptor agreement with a query.
#[derive(Debug, Clone, Default)]
pub struct CandidateVerifier {
    config: VerifyConfig,
}

impl CandidateVerifier {
    pub fn new(config: VerifyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VerifyConfig {
        &self.config
    }

    /// Verify with the configured `min_matches`.
    pub fn verify(&self, query: &[Descriptor], index: &IncrementalMatchIndex) -> Vec<MatchScore> {
        self.verify_with_threshold(query, index, self.config.min_matches)
    }

    /// Verify, reporting cards whose match count exceeds `min_matches`
    /// (after optional scaling). Sorted by match count, highest first; equal
    /// counts keep index insertion order.
    pub fn verify_with_threshold(
        &self,
        query: &[Descriptor],
        index: &IncrementalMatchIndex,
        min_matches: usize,
    ) -> Vec<MatchScore> {
        if query.is_empty() || index.is_empty() {
            return Vec::new();
        }

        let owners: Vec<&CardId> = index.entries().map(|e| &e.id).collect();
        let mut train: Vec<&Descriptor> = Vec::with_capacity(index.descriptor_count());
        let mut train_owner: Vec<usize> = Vec::with_capacity(index.descriptor_count());
        for (slot, entry) in index.entries().enumerate() {
            for descriptor in &entry.descriptors {
                train.push(descriptor);
                train_owner.push(slot);
            }
        }

        let mut counts = vec![0usize; owners.len()];
        let mut accepted = 0usize;
        for neighbors in knn_match(query, &train, self.config.k.max(2)) {
            let [best, second, ..] = neighbors.as_slice() else {
                continue;
            };
            if passes_ratio(best.distance, second.distance, self.config.ratio) {
                counts[train_owner[best.train]] += 1;
                accepted += 1;
            }
        }

        let threshold = self.config.threshold(min_matches, query.len());
        let mut scores: Vec<MatchScore> = counts
            .into_iter()
            .enumerate()
            .filter(|&(_, matches)| matches > threshold)
            .map(|(slot, matches)| MatchScore {
                id: owners[slot].clone(),
                matches,
            })
            .collect();
        scores.sort_by(|a, b| b.matches.cmp(&a.matches));

        debug!(
            query = query.len(),
            train = train.len(),
            accepted,
            threshold,
            reported = scores.len(),
            "Verified candidates"
        );
        scores
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CardId;
    use crate::features::DESCRIPTOR_SIZE;

    /// Descriptor with the lowest `n` bits set.
    fn bits_set(n: usize) -> Descriptor {
        let mut bits = [0u8; DESCRIPTOR_SIZE];
        for i in 0..n {
            bits[i / 8] |= 1 << (i % 8);
        }
        Descriptor::from_bits(bits)
    }

    /// Descriptor with the highest `n` bits set.
    fn high_bits_set(n: usize) -> Descriptor {
        let mut bits = [0u8; DESCRIPTOR_SIZE];
        for i in (DESCRIPTOR_SIZE * 8 - n)..DESCRIPTOR_SIZE * 8 {
            bits[i / 8] |= 1 << (i % 8);
        }
        Descriptor::from_bits(bits)
    }

    fn index_with(cards: &[(&str, Vec<Descriptor>)]) -> IncrementalMatchIndex {
        let mut index = IncrementalMatchIndex::new(cards.len().max(1));
        let lookup: Vec<(CardId, Vec<Descriptor>)> = cards
            .iter()
            .map(|(id, d)| (CardId::from(*id), d.clone()))
            .collect();
        let source = |id: &CardId| {
            lookup
                .iter()
                .find(|(candidate, _)| candidate == id)
                .map(|(_, d)| d.clone())
        };
        let ids: Vec<CardId> = lookup.iter().map(|(id, _)| id.clone()).collect();
        index.ensure_present(&ids, &source);
        index
    }

    fn verifier(ratio: f32, min_matches: usize) -> CandidateVerifier {
        CandidateVerifier::new(VerifyConfig {
            ratio,
            min_matches,
            ..VerifyConfig::default()
        })
    }

    #[test]
    fn test_ratio_test_scenarios() {
        assert!(passes_ratio(3, 10, 0.8), "3 < 0.8 * 10 must be accepted");
        assert!(!passes_ratio(8, 9, 0.8), "8 >= 7.2 must be rejected");
        assert!(!passes_ratio(0, 0, 0.8), "equal zero distances are ambiguous");
        assert!(passes_ratio(0, 1, 0.8));
    }

    #[test]
    fn test_knn_match_orders_neighbours() {
        let train_owned = [bits_set(10), bits_set(2), bits_set(5), bits_set(2)];
        let train: Vec<&Descriptor> = train_owned.iter().collect();

        let result = knn_match(&[bits_set(0)], &train, 2);
        assert_eq!(
            result[0],
            vec![
                Neighbor { train: 1, distance: 2 },
                Neighbor { train: 3, distance: 2 }
            ]
        );

        let result = knn_match(&[bits_set(0)], &train[..1], 2);
        assert_eq!(result[0].len(), 1);
    }

    #[test]
    fn test_verify_accepts_clear_and_rejects_ambiguous() {
        let query = [bits_set(0)];

        // 3 bits from "a", 10 from "b": accepted for "a".
        let index = index_with(&[("a", vec![bits_set(3)]), ("b", vec![bits_set(10)])]);
        assert_eq!(
            verifier(0.8, 0).verify(&query, &index),
            vec![MatchScore {
                id: CardId::from("a"),
                matches: 1
            }]
        );

        // 8 bits from "b", 9 from "a": rejected.
        let index = index_with(&[("a", vec![bits_set(9)]), ("b", vec![bits_set(8)])]);
        assert!(verifier(0.8, 0).verify(&query, &index).is_empty());
    }

    #[test]
    fn test_verify_ranks_by_match_count() {
        let strong: Vec<Descriptor> = (0..6).map(|i| bits_set(40 * i)).collect();
        let weak: Vec<Descriptor> = (0..2).map(|i| high_bits_set(100 + 40 * i)).collect();
        let index = index_with(&[("weak", weak.clone()), ("strong", strong.clone())]);

        let query: Vec<Descriptor> = strong.iter().chain(weak.iter()).cloned().collect();
        let scores = verifier(0.83, 0).verify(&query, &index);

        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].id, CardId::from("strong"));
        assert_eq!(scores[0].matches, 6);
        assert_eq!(scores[1].id, CardId::from("weak"));
        assert_eq!(scores[1].matches, 2);
    }

    #[test]
    fn test_threshold_is_strict() {
        let strong: Vec<Descriptor> = (0..6).map(|i| bits_set(40 * i)).collect();
        let index = index_with(&[("strong", strong.clone()), ("other", vec![high_bits_set(128)])]);

        assert_eq!(verifier(0.83, 5).verify(&strong, &index).len(), 1);
        assert!(verifier(0.83, 6).verify(&strong, &index).is_empty());
    }

    #[test]
    fn test_scaled_threshold() {
        let config = VerifyConfig {
            scale: Some(0.05),
            ..VerifyConfig::default()
        };
        assert_eq!(config.threshold(10, 100), 10);
        assert_eq!(config.threshold(10, 400), 20);
        assert_eq!(VerifyConfig::default().threshold(7, 1000), 7);
    }

    #[test]
    fn test_empty_inputs() {
        let index = index_with(&[("a", vec![bits_set(1), bits_set(2)])]);
        assert!(verifier(0.8, 0).verify(&[], &index).is_empty());

        let empty = IncrementalMatchIndex::new(4);
        assert!(verifier(0.8, 0).verify(&[bits_set(1)], &empty).is_empty());
    }

    #[test]
    fn test_single_train_descriptor_is_never_accepted() {
        let index = index_with(&[("a", vec![bits_set(0)])]);
        assert!(verifier(0.8, 0).verify(&[bits_set(0)], &index).is_empty());
    }

    #[test]
    fn test_verify_is_deterministic() {
        let a: Vec<Descriptor> = (0..5).map(|i| bits_set(30 * i + 1)).collect();
        let b: Vec<Descriptor> = (0..5).map(|i| high_bits_set(30 * i + 3)).collect();
        let index = index_with(&[("a", a.clone()), ("b", b.clone())]);
        let query: Vec<Descriptor> = a.iter().chain(b.iter()).cloned().collect();

        let v = verifier(0.83, 1);
        let first = v.verify(&query, &index);
        for _ in 0..5 {
            assert_eq!(v.verify(&query, &index), first);
        }
        // Equal counts keep insertion order.
        assert_eq!(first[0].id, CardId::from("a"));
        assert_eq!(first[1].id, CardId::from("b"));
    }

    #[test]
    fn test_config_validation() {
        assert!(VerifyConfig::default().validate().is_ok());
        assert!(VerifyConfig {
            k: 1,
            ..VerifyConfig::default()
        }
        .validate()
        .is_err());
        assert!(VerifyConfig {
            ratio: 1.5,
            ..VerifyConfig::default()
        }
        .validate()
        .is_err());
        assert!(VerifyConfig {
            scale: Some(f32::NAN),
            ..VerifyConfig::default()
        }
        .validate()
        .is_err());
    }
}
