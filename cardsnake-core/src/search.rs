//! Fingerprint-level candidate search.
//!
//! Turns one query fingerprint pair into a small candidate set by moving a
//! Hamming radius around until the set is just large enough.
//!
//! ## Adaptive radius
//!
//! Within one attempt, with `count(r)` the number of store rows at distance
//! strictly below `r`:
//!
//! 1. `count(r) < min_candidates`: grow `r` by `grow_step` (capped at
//!    `max_radius`; at the cap the attempt is exhausted).
//! 2. else if `r > 1` and `count(r - 1) >= min_candidates`: shrink `r` by one.
//! 3. else the attempt settles at `r`.
//!
//! A shrink is only taken when the smaller radius still has enough
//! candidates, so a grow never follows a shrink and every attempt terminates.
//!
//! When an attempt settles above `flip_threshold`, the upright query matched
//! poorly and the card is probably upside down: the next attempt uses the
//! query's 180° fingerprint, a threshold one higher, and a starting radius
//! `flip_radius_drop` lower. At most `max_flips` flips are made.
//!
//! ## Orientation vote
//!
//! [`SearchStrategy::Vote`] decides the orientation first by comparing how
//! many rows lie near the query in the primary column against the mirrored
//! column, and only then collects candidates.

use std::collections::BTreeMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::CardId;
use crate::error::{CardError, Result};
use crate::fingerprint::{Fingerprint, FingerprintPair};
use crate::store::{Column, FingerprintStore, Orientation};

/// Radii examined by the orientation vote.
const VOTE_RADII: Range<u32> = 6..20;

/// Radii examined by the vote's last-resort ranking.
const FALLBACK_RADII: Range<u32> = 5..19;

/// Extra radius added to the first productive radius by the last resort.
const FALLBACK_GRIP: u32 = 1;

/// Flips after which the vote gives up voting.
const MAX_VOTE_TRIPS: u32 = 2;

/// Smallest radius that admits every 64-bit fingerprint.
pub const RADIUS_LIMIT: u32 = 65;

/// How candidates are collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    /// Adaptive radius with flip fallback
    #[default]
    Adaptive,
    /// Orientation vote over primary and mirrored columns
    Vote,
}

/// Tuning for the candidate search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub strategy: SearchStrategy,
    /// Starting radius of the first attempt
    pub default_radius: u32,
    /// Smallest acceptable candidate set
    pub min_candidates: usize,
    /// Radius increment when too few candidates are found
    pub grow_step: u32,
    /// Settled radius above which the flipped query is tried
    pub flip_threshold: u32,
    /// Starting radius reduction for a flipped attempt
    pub flip_radius_drop: u32,
    /// Maximum number of orientation flips
    pub max_flips: u32,
    /// Largest radius ever tried (65 includes every 64-bit fingerprint)
    pub max_radius: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            strategy: SearchStrategy::Adaptive,
            default_radius: 6,
            min_candidates: 4,
            grow_step: 2,
            flip_threshold: 15,
            flip_radius_drop: 5,
            max_flips: 3,
            max_radius: RADIUS_LIMIT,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_candidates == 0 {
            return Err(CardError::ConfigError(
                "min_candidates must be at least 1".into(),
            ));
        }
        if self.grow_step == 0 {
            return Err(CardError::ConfigError("grow_step must be at least 1".into()));
        }
        if self.max_radius == 0 || self.max_radius > RADIUS_LIMIT {
            return Err(CardError::ConfigError(format!(
                "max_radius must be within 1..={RADIUS_LIMIT}"
            )));
        }
        if self.default_radius == 0 || self.default_radius > self.max_radius {
            return Err(CardError::ConfigError(format!(
                "default_radius must be within 1..={}",
                self.max_radius
            )));
        }
        Ok(())
    }
}

/// Whether a candidate set reached the target size cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    #[default]
    Normal,
    /// Radius or flip budget ran out; the set may be too small or too loose
    Low,
}

/// Bounded candidate set produced by a search.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CandidateSet {
    pub ids: Vec<CardId>,
    /// Radius the set was collected at
    pub radius: u32,
    /// Query orientation the set was collected with
    pub orientation: Orientation,
    /// Orientation flips made before settling
    pub flips: u32,
    pub confidence: Confidence,
}

impl CandidateSet {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn is_low_confidence(&self) -> bool {
        self.confidence == Confidence::Low
    }
}

/// Outcome of one attempt at a fixed orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Settled {
    radius: u32,
    exhausted: bool,
}

/// Fingerprint of the query in a given orientation.
fn oriented(query: FingerprintPair, orientation: Orientation) -> Fingerprint {
    match orientation {
        Orientation::Upright => query.primary,
        Orientation::Flipped => query.mirrored,
    }
}

/// Candidate search over a [`FingerprintStore`].
#[derive(Debug, Clone, Default)]
pub struct AdaptiveRadiusSearch {
    config: SearchConfig,
}

impl AdaptiveRadiusSearch {
    /// Create a search. Out-of-range radius settings are clamped so that
    /// every search terminates, even for an unvalidated config.
    pub fn new(mut config: SearchConfig) -> Self {
        config.grow_step = config.grow_step.max(1);
        config.max_radius = config.max_radius.clamp(1, RADIUS_LIMIT);
        Self { config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Collect candidates for a query.
    ///
    /// `query.primary` is the fingerprint of the region as captured and
    /// `query.mirrored` the fingerprint of the region rotated by 180°.
    pub fn search(&self, store: &FingerprintStore, query: FingerprintPair) -> CandidateSet {
        match self.config.strategy {
            SearchStrategy::Adaptive => self.adaptive(store, query),
            SearchStrategy::Vote => self.orientation_vote(store, query),
        }
    }

    /// Adaptive radius search with bounded orientation flips.
    pub fn adaptive(&self, store: &FingerprintStore, query: FingerprintPair) -> CandidateSet {
        let cfg = &self.config;
        let mut orientation = Orientation::Upright;
        let mut radius = cfg.default_radius.max(1);
        let mut flip_threshold = cfg.flip_threshold;
        let mut flips = 0u32;
        let mut largest: Option<CandidateSet> = None;

        loop {
            let fingerprint = oriented(query, orientation);
            let settled = self.settle(store, fingerprint, radius);
            let set = CandidateSet {
                ids: store.candidates(fingerprint, Column::Primary, settled.radius),
                radius: settled.radius,
                orientation,
                flips,
                confidence: if settled.exhausted {
                    Confidence::Low
                } else {
                    Confidence::Normal
                },
            };
            debug!(
                %orientation,
                radius = set.radius,
                candidates = set.len(),
                exhausted = settled.exhausted,
                flip_threshold,
                "Search attempt settled"
            );

            let too_loose = settled.radius > flip_threshold;
            if too_loose && flips < cfg.max_flips {
                radius = settled
                    .radius
                    .saturating_sub(cfg.flip_radius_drop)
                    .max(1);
                orientation = orientation.flipped();
                flip_threshold += 1;
                flips += 1;
                keep_largest(&mut largest, set);
                continue;
            }

            if !too_loose && !set.is_low_confidence() {
                return set;
            }

            keep_largest(&mut largest, set);
            let mut best = largest.unwrap_or_default();
            best.confidence = Confidence::Low;
            warn!(
                radius = best.radius,
                candidates = best.len(),
                flips,
                "Search budget exhausted, returning low-confidence candidates"
            );
            return best;
        }
    }

    /// Move the radius until the candidate count is just enough.
    fn settle(&self, store: &FingerprintStore, query: Fingerprint, start: u32) -> Settled {
        let cfg = &self.config;
        let min = cfg.min_candidates;
        let mut radius = start.clamp(1, cfg.max_radius);

        loop {
            let count = store.count_within(query, Column::Primary, radius);
            if count < min {
                if radius >= cfg.max_radius {
                    return Settled {
                        radius,
                        exhausted: true,
                    };
                }
                radius = radius.saturating_add(cfg.grow_step).min(cfg.max_radius);
                continue;
            }
            if radius > 1 && store.count_within(query, Column::Primary, radius - 1) >= min {
                radius -= 1;
                continue;
            }
            return Settled {
                radius,
                exhausted: false,
            };
        }
    }

    /// Orientation vote using the store's precomputed mirrored column.
    ///
    /// For each radius, an upright query has more rows near it in the primary
    /// column than in the mirrored one; an upside-down query the opposite.
    /// Each flip lowers the bar for accepting the upright reading. After
    /// too many flips the orientation whose radius scan has the fewest empty
    /// radii wins.
    pub fn orientation_vote(&self, store: &FingerprintStore, query: FingerprintPair) -> CandidateSet {
        let mut orientation = Orientation::Upright;
        let mut trips = 0u32;

        'vote: while trips <= MAX_VOTE_TRIPS {
            let fingerprint = oriented(query, orientation);
            let slack = trips as i64;

            for radius in VOTE_RADII {
                let ups = store.count_within(fingerprint, Column::Primary, radius) as i64;
                let downs = store.count_within(fingerprint, Column::Mirrored, radius) as i64;
                if ups == downs {
                    continue;
                }
                if ups > 3 - slack && ups > downs - slack {
                    debug!(%orientation, radius, ups, downs, trips, "Vote settled");
                    return CandidateSet {
                        ids: store.candidates(fingerprint, Column::Primary, radius),
                        radius,
                        orientation,
                        flips: trips,
                        confidence: Confidence::Normal,
                    };
                }
                if downs > slack && downs > ups {
                    debug!(%orientation, radius, ups, downs, trips, "Vote says flip");
                    orientation = orientation.flipped();
                    trips += 1;
                    continue 'vote;
                }
            }

            warn!(trips, "Vote could not tell up from down");
            return CandidateSet {
                orientation,
                flips: trips,
                confidence: Confidence::Low,
                ..CandidateSet::default()
            };
        }

        self.least_empty(store, query, trips)
    }

    /// Last resort of the vote: pick the orientation with the fewest radii
    /// yielding nothing, and collect just past its first productive radius.
    fn least_empty(&self, store: &FingerprintStore, query: FingerprintPair, trips: u32) -> CandidateSet {
        let empty_radii = |orientation: Orientation| {
            let fingerprint = oriented(query, orientation);
            FALLBACK_RADII
                .filter(|&r| store.count_within(fingerprint, Column::Primary, r) == 0)
                .count() as u32
        };

        let upright_empty = empty_radii(Orientation::Upright);
        let flipped_empty = empty_radii(Orientation::Flipped);
        let (orientation, empty) = if flipped_empty < upright_empty {
            (Orientation::Flipped, flipped_empty)
        } else {
            (Orientation::Upright, upright_empty)
        };

        let radius = FALLBACK_RADII.start + empty + FALLBACK_GRIP;
        warn!(%orientation, radius, "Vote fell back to least-empty ranking");
        CandidateSet {
            ids: store.candidates(oriented(query, orientation), Column::Primary, radius),
            radius,
            orientation,
            flips: trips,
            confidence: Confidence::Low,
        }
    }

    /// Candidate counts `(primary, mirrored)` per radius, without committing
    /// to an orientation. Diagnostic only.
    pub fn dual_orientation_scan(
        store: &FingerprintStore,
        query: Fingerprint,
        radii: Range<u32>,
    ) -> BTreeMap<u32, (usize, usize)> {
        radii
            .map(|r| {
                (
                    r,
                    (
                        store.count_within(query, Column::Primary, r),
                        store.count_within(query, Column::Mirrored, r),
                    ),
                )
            })
            .collect()
    }
}

fn keep_largest(largest: &mut Option<CandidateSet>, set: CandidateSet) {
    let replace = largest.as_ref().map_or(true, |best| set.len() > best.len());
    if replace {
        *largest = Some(set);
    }
}
