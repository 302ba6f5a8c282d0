//! Incremental descriptor index.
//!
//! Descriptor sets are expensive to load, so they are only materialized for
//! cards that have actually shown up as fingerprint candidates. The index is
//! bounded by `max_items`: when a request would overflow it, the whole index
//! is cleared and repopulated with the request instead of evicting entries one
//! by one. Candidate sets are session-local and reloading them is cheap next
//! to verification.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::{CardId, DescriptorSource};
use crate::features::Descriptor;

/// One indexed card.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchIndexEntry {
    pub id: CardId,
    pub descriptors: Vec<Descriptor>,
    /// Insertion order, unique for the lifetime of the index
    pub sequence: u64,
}

/// What an [`IncrementalMatchIndex::ensure_present`] call did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnsureReport {
    /// Distinct ids in the request
    pub requested: usize,
    /// Ids that were already indexed and needed no fetch
    pub already_present: usize,
    /// Ids fetched and inserted
    pub added: Vec<CardId>,
    /// Ids fetched without usable descriptors
    pub skipped: Vec<CardId>,
    /// Whether the index was cleared to make room
    pub cleared: bool,
    /// Ids dropped because the request alone exceeded the capacity
    pub truncated: usize,
}

impl EnsureReport {
    /// Number of descriptor lookups performed.
    pub fn fetched(&self) -> usize {
        self.added.len() + self.skipped.len()
    }
}

/// Bounded, append-only descriptor index keyed by card id.
#[derive(Debug, Clone)]
pub struct IncrementalMatchIndex {
    entries: Vec<MatchIndexEntry>,
    positions: HashMap<CardId, usize>,
    max_items: usize,
    next_sequence: u64,
    generation: u64,
    descriptor_count: usize,
}

impl IncrementalMatchIndex {
    pub fn new(max_items: usize) -> Self {
        Self {
            entries: Vec::new(),
            positions: HashMap::new(),
            max_items,
            next_sequence: 0,
            generation: 0,
            descriptor_count: 0,
        }
    }

    /// Make sure every id in `ids` is indexed, fetching the missing ones.
    ///
    /// Ids without descriptors are logged and skipped; they stay out of the
    /// index until a later call requests them again.
    pub fn ensure_present<S>(&mut self, ids: &[CardId], source: &S) -> EnsureReport
    where
        S: DescriptorSource + ?Sized,
    {
        let mut seen = HashSet::with_capacity(ids.len());
        let requested: Vec<&CardId> = ids.iter().filter(|id| seen.insert(*id)).collect();

        let mut report = EnsureReport {
            requested: requested.len(),
            ..EnsureReport::default()
        };

        let mut missing: Vec<&CardId> = requested
            .iter()
            .copied()
            .filter(|id| !self.positions.contains_key(*id))
            .collect();
        if missing.is_empty() {
            report.already_present = requested.len();
            return report;
        }

        if !self.is_empty() && self.len() + missing.len() > self.max_items {
            info!(
                size = self.len(),
                incoming = missing.len(),
                max_items = self.max_items,
                "Match index full, clearing"
            );
            self.clear();
            report.cleared = true;
            missing = requested;
        }
        report.already_present = report.requested - missing.len();

        if missing.len() > self.max_items {
            report.truncated = missing.len() - self.max_items;
            warn!(
                requested = missing.len(),
                max_items = self.max_items,
                "Request exceeds index capacity, truncating"
            );
            missing.truncate(self.max_items);
        }

        for id in missing {
            match source.descriptors(id) {
                Some(descriptors) if !descriptors.is_empty() => {
                    self.insert(id.clone(), descriptors);
                    report.added.push(id.clone());
                }
                _ => {
                    warn!(%id, "No descriptors available, skipping card");
                    report.skipped.push(id.clone());
                }
            }
        }

        debug!(
            added = report.added.len(),
            skipped = report.skipped.len(),
            size = self.len(),
            "Match index updated"
        );
        report
    }

    fn insert(&mut self, id: CardId, descriptors: Vec<Descriptor>) {
        self.descriptor_count += descriptors.len();
        self.positions.insert(id.clone(), self.entries.len());
        self.entries.push(MatchIndexEntry {
            id,
            descriptors,
            sequence: self.next_sequence,
        });
        self.next_sequence += 1;
    }

    /// Indexed entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = &MatchIndexEntry> {
        self.entries.iter()
    }

    pub fn get(&self, id: &CardId) -> Option<&MatchIndexEntry> {
        self.positions.get(id).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, id: &CardId) -> bool {
        self.positions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of descriptors across all entries.
    pub fn descriptor_count(&self) -> usize {
        self.descriptor_count
    }

    pub fn capacity(&self) -> usize {
        self.max_items
    }

    /// Change the capacity. An index larger than the new capacity is cleared.
    pub fn set_capacity(&mut self, max_items: usize) {
        self.max_items = max_items;
        if self.len() > max_items {
            info!(size = self.len(), max_items, "Capacity reduced, clearing match index");
            self.clear();
        }
    }

    /// Number of clears so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.positions.clear();
        self.descriptor_count = 0;
        self.generation += 1;
    }
}
