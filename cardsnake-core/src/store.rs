//! Columnar fingerprint snapshot of the catalog.
//!
//! [`FingerprintStore`] keeps three co-indexed columns (ids, primary and
//! mirrored fingerprints): row `i` of every column belongs to the same card.
//! It is rebuilt wholesale whenever the catalog changes and is read-only
//! afterwards, so it can be shared between threads freely.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::catalog::{CardId, CatalogEntry};
use crate::error::{CardError, Result};
use crate::fingerprint::Fingerprint;

/// Which orientation of the query is being compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Orientation {
    /// Query as captured
    #[default]
    Upright,
    /// Query rotated by 180°
    Flipped,
}

impl Orientation {
    pub fn flipped(self) -> Self {
        match self {
            Self::Upright => Self::Flipped,
            Self::Flipped => Self::Upright,
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upright => write!(f, "upright"),
            Self::Flipped => write!(f, "flipped"),
        }
    }
}

/// Which fingerprint column of the store a query is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Primary,
    Mirrored,
}

/// Restricts which catalog entries take part in a store.
#[derive(Clone, Copy, Default)]
pub enum FaceFilter {
    /// Every entry with fingerprints
    #[default]
    Any,
    /// Entries with a known face count of at least `n`
    AtLeast(u32),
    /// Arbitrary predicate
    Custom(fn(&CatalogEntry) -> bool),
}

impl FaceFilter {
    pub fn accepts(&self, entry: &CatalogEntry) -> bool {
        match self {
            Self::Any => true,
            Self::AtLeast(n) => entry.faces.is_some_and(|faces| faces >= *n),
            Self::Custom(predicate) => predicate(entry),
        }
    }
}

impl fmt::Debug for FaceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for FaceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::AtLeast(n) => write!(f, "faces>={n}"),
            Self::Custom(_) => write!(f, "custom"),
        }
    }
}

/// In-memory columnar snapshot of catalog fingerprints.
#[derive(Debug, Clone)]
pub struct FingerprintStore {
    ids: Vec<CardId>,
    primary: Vec<Fingerprint>,
    mirrored: Vec<Fingerprint>,
}

impl FingerprintStore {
    /// Build the store from catalog entries passing `face_filter`.
    ///
    /// Entries without fingerprints are skipped. Fails with `EmptyCatalog`
    /// when no row survives.
    #[instrument(skip(entries), fields(filter = %face_filter))]
    pub fn load<'a, I>(entries: I, face_filter: FaceFilter) -> Result<Self>
    where
        I: IntoIterator<Item = &'a CatalogEntry>,
    {
        let mut ids = Vec::new();
        let mut primary = Vec::new();
        let mut mirrored = Vec::new();
        let mut unhashed = 0usize;

        for entry in entries {
            if !face_filter.accepts(entry) {
                continue;
            }
            let Some(pair) = entry.fingerprints else {
                unhashed += 1;
                continue;
            };
            ids.push(entry.id.clone());
            primary.push(pair.primary);
            mirrored.push(pair.mirrored);
        }

        if ids.is_empty() {
            return Err(CardError::EmptyCatalog {
                filter: face_filter.to_string(),
            });
        }

        info!(rows = ids.len(), unhashed, "Loaded fingerprint store");
        Ok(Self {
            ids,
            primary,
            mirrored,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Always false for a successfully loaded store.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[CardId] {
        &self.ids
    }

    fn column(&self, column: Column) -> &[Fingerprint] {
        match column {
            Column::Primary => &self.primary,
            Column::Mirrored => &self.mirrored,
        }
    }

    /// Hamming distance from `query` to every row of a column, in row order.
    pub fn distances(&self, query: Fingerprint, column: Column) -> Vec<(CardId, u32)> {
        self.ids
            .iter()
            .zip(self.column(column))
            .map(|(id, fp)| (id.clone(), query.hamming_distance(*fp)))
            .collect()
    }

    /// Distances against the primary (upright) fingerprints.
    pub fn distances_primary(&self, query: Fingerprint) -> Vec<(CardId, u32)> {
        self.distances(query, Column::Primary)
    }

    /// Distances against the mirrored (180° rotated) fingerprints.
    pub fn distances_mirrored(&self, query: Fingerprint) -> Vec<(CardId, u32)> {
        self.distances(query, Column::Mirrored)
    }

    /// Ids whose distance to `query` is strictly below `radius`, in row order.
    pub fn candidates(&self, query: Fingerprint, column: Column, radius: u32) -> Vec<CardId> {
        self.ids
            .iter()
            .zip(self.column(column))
            .filter(|(_, fp)| query.hamming_distance(**fp) < radius)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Number of rows strictly within `radius` of `query`.
    pub fn count_within(&self, query: Fingerprint, column: Column, radius: u32) -> usize {
        self.column(column)
            .iter()
            .filter(|fp| query.hamming_distance(**fp) < radius)
            .count()
    }

    /// Primary fingerprints shared by more than one card.
    pub fn collisions(&self) -> BTreeMap<Fingerprint, Vec<CardId>> {
        let mut groups: BTreeMap<Fingerprint, Vec<CardId>> = BTreeMap::new();
        for (id, fp) in self.ids.iter().zip(&self.primary) {
            groups.entry(*fp).or_default().push(id.clone());
        }
        groups.retain(|_, ids| ids.len() > 1);
        groups
    }
}
