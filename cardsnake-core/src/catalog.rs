//! Reference catalog of known cards.
//!
//! The catalog is the in-memory form of the reference collection: one
//! [`CatalogEntry`] per card, with fingerprints, descriptors and face counts
//! filled in by separate passes. It serializes to CBOR (compact, default) or
//! JSON (human readable) snapshots.
//!
//! The engine never reads the catalog directly. It consumes it through two
//! lookup traits, [`DescriptorSource`] and [`FingerprintSource`], so that a
//! database-backed source can replace it without touching the engine.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use tracing::{debug, info};

use crate::error::{CardError, Result};
use crate::features::Descriptor;
use crate::fingerprint::FingerprintPair;

/// Current snapshot format version.
pub const CATALOG_VERSION: u32 = 1;

/// Hex length of generated user card ids.
const USER_ID_HEX_LEN: usize = 40;

/// Separator between a user picture's base name and its variation number.
const VARIATION_MARK: &str = "|-(";

/// Stable, globally unique card identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(String);

impl CardId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CardId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for CardId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One card of the reference catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: CardId,
    /// Card name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Set code (e.g. "ISD", or "USER" for user pictures)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Picture path relative to the picture root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprints: Option<FingerprintPair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptors: Option<Vec<Descriptor>>,
    /// Number of faces detected in the picture
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faces: Option<u32>,
    /// Ids this entry would have collided with when it was added
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variations: Vec<CardId>,
}

impl CatalogEntry {
    pub fn new(id: impl Into<CardId>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_fingerprints(mut self, fingerprints: FingerprintPair) -> Self {
        self.fingerprints = Some(fingerprints);
        self
    }

    pub fn with_descriptors(mut self, descriptors: Vec<Descriptor>) -> Self {
        self.descriptors = Some(descriptors);
        self
    }

    pub fn with_faces(mut self, faces: u32) -> Self {
        self.faces = Some(faces);
        self
    }

    pub fn with_name(mut self, code: impl Into<String>, name: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self.name = Some(name.into());
        self
    }

    /// True while the descriptor pass has nothing usable for this entry.
    /// An empty set counts as missing.
    pub fn needs_descriptors(&self) -> bool {
        self.descriptors.as_ref().map_or(true, Vec::is_empty)
    }
}

/// Lookup of descriptor sets by card id.
///
/// May block (e.g. when backed by a database). `None` means the card has no
/// usable descriptors.
pub trait DescriptorSource {
    fn descriptors(&self, id: &CardId) -> Option<Vec<Descriptor>>;
}

/// Lookup of fingerprint pairs by card id.
pub trait FingerprintSource {
    fn fingerprints(&self, id: &CardId) -> Option<FingerprintPair>;
}

impl<F> DescriptorSource for F
where
    F: Fn(&CardId) -> Option<Vec<Descriptor>>,
{
    fn descriptors(&self, id: &CardId) -> Option<Vec<Descriptor>> {
        self(id)
    }
}

/// In-memory reference catalog, ordered by card id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub version: u32,
    entries: BTreeMap<CardId, CatalogEntry>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            version: CATALOG_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry, returning the previous one.
    pub fn insert(&mut self, entry: CatalogEntry) -> Option<CatalogEntry> {
        self.entries.insert(entry.id.clone(), entry)
    }

    pub fn get(&self, id: &CardId) -> Option<&CatalogEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &CardId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in id order.
    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }

    /// Fill in fingerprints. Existing values are kept unless `force` is set.
    ///
    /// Returns whether the entry changed.
    pub fn set_fingerprints(&mut self, id: &CardId, pair: FingerprintPair, force: bool) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) if force || entry.fingerprints.is_none() => {
                entry.fingerprints = Some(pair);
                true
            }
            _ => false,
        }
    }

    /// Fill in descriptors. Existing values are kept unless `force` is set.
    pub fn set_descriptors(
        &mut self,
        id: &CardId,
        descriptors: Vec<Descriptor>,
        force: bool,
    ) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) if force || entry.needs_descriptors() => {
                entry.descriptors = Some(descriptors);
                true
            }
            _ => false,
        }
    }

    /// Fill in the face count. Existing values are kept unless `force` is set.
    pub fn set_faces(&mut self, id: &CardId, faces: u32, force: bool) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) if force || entry.faces.is_none() => {
                entry.faces = Some(faces);
                true
            }
            _ => false,
        }
    }

    /// Ids still waiting for the fingerprint pass.
    pub fn missing_fingerprints(&self) -> Vec<CardId> {
        self.entries
            .values()
            .filter(|e| e.fingerprints.is_none())
            .map(|e| e.id.clone())
            .collect()
    }

    /// Ids still waiting for the descriptor pass.
    pub fn missing_descriptors(&self) -> Vec<CardId> {
        self.entries
            .values()
            .filter(|e| e.needs_descriptors())
            .map(|e| e.id.clone())
            .collect()
    }

    /// Ids still waiting for a face count.
    pub fn missing_faces(&self) -> Vec<CardId> {
        self.entries
            .values()
            .filter(|e| e.faces.is_none())
            .map(|e| e.id.clone())
            .collect()
    }

    /// Descriptors of a card, or `DescriptorUnavailable`.
    pub fn require_descriptors(&self, id: &CardId) -> Result<&[Descriptor]> {
        self.entries
            .get(id)
            .and_then(|e| e.descriptors.as_deref())
            .filter(|d| !d.is_empty())
            .ok_or_else(|| CardError::DescriptorUnavailable(id.clone()))
    }

    /// Add a user-supplied picture without any catalog context.
    ///
    /// The id is derived from `code` and `name`. When it collides with an
    /// existing entry the name gets a `|-(n)` variation suffix, and every id
    /// that collided is recorded in the new entry's `variations`.
    pub fn add_user_picture(
        &mut self,
        code: &str,
        name: &str,
        fingerprints: Option<FingerprintPair>,
        descriptors: Option<Vec<Descriptor>>,
    ) -> CardId {
        let base = base_name(name).to_string();
        let mut current = name.to_string();
        let mut next_number = 0u32;
        let mut brothers = Vec::new();

        loop {
            let id = user_card_id(code, &current);
            let Some(existing) = self.entries.get(&id) else {
                break;
            };

            let existing_number = existing
                .name
                .as_deref()
                .and_then(variation_number)
                .map_or(0, |n| n + 1);
            next_number = next_number.max(existing_number);
            current = format!("{base}{VARIATION_MARK}{next_number})");
            next_number += 1;
            brothers.push(id);
        }

        let id = user_card_id(code, &current);
        debug!(%id, name = %current, collisions = brothers.len(), "Adding user picture");

        let mut entry = CatalogEntry::new(id.clone()).with_name(code.to_uppercase(), current);
        entry.fingerprints = fingerprints;
        entry.descriptors = descriptors;
        entry.variations = brothers;
        self.insert(entry);
        id
    }

    /// Serialize the catalog to CBOR bytes.
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)
            .map_err(|e| CardError::SerializationError(e.to_string()))?;
        Ok(bytes)
    }

    /// Deserialize a catalog from CBOR bytes.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| CardError::SerializationError(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| CardError::SerializationError(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| CardError::SerializationError(e.to_string()))
    }

    /// Load a snapshot, trying CBOR first then JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;

        let catalog = if let Ok(catalog) = Self::from_cbor(&bytes) {
            debug!(format = "cbor", "Parsed catalog");
            catalog
        } else {
            let text = std::str::from_utf8(&bytes).map_err(|_| {
                CardError::SerializationError(
                    "Failed to parse catalog (tried CBOR and JSON)".into(),
                )
            })?;
            debug!(format = "json", "Parsed catalog");
            Self::from_json(text)?
        };

        info!(path = %path.display(), entries = catalog.len(), "Loaded catalog");
        Ok(catalog)
    }

    /// Save a snapshot: JSON for a `.json` extension, CBOR otherwise.
    pub fn save(&self, path: &Path) -> Result<()> {
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        if is_json {
            std::fs::write(path, self.to_json()?)?;
        } else {
            std::fs::write(path, self.to_cbor()?)?;
        }

        info!(path = %path.display(), entries = self.len(), json = is_json, "Saved catalog");
        Ok(())
    }
}

impl DescriptorSource for Catalog {
    fn descriptors(&self, id: &CardId) -> Option<Vec<Descriptor>> {
        self.entries.get(id).and_then(|e| e.descriptors.clone())
    }
}

impl FingerprintSource for Catalog {
    fn fingerprints(&self, id: &CardId) -> Option<FingerprintPair> {
        self.entries.get(id).and_then(|e| e.fingerprints)
    }
}

/// Id of a user picture: truncated hex SHA3-256 of code and name.
pub fn user_card_id(code: &str, name: &str) -> CardId {
    let mut hasher = Sha3_256::new();
    hasher.update(code.as_bytes());
    hasher.update(name.as_bytes());
    let mut id = hex::encode(hasher.finalize());
    id.truncate(USER_ID_HEX_LEN);
    CardId(id)
}

/// Name without its variation suffix.
fn base_name(name: &str) -> &str {
    name.split(VARIATION_MARK).next().unwrap_or(name)
}

/// Variation number of a `name|-(n)` style name.
fn variation_number(name: &str) -> Option<u32> {
    let (_, suffix) = name.rsplit_once(VARIATION_MARK)?;
    let digits = suffix.trim_end_matches(')');
    if digits.is_empty() {
        Some(0)
    } else {
        digits.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Fingerprint;

    fn pair(primary: u64, mirrored: u64) -> FingerprintPair {
        FingerprintPair::new(Fingerprint::new(primary), Fingerprint::new(mirrored))
    }

    fn sample_catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.insert(
            CatalogEntry::new("a")
                .with_fingerprints(pair(1, 2))
                .with_descriptors(vec![Descriptor::from_bits([1; 32])])
                .with_faces(1),
        );
        catalog.insert(CatalogEntry::new("b").with_fingerprints(pair(3, 4)));
        catalog.insert(CatalogEntry::new("c"));
        catalog
    }

    #[test]
    fn test_set_fields_only_fills_missing() {
        let mut catalog = sample_catalog();
        let a = CardId::from("a");

        assert!(!catalog.set_fingerprints(&a, pair(9, 9), false));
        assert_eq!(catalog.get(&a).unwrap().fingerprints, Some(pair(1, 2)));

        assert!(catalog.set_fingerprints(&a, pair(9, 9), true));
        assert_eq!(catalog.get(&a).unwrap().fingerprints, Some(pair(9, 9)));

        assert!(catalog.set_faces(&CardId::from("b"), 0, false));
        assert!(!catalog.set_faces(&CardId::from("missing"), 0, true));
    }

    #[test]
    fn test_empty_descriptor_set_is_refilled() {
        let mut catalog = sample_catalog();
        let c = CardId::from("c");
        assert!(catalog.set_descriptors(&c, Vec::new(), false));
        assert!(catalog.missing_descriptors().contains(&c));

        let fresh = vec![Descriptor::from_bits([7; 32])];
        assert!(catalog.set_descriptors(&c, fresh.clone(), false));
        assert_eq!(catalog.get(&c).unwrap().descriptors, Some(fresh));
        assert!(!catalog.missing_descriptors().contains(&c));
    }

    #[test]
    fn test_default_entry_has_empty_id() {
        let entry = CatalogEntry::default();
        assert_eq!(entry.id.as_str(), "");
        assert_eq!(CatalogEntry::new("x").id, CardId::from("x"));
    }

    #[test]
    fn test_missing_passes() {
        let catalog = sample_catalog();
        assert_eq!(catalog.missing_fingerprints(), vec![CardId::from("c")]);
        assert_eq!(
            catalog.missing_descriptors(),
            vec![CardId::from("b"), CardId::from("c")]
        );
        assert_eq!(
            catalog.missing_faces(),
            vec![CardId::from("b"), CardId::from("c")]
        );
    }

    #[test]
    fn test_require_descriptors() {
        let catalog = sample_catalog();
        assert_eq!(catalog.require_descriptors(&CardId::from("a")).unwrap().len(), 1);
        assert!(matches!(
            catalog.require_descriptors(&CardId::from("b")),
            Err(CardError::DescriptorUnavailable(id)) if id == CardId::from("b")
        ));
    }

    #[test]
    fn test_sources() {
        let catalog = sample_catalog();
        assert_eq!(
            FingerprintSource::fingerprints(&catalog, &CardId::from("b")),
            Some(pair(3, 4))
        );
        assert!(DescriptorSource::descriptors(&catalog, &CardId::from("c")).is_none());
    }

    #[test]
    fn test_cbor_roundtrip() {
        let catalog = sample_catalog();
        let bytes = catalog.to_cbor().unwrap();
        assert_eq!(Catalog::from_cbor(&bytes).unwrap(), catalog);
    }

    #[test]
    fn test_save_and_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = sample_catalog();

        let json_path = dir.path().join("cards.json");
        catalog.save(&json_path).unwrap();
        let text = std::fs::read_to_string(&json_path).unwrap();
        assert!(text.contains("\"version\""), "JSON snapshot should be readable");
        assert_eq!(Catalog::load(&json_path).unwrap(), catalog);

        let cbor_path = dir.path().join("cards.cbor");
        catalog.save(&cbor_path).unwrap();
        assert_eq!(Catalog::load(&cbor_path).unwrap(), catalog);
    }

    #[test]
    fn test_load_garbage_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.cbor");
        std::fs::write(&path, [0xFF, 0xFE, 0x00, 0x81]).unwrap();
        assert!(matches!(
            Catalog::load(&path),
            Err(CardError::SerializationError(_))
        ));
    }

    #[test]
    fn test_user_card_id_is_stable() {
        let a = user_card_id("USER", "my card");
        let b = user_card_id("USER", "my card");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), USER_ID_HEX_LEN);
        assert_ne!(a, user_card_id("USER", "other card"));
    }

    #[test]
    fn test_add_user_picture_collisions_get_variations() {
        let mut catalog = Catalog::new();

        let first = catalog.add_user_picture("USER", "shoebox", None, None);
        let second = catalog.add_user_picture("USER", "shoebox", None, None);
        let third = catalog.add_user_picture("USER", "shoebox", None, None);

        assert_eq!(catalog.len(), 3);
        assert_ne!(first, second);
        assert_ne!(second, third);

        let second_entry = catalog.get(&second).unwrap();
        assert_eq!(second_entry.name.as_deref(), Some("shoebox|-(0)"));
        assert_eq!(second_entry.variations, vec![first.clone()]);

        let third_entry = catalog.get(&third).unwrap();
        assert_eq!(third_entry.name.as_deref(), Some("shoebox|-(1)"));
        assert_eq!(third_entry.variations, vec![first, second]);
    }

    #[test]
    fn test_variation_number_parsing() {
        assert_eq!(variation_number("plain"), None);
        assert_eq!(variation_number("name|-(3)"), Some(3));
        assert_eq!(variation_number("name|-()"), Some(0));
        assert_eq!(base_name("name|-(3)"), "name");
    }
}
