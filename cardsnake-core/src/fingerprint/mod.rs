//! Fixed-width visual fingerprints.
//!
//! A [`Fingerprint`] is a 64-bit summary of the coarse structure of a card's
//! art box. Two cards that look alike produce fingerprints with a small
//! Hamming distance, which makes the fingerprint a cheap first filter over a
//! catalog of thousands of entries.
//!
//! # Components
//!
//! - **Fingerprint / FingerprintPair**: the value types, with Hamming distance
//!   and hex encoding.
//! - **Perceptual hashing**: [`PerceptualHasher`] computes fingerprints from
//!   pixels (DCT or Blockhash based).

pub mod perceptual;

pub use perceptual::*;

use std::fmt;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::error::{CardError, Result};

/// Fingerprint size in bytes (64 bits).
pub const FINGERPRINT_SIZE: usize = 8;

/// Immutable 64-bit fingerprint compared through Hamming distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(u64);

impl Fingerprint {
    pub const fn new(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Number of differing bits between two fingerprints.
    #[inline]
    pub const fn hamming_distance(self, other: Fingerprint) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    /// Get the fingerprint as 16 lowercase hex digits.
    pub fn to_hex(self) -> String {
        hex::encode(self.0.to_be_bytes())
    }

    /// Parse a fingerprint from exactly 16 hex digits.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| CardError::InvalidFingerprint(format!("Invalid hex string: {}", e)))?;
        let bytes: [u8; FINGERPRINT_SIZE] = bytes.try_into().map_err(|b: Vec<u8>| {
            CardError::InvalidFingerprint(format!(
                "Expected {} bytes, got {}",
                FINGERPRINT_SIZE,
                b.len()
            ))
        })?;
        Ok(Self(u64::from_be_bytes(bytes)))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl From<u64> for Fingerprint {
    fn from(bits: u64) -> Self {
        Self(bits)
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.to_hex()
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = CardError;

    fn try_from(value: String) -> Result<Self> {
        Fingerprint::from_hex(&value)
    }
}

/// Compute the Hamming distance between two fingerprints.
#[inline]
pub fn hamming_distance(a: Fingerprint, b: Fingerprint) -> u32 {
    a.hamming_distance(b)
}

/// The two fingerprints kept for every catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FingerprintPair {
    /// Canonical (upright) orientation
    pub primary: Fingerprint,
    /// 180° rotated orientation
    pub mirrored: Fingerprint,
}

impl FingerprintPair {
    pub fn new(primary: Fingerprint, mirrored: Fingerprint) -> Self {
        Self { primary, mirrored }
    }
}

/// Computes fingerprints from image regions.
///
/// Implementations must be deterministic: identical pixels give identical
/// fingerprints.
pub trait FingerprintExtractor: Send + Sync {
    /// Fingerprint of the region as given.
    fn fingerprint(&self, region: &DynamicImage) -> Result<Fingerprint>;

    /// Fingerprints of the region and of its 180° rotation.
    fn fingerprint_pair(&self, region: &DynamicImage) -> Result<FingerprintPair> {
        let primary = self.fingerprint(region)?;
        let mirrored = self.fingerprint(&region.rotate180())?;
        Ok(FingerprintPair::new(primary, mirrored))
    }
}
