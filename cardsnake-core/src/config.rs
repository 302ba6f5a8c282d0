//! Engine configuration
//!
//! Handles loading configuration from environment variables or a JSON file
//! with sensible defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CardError, Result};
use crate::fingerprint::{HashAlgorithm, DEFAULT_ART_RATIO};
use crate::search::SearchConfig;
use crate::verify::VerifyConfig;

/// Complete configuration of an [`Identifier`](crate::engine::Identifier).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Candidate search tuning
    pub search: SearchConfig,
    /// Descriptor verification tuning
    pub verify: VerifyConfig,
    /// Maximum number of cards in the match index (default: 40)
    pub index_capacity: usize,
    /// Art box height as a fraction of the region width (default: 0.80)
    pub art_ratio: f32,
    /// Fingerprint algorithm; must match the one the catalog was built with
    pub algorithm: HashAlgorithm,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            verify: VerifyConfig::default(),
            index_capacity: 40,
            art_ratio: DEFAULT_ART_RATIO,
            algorithm: HashAlgorithm::default(),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl EngineConfig {
    /// Load configuration from `CARDSNAKE_*` environment variables.
    ///
    /// Unset or unparsable variables fall back to the defaults.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `CARDSNAKE_*` environment variables on top of `self`.
    pub fn with_env_overrides(mut self) -> Self {
        self.search.default_radius = env_or("CARDSNAKE_DEFAULT_RADIUS", self.search.default_radius);
        self.search.min_candidates = env_or("CARDSNAKE_MIN_CANDIDATES", self.search.min_candidates);
        self.search.flip_threshold = env_or("CARDSNAKE_FLIP_THRESHOLD", self.search.flip_threshold);
        self.search.max_flips = env_or("CARDSNAKE_MAX_FLIPS", self.search.max_flips);
        self.verify.ratio = env_or("CARDSNAKE_RATIO", self.verify.ratio);
        self.verify.min_matches = env_or("CARDSNAKE_MIN_MATCHES", self.verify.min_matches);
        self.index_capacity = env_or("CARDSNAKE_INDEX_CAPACITY", self.index_capacity);
        self
    }

    /// Load configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| {
            CardError::ConfigError(format!("{}: {}", path.display(), e))
        })
    }

    /// Check every value for consistency.
    pub fn validate(&self) -> Result<()> {
        self.search.validate()?;
        self.verify.validate()?;
        if self.index_capacity == 0 {
            return Err(CardError::ConfigError(
                "index_capacity must be at least 1".into(),
            ));
        }
        if !(self.art_ratio > 0.0 && self.art_ratio <= 2.0) {
            return Err(CardError::ConfigError(format!(
                "art_ratio must be within (0, 2], got {}",
                self.art_ratio
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.search.default_radius, 6);
        assert_eq!(config.search.min_candidates, 4);
        assert_eq!(config.search.flip_threshold, 15);
        assert_eq!(config.search.max_flips, 3);
        assert_eq!(config.verify.min_matches, 10);
        assert!((config.verify.ratio - 0.83).abs() < f32::EPSILON);
        assert_eq!(config.index_capacity, 40);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        // Only this test touches these variables.
        std::env::set_var("CARDSNAKE_MIN_CANDIDATES", "7");
        std::env::set_var("CARDSNAKE_INDEX_CAPACITY", "not-a-number");
        let config = EngineConfig::from_env();
        std::env::remove_var("CARDSNAKE_MIN_CANDIDATES");
        std::env::remove_var("CARDSNAKE_INDEX_CAPACITY");

        assert_eq!(config.search.min_candidates, 7);
        assert_eq!(config.index_capacity, 40, "unparsable value falls back to default");
    }

    #[test]
    fn test_partial_json_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"index_capacity": 12, "search": {{"min_candidates": 2}}}}"#).unwrap();

        let config = EngineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.index_capacity, 12);
        assert_eq!(config.search.min_candidates, 2);
        assert_eq!(config.search.default_radius, 6);
        assert_eq!(config.verify, VerifyConfig::default());
    }

    #[test]
    fn test_bad_json_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            EngineConfig::from_json_file(file.path()),
            Err(CardError::ConfigError(_))
        ));
    }

    #[test]
    fn test_validate_rejects_nonsense() {
        let zero_capacity = EngineConfig {
            index_capacity: 0,
            ..EngineConfig::default()
        };
        assert!(zero_capacity.validate().is_err());

        let bad_ratio = EngineConfig {
            art_ratio: 0.0,
            ..EngineConfig::default()
        };
        assert!(bad_ratio.validate().is_err());

        let mut bad_verify = EngineConfig::default();
        bad_verify.verify.ratio = 0.0;
        assert!(bad_verify.validate().is_err());
    }
}
