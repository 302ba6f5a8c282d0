#![no_main]

//! Fuzz target for FingerprintStore + AdaptiveRadiusSearch
//!
//! The input is read as 8-byte big-endian fingerprints: the first two are the
//! query pair, the rest are catalog rows. Every search must terminate within
//! its flip budget and radius cap.
//!
//! Run with: cargo +nightly fuzz run fuzz_search

use cardsnake_core::{
    AdaptiveRadiusSearch, CatalogEntry, FaceFilter, Fingerprint, FingerprintPair,
    FingerprintStore, SearchConfig, SearchStrategy,
};
use libfuzzer_sys::fuzz_target;

fn fingerprints(data: &[u8]) -> Vec<Fingerprint> {
    data.chunks_exact(8)
        .map(|chunk| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(chunk);
            Fingerprint::new(u64::from_be_bytes(bytes))
        })
        .collect()
}

fuzz_target!(|data: &[u8]| {
    let fps = fingerprints(data);
    if fps.len() < 3 {
        return;
    }
    let query = FingerprintPair::new(fps[0], fps[1]);
    let entries: Vec<CatalogEntry> = fps[2..]
        .iter()
        .enumerate()
        .map(|(i, fp)| {
            CatalogEntry::new(format!("row-{i}"))
                .with_fingerprints(FingerprintPair::new(*fp, Fingerprint::new(fp.bits().rotate_left(7))))
        })
        .collect();
    let Ok(store) = FingerprintStore::load(&entries, FaceFilter::Any) else {
        return;
    };

    for strategy in [SearchStrategy::Adaptive, SearchStrategy::Vote] {
        let config = SearchConfig {
            strategy,
            ..SearchConfig::default()
        };
        let set = AdaptiveRadiusSearch::new(config.clone()).search(&store, query);
        assert!(set.flips <= config.max_flips.max(3));
        assert!(set.radius <= config.max_radius);
        assert!(set.len() <= store.len());
    }
});
