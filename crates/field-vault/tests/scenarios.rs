//! Workload scenarios: list views and access patterns against a bounded cache.

mod support;

use std::sync::Arc;

use field_vault::{FieldError, FieldKey, FieldVault, MasterKey, MemoryBlobStore};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use support::{case_keys, description_for, seed, vault};

async fn seeded_vault(count: usize, capacity: usize) -> (FieldVault, Vec<FieldKey>) {
    let key = MasterKey::generate();
    let store = MemoryBlobStore::new();
    let keys = case_keys(count);
    seed(&key, &store, &keys).await;
    (vault(&key, Arc::new(store), capacity), keys)
}

async fn replay(vault: &FieldVault, keys: &[FieldKey], trace: &[usize]) -> f64 {
    let before = vault.metrics();
    for &i in trace {
        let value = vault.read_field(&keys[i]).await.unwrap();
        assert_eq!(value, description_for(&keys[i]));
    }
    vault.metrics().since(&before).hit_rate()
}

#[tokio::test]
async fn list_view_fits_default_capacity() {
    let (vault, keys) = seeded_vault(100, 100).await;

    let first = vault.read_fields(&keys).await;
    assert!(first.iter().all(Result::is_ok));
    let after_first = vault.metrics();
    assert_eq!(after_first.hits, 0);
    assert_eq!(after_first.misses, 100);
    assert_eq!(after_first.evictions, 0);
    assert_eq!(after_first.decrypts, 100);

    let second = vault.read_fields(&keys).await;
    assert!(second.iter().all(Result::is_ok));
    let delta = vault.metrics().since(&after_first);
    assert!(delta.hit_rate() >= 0.99, "hit rate {}", delta.hit_rate());
    assert_eq!(delta.decrypts, 0);
}

#[tokio::test]
async fn oversized_bulk_read_evicts_overflow() {
    let (vault, keys) = seeded_vault(200, 100).await;

    let results = vault.read_fields(&keys).await;
    assert!(results.iter().all(Result::is_ok));

    assert_eq!(vault.cache().len(), 100);
    assert_eq!(vault.metrics().evictions, 100);
}

#[tokio::test]
async fn oversized_sequential_reads_evict_overflow() {
    let (vault, keys) = seeded_vault(200, 100).await;

    for key in &keys {
        vault.read_field(key).await.unwrap();
    }

    assert_eq!(vault.cache().len(), 100);
    assert_eq!(vault.metrics().evictions, 100);
    // The most recent hundred survive.
    assert!(vault.cache().contains(&keys[199]));
    assert!(!vault.cache().contains(&keys[0]));
}

#[tokio::test]
async fn bulk_read_keeps_order_and_isolates_failures() {
    let (vault, mut keys) = seeded_vault(5, 10).await;
    let missing = FieldKey::new("case-missing", "description");
    keys.insert(2, missing.clone());

    // Warm one key so the result mixes hits and misses.
    vault.read_field(&keys[4]).await.unwrap();

    let results = vault.read_fields(&keys).await;
    assert_eq!(results.len(), keys.len());
    for (key, result) in keys.iter().zip(&results) {
        if *key == missing {
            assert_eq!(result, &Err(FieldError::NotFound(missing.clone())));
        } else {
            assert_eq!(result.as_ref().unwrap(), &description_for(key));
        }
    }
}

#[tokio::test]
async fn bulk_read_of_duplicate_keys_decrypts_once() {
    let (vault, keys) = seeded_vault(1, 10).await;
    let repeated = vec![keys[0].clone(); 8];

    let results = vault.read_fields(&repeated).await;
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(vault.metrics().decrypts, 1);
}

#[tokio::test]
async fn sequential_cycle_larger_than_capacity_never_hits() {
    let (vault, keys) = seeded_vault(500, 50).await;
    let trace: Vec<usize> = (0..5000).map(|n| n % keys.len()).collect();

    let rate = replay(&vault, &keys, &trace).await;
    assert_eq!(rate, 0.0);
}

#[tokio::test]
async fn uniform_access_hit_rate_tracks_capacity_ratio() {
    let (vault, keys) = seeded_vault(500, 50).await;
    let mut rng = StdRng::seed_from_u64(7);
    let trace: Vec<usize> = (0..5000).map(|_| rng.gen_range(0..keys.len())).collect();

    let rate = replay(&vault, &keys, &trace).await;
    assert!(rate < 0.2, "uniform hit rate {rate}");
}

#[tokio::test]
async fn hot_spot_access_mostly_hits() {
    let (vault, keys) = seeded_vault(500, 50).await;

    let mut rng = StdRng::seed_from_u64(7);
    let uniform: Vec<usize> = (0..5000).map(|_| rng.gen_range(0..keys.len())).collect();
    let uniform_rate = replay(&vault, &keys, &uniform).await;

    vault.cache().clear();
    let mut rng = StdRng::seed_from_u64(11);
    let hot: Vec<usize> = (0..5000)
        .map(|_| {
            if rng.gen_bool(0.9) {
                rng.gen_range(0..20)
            } else {
                rng.gen_range(0..keys.len())
            }
        })
        .collect();
    let hot_rate = replay(&vault, &keys, &hot).await;

    assert!(hot_rate > 0.8, "hot-spot hit rate {hot_rate}");
    assert!(hot_rate > uniform_rate + 0.5);
}
