// Copyright (c) 2025 Cloudflare, Inc.
// Licensed under the BSD-3-Clause license found in the LICENSE file or at https://opensource.org/licenses/BSD-3-Clause

//! Cache of chain verification results.
//!
//! Entries map a chain fingerprint to the leaf public key produced by a full
//! online verification. The fingerprint covers the verifier's
//! [`PolicyDigest`] as well as the chain, so verifiers with different trust
//! anchors or strictness never see each other's results. An entry is a miss
//! once its TTL elapses. At capacity, inserting a new chain evicts the entry
//! that expires soonest.

use crate::util::now_millis;
use byteorder::{BigEndian, WriteBytesExt};
use log::debug;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::{collections::HashMap, time::Duration};
use x509_util::PolicyDigest;

/// Default lifetime of a cached trust decision.
pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);

/// Default number of chains remembered.
pub const DEFAULT_MAX_SIZE: usize = 32;

/// SHA-256 over the policy digest and the chain, each certificate prefixed
/// with its 4-byte big-endian length so that different splits of the same
/// bytes differ.
pub type ChainFingerprint = [u8; 32];

struct CacheEntry {
    public_key: String,
    expires_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
}

/// A bounded, TTL-limited map from chain fingerprint to public key, shared
/// between verifiers behind an `Arc`.
pub struct TrustCache {
    ttl: Duration,
    max_size: usize,
    entries: Mutex<HashMap<ChainFingerprint, CacheEntry>>,
}

impl Default for TrustCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_SIZE)
    }
}

impl TrustCache {
    /// A `max_size` of zero disables caching.
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        Self {
            ttl,
            max_size,
            entries: Mutex::new(HashMap::with_capacity(max_size)),
        }
    }

    pub fn fingerprint(policy: &PolicyDigest, chain: &[Vec<u8>]) -> ChainFingerprint {
        let mut buf =
            Vec::with_capacity(policy.len() + chain.iter().map(|c| c.len() + 4).sum::<usize>());
        buf.extend_from_slice(policy);
        for cert in chain {
            // Infallible for Vec.
            let _ = buf.write_u32::<BigEndian>(u32::try_from(cert.len()).unwrap_or(u32::MAX));
            buf.extend_from_slice(cert);
        }
        Sha256::digest(&buf).into()
    }

    /// Returns the cached public key for `chain` as verified under `policy`,
    /// if present and unexpired.
    pub fn get(&self, policy: &PolicyDigest, chain: &[Vec<u8>]) -> Option<String> {
        self.get_at(policy, chain, now_millis())
    }

    /// Remembers `public_key` as the key `chain` verified to under `policy`.
    pub fn put(&self, policy: &PolicyDigest, chain: &[Vec<u8>], public_key: String) {
        self.put_at(policy, chain, public_key, now_millis());
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.lock().len(),
            max_size: self.max_size,
        }
    }

    fn get_at(&self, policy: &PolicyDigest, chain: &[Vec<u8>], now: u64) -> Option<String> {
        let fingerprint = Self::fingerprint(policy, chain);
        let mut entries = self.entries.lock();
        match entries.get(&fingerprint) {
            Some(entry) if entry.expires_at > now => Some(entry.public_key.clone()),
            Some(_) => {
                entries.remove(&fingerprint);
                None
            }
            None => None,
        }
    }

    fn put_at(&self, policy: &PolicyDigest, chain: &[Vec<u8>], public_key: String, now: u64) {
        if self.max_size == 0 {
            return;
        }
        let fingerprint = Self::fingerprint(policy, chain);
        let ttl_millis = u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX);
        let entry = CacheEntry {
            public_key,
            expires_at: now.saturating_add(ttl_millis),
        };

        let mut entries = self.entries.lock();
        if !entries.contains_key(&fingerprint) && entries.len() >= self.max_size {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.expires_at)
                .map(|(fingerprint, _)| *fingerprint)
            {
                debug!("trust cache full; evicting {}", hex::encode(&oldest[..4]));
                entries.remove(&oldest);
            }
        }
        entries.insert(fingerprint, entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(n: u8) -> Vec<Vec<u8>> {
        vec![vec![n; 8], vec![n; 16], vec![n; 32]]
    }

    const TTL: Duration = Duration::from_secs(60);
    const POLICY: PolicyDigest = [7; 32];

    #[test]
    fn test_put_then_get() {
        let cache = TrustCache::new(TTL, 4);
        assert_eq!(cache.get_at(&POLICY, &chain(1), 0), None);
        cache.put_at(&POLICY, &chain(1), "key-1".into(), 0);
        assert_eq!(cache.get_at(&POLICY, &chain(1), 1).as_deref(), Some("key-1"));
        assert_eq!(cache.get_at(&POLICY, &chain(2), 1), None);
    }

    #[test]
    fn test_expiry() {
        let cache = TrustCache::new(TTL, 4);
        cache.put_at(&POLICY, &chain(1), "key-1".into(), 1_000);
        assert!(cache.get_at(&POLICY, &chain(1), 60_999).is_some());
        assert_eq!(cache.get_at(&POLICY, &chain(1), 61_000), None);
        // Expired entries are dropped on lookup.
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn test_evicts_earliest_expiry() {
        let cache = TrustCache::new(TTL, 3);
        cache.put_at(&POLICY, &chain(1), "key-1".into(), 300);
        cache.put_at(&POLICY, &chain(2), "key-2".into(), 100);
        cache.put_at(&POLICY, &chain(3), "key-3".into(), 200);
        cache.put_at(&POLICY, &chain(4), "key-4".into(), 400);

        assert_eq!(cache.stats(), CacheStats { size: 3, max_size: 3 });
        assert_eq!(cache.get_at(&POLICY, &chain(2), 400), None);
        for n in [1, 3, 4] {
            assert!(cache.get_at(&POLICY, &chain(n), 400).is_some(), "chain {n} evicted");
        }
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let cache = TrustCache::new(TTL, 2);
        cache.put_at(&POLICY, &chain(1), "key-1".into(), 0);
        cache.put_at(&POLICY, &chain(2), "key-2".into(), 10);
        cache.put_at(&POLICY, &chain(1), "key-1b".into(), 20);
        assert_eq!(cache.stats().size, 2);
        assert_eq!(cache.get_at(&POLICY, &chain(1), 30).as_deref(), Some("key-1b"));
        assert!(cache.get_at(&POLICY, &chain(2), 30).is_some());
    }

    #[test]
    fn test_zero_capacity() {
        let cache = TrustCache::new(TTL, 0);
        cache.put_at(&POLICY, &chain(1), "key-1".into(), 0);
        assert_eq!(cache.get_at(&POLICY, &chain(1), 0), None);
        assert_eq!(cache.stats(), CacheStats { size: 0, max_size: 0 });
    }

    #[test]
    fn test_clear() {
        let cache = TrustCache::default();
        cache.put_at(&POLICY, &chain(1), "key-1".into(), 0);
        cache.put_at(&POLICY, &chain(2), "key-2".into(), 0);
        cache.clear();
        assert_eq!(cache.stats(), CacheStats { size: 0, max_size: DEFAULT_MAX_SIZE });
    }

    #[test]
    fn test_fingerprint_is_order_and_split_sensitive() {
        let a = vec![vec![1, 2], vec![3], vec![4]];
        let b = vec![vec![1], vec![2, 3], vec![4]];
        let c = vec![vec![4], vec![3], vec![1, 2]];
        let fingerprint = |chain: &[Vec<u8>]| TrustCache::fingerprint(&POLICY, chain);
        assert_eq!(fingerprint(&a), fingerprint(&a.clone()));
        assert_ne!(fingerprint(&a), fingerprint(&b));
        assert_ne!(fingerprint(&a), fingerprint(&c));
    }

    #[test]
    fn test_scoped_by_policy() {
        let other_policy = [8; 32];
        assert_ne!(
            TrustCache::fingerprint(&POLICY, &chain(1)),
            TrustCache::fingerprint(&other_policy, &chain(1))
        );

        let cache = TrustCache::new(TTL, 4);
        cache.put_at(&POLICY, &chain(1), "key-1".into(), 0);
        assert_eq!(cache.get_at(&other_policy, &chain(1), 1), None);
        assert_eq!(cache.get_at(&POLICY, &chain(1), 1).as_deref(), Some("key-1"));

        cache.put_at(&other_policy, &chain(1), "key-1b".into(), 2);
        assert_eq!(cache.stats().size, 2);
        assert_eq!(cache.get_at(&POLICY, &chain(1), 3).as_deref(), Some("key-1"));
    }

    #[test]
    fn test_concurrent_puts() {
        let cache = std::sync::Arc::new(TrustCache::new(TTL, 8));
        let handles: Vec<_> = (0..16u8)
            .map(|n| {
                let cache = cache.clone();
                std::thread::spawn(move || cache.put_at(&POLICY, &chain(n), format!("key-{n}"), u64::from(n)))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.stats().size, 8);
    }
}
