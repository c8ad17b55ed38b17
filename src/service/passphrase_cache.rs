//! In-memory passphrase cache with per-entry expiration.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use zeroize::{Zeroize, Zeroizing};

use crate::types::Fingerprint;

struct CacheEntry {
    passphrase: Vec<u8>,
    /// Fixed at insert time; a later TTL change does not move it.
    deadline: Instant,
}

impl Drop for CacheEntry {
    fn drop(&mut self) {
        self.passphrase.zeroize();
    }
}

/// Caches passphrases by fingerprint, bounded by a TTL.
///
/// `get` is self-pruning: the access that observes an expired entry
/// removes it.
pub struct PassphraseCache {
    entries: HashMap<Fingerprint, CacheEntry>,
    ttl: Duration,
}

impl PassphraseCache {
    #[must_use]
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            entries: HashMap::new(),
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    /// Cache a passphrase. The deadline is the current TTL from now.
    pub fn store(&mut self, fingerprint: &Fingerprint, passphrase: &[u8]) {
        self.entries.insert(
            fingerprint.clone(),
            CacheEntry {
                passphrase: passphrase.to_vec(),
                deadline: Instant::now() + self.ttl,
            },
        );
    }

    /// Fetch a cached passphrase, pruning it if it has expired.
    pub fn get(&mut self, fingerprint: &Fingerprint) -> Option<Zeroizing<Vec<u8>>> {
        let expired = self
            .entries
            .get(fingerprint)
            .is_some_and(|entry| Instant::now() >= entry.deadline);
        if expired {
            self.entries.remove(fingerprint);
            return None;
        }
        self.entries
            .get(fingerprint)
            .map(|entry| Zeroizing::new(entry.passphrase.clone()))
    }

    /// Drop the entry for one fingerprint.
    pub fn remove(&mut self, fingerprint: &Fingerprint) {
        self.entries.remove(fingerprint);
    }

    /// Drop everything.
    pub fn clear_all(&mut self) {
        self.entries.clear();
    }

    /// Change the TTL for future inserts. Existing entries keep their
    /// original deadline.
    pub fn set_ttl(&mut self, ttl_secs: u64) {
        self.ttl = Duration::from_secs(ttl_secs);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Drop for PassphraseCache {
    fn drop(&mut self) {
        self.clear_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp() -> Fingerprint {
        Fingerprint::parse("0123456789ABCDEF0123456789ABCDEF01234567").unwrap()
    }

    #[test]
    fn store_and_get() {
        let mut cache = PassphraseCache::new(600);
        cache.store(&fp(), b"pw-123");
        assert_eq!(cache.get(&fp()).unwrap().as_slice(), b"pw-123");
    }

    #[test]
    fn expired_entry_is_pruned_on_access() {
        let mut cache = PassphraseCache::new(0);
        cache.store(&fp(), b"pw-123");
        assert!(cache.get(&fp()).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn ttl_change_spares_existing_entries() {
        let mut cache = PassphraseCache::new(600);
        cache.store(&fp(), b"pw-123");
        cache.set_ttl(0);
        // The old entry keeps its original deadline.
        assert!(cache.get(&fp()).is_some());
    }

    #[test]
    fn remove_and_clear() {
        let mut cache = PassphraseCache::new(600);
        cache.store(&fp(), b"pw-123");
        cache.remove(&fp());
        assert!(cache.get(&fp()).is_none());

        cache.store(&fp(), b"pw-123");
        cache.clear_all();
        assert!(cache.is_empty());
    }
}
