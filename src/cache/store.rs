//! TTL cache store
//!
//! Freshness policy over a pluggable backend. Every failure here degrades
//! silently: a failed write is logged and dropped, an unreadable entry reads as
//! absent. Nothing in this module can make a fetch fail.

use super::backend::CacheBackend;
use crate::clock::Clock;
use crate::metrics;
use crate::sheet::{CacheKey, FieldValues};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default freshness TTL: 1 hour
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Default retention ceiling for sweeps: 24 hours
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Persisted form of a cache entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Decoded field → value mapping
    pub values: FieldValues,
    /// When the entry was written
    pub cached_at: DateTime<Utc>,
    /// Freshness TTL in effect when written
    pub ttl_secs: u64,
}

impl CacheEntry {
    pub fn new(values: FieldValues, cached_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            values,
            cached_at,
            ttl_secs: ttl.as_secs(),
        }
    }

    /// Age relative to `now`; entries stamped in the future count as age zero
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.cached_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.age(now) <= Duration::from_secs(self.ttl_secs)
    }
}

/// A cache lookup result, returned regardless of freshness
#[derive(Debug, Clone, PartialEq)]
pub struct CachedValue {
    pub values: FieldValues,
    pub cached_at: DateTime<Utc>,
    pub age: Duration,
    pub fresh: bool,
}

/// Which entries `clear` removes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearScope {
    /// One (sheet, category) entry
    Key(CacheKey),
    /// Every category cached for one sheet
    Sheet(String),
    /// Everything
    All,
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub fresh: usize,
    pub stale: usize,
    pub unreadable: usize,
}

/// What a backend read turned up
enum Lookup {
    Found(CacheEntry),
    Absent,
    /// Stored bytes that no longer decode
    Corrupt,
    /// The backend failed to answer
    Unavailable,
}

/// TTL cache over a backing store
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    /// Serializes writes, clears and sweeps
    write_lock: Mutex<()>,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            backend,
            clock,
            ttl,
            write_lock: Mutex::new(()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current time on the store's clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn lookup(&self, storage_key: &str) -> Lookup {
        let bytes = match self.backend.read(storage_key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Lookup::Absent,
            Err(e) => {
                tracing::warn!(key = storage_key, error = %e, "Cache read failed, treating as miss");
                metrics::record_cache_error("read");
                return Lookup::Unavailable;
            }
        };

        match serde_json::from_slice::<CacheEntry>(&bytes) {
            Ok(entry) => Lookup::Found(entry),
            Err(e) => {
                tracing::warn!(key = storage_key, error = %e, "Corrupt cache entry, treating as miss");
                metrics::record_cache_error("decode");
                Lookup::Corrupt
            }
        }
    }

    fn read_entry(&self, storage_key: &str) -> Option<CacheEntry> {
        match self.lookup(storage_key) {
            Lookup::Found(entry) => Some(entry),
            Lookup::Absent | Lookup::Corrupt | Lookup::Unavailable => None,
        }
    }

    /// Look up an entry regardless of freshness
    pub fn get(&self, key: &CacheKey) -> Option<CachedValue> {
        let entry = self.read_entry(&key.storage_key())?;
        let now = self.clock.now();
        Some(CachedValue {
            age: entry.age(now),
            fresh: entry.is_fresh(now),
            cached_at: entry.cached_at,
            values: entry.values,
        })
    }

    /// True iff an entry exists and its age is within its TTL
    pub fn is_fresh(&self, key: &CacheKey) -> bool {
        self.read_entry(&key.storage_key())
            .is_some_and(|entry| entry.is_fresh(self.clock.now()))
    }

    /// Write (or overwrite) the entry for `key`, stamped with the current time.
    ///
    /// Returns whether the write reached the backend. Callers on the fetch path
    /// ignore the result.
    pub fn put(&self, key: &CacheKey, values: &FieldValues) -> bool {
        let entry = CacheEntry::new(values.clone(), self.clock.now(), self.ttl);
        let bytes = match serde_json::to_vec(&entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to serialize cache entry");
                metrics::record_cache_error("encode");
                return false;
            }
        };

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        match self.backend.write(&key.storage_key(), &bytes) {
            Ok(()) => {
                tracing::debug!(key = %key, fields = values.len(), "Cache entry written");
                true
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache write failed, continuing without persisting");
                metrics::record_cache_error("write");
                false
            }
        }
    }

    /// Remove entries immediately. Returns how many were removed.
    pub fn clear(&self, scope: &ClearScope) -> usize {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let targets: Vec<String> = match scope {
            ClearScope::Key(key) => vec![key.storage_key()],
            ClearScope::Sheet(_) | ClearScope::All => match self.backend.list_keys() {
                Ok(keys) => keys
                    .into_iter()
                    .filter(|raw| match scope {
                        ClearScope::Sheet(sheet) => {
                            CacheKey::parse(raw).is_some_and(|k| &k.sheet == sheet)
                        }
                        _ => true,
                    })
                    .collect(),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to list cache keys");
                    metrics::record_cache_error("list");
                    return 0;
                }
            },
        };

        let mut removed = 0;
        for raw in &targets {
            let existed = matches!(self.backend.read(raw), Ok(Some(_)));
            match self.backend.delete(raw) {
                Ok(()) if existed => removed += 1,
                Ok(()) => {}
                Err(e) => {
                    tracing::warn!(key = raw.as_str(), error = %e, "Failed to delete cache entry");
                    metrics::record_cache_error("delete");
                }
            }
        }

        tracing::info!(scope = ?scope, removed, "Cache cleared");
        removed
    }

    /// Remove entries older than `retention`. Stale entries within the ceiling
    /// are kept as fallback material. Corrupt entries are removed too; keys the
    /// backend fails to read are left for the next sweep.
    pub fn sweep(&self, retention: Duration) -> usize {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let keys = match self.backend.list_keys() {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list cache keys for sweep");
                metrics::record_cache_error("list");
                return 0;
            }
        };

        let now = self.clock.now();
        let mut removed = 0;
        for raw in keys {
            let expired = match self.lookup(&raw) {
                Lookup::Found(entry) => entry.age(now) > retention,
                Lookup::Corrupt => true,
                Lookup::Absent | Lookup::Unavailable => false,
            };
            if !expired {
                continue;
            }
            match self.backend.delete(&raw) {
                Ok(()) => {
                    tracing::debug!(key = raw.as_str(), "Swept cache entry");
                    removed += 1;
                }
                Err(e) => {
                    tracing::warn!(key = raw.as_str(), error = %e, "Failed to sweep cache entry");
                    metrics::record_cache_error("delete");
                }
            }
        }

        if removed > 0 {
            tracing::info!(removed, retention_secs = retention.as_secs(), "Cache sweep complete");
        }
        removed
    }

    /// Count entries by freshness
    pub fn stats(&self) -> CacheStats {
        let keys = match self.backend.list_keys() {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list cache keys for stats");
                return CacheStats::default();
            }
        };

        let now = self.clock.now();
        let mut stats = CacheStats {
            entries: keys.len(),
            ..Default::default()
        };
        for raw in keys {
            match self.read_entry(&raw) {
                Some(entry) if entry.is_fresh(now) => stats.fresh += 1,
                Some(_) => stats.stale += 1,
                None => stats.unreadable += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend::{BackendError, BackendResult};
    use crate::cache::MemoryBackend;
    use crate::clock::ManualClock;
    use crate::sheet::{Category, FieldValue};

    fn values(n: f64) -> FieldValues {
        let mut v = FieldValues::new();
        v.insert("total_deals".to_string(), FieldValue::Number(n));
        v
    }

    fn store() -> (Arc<MemoryBackend>, Arc<ManualClock>, CacheStore) {
        let backend = Arc::new(MemoryBackend::new());
        let clock = Arc::new(ManualClock::at_epoch());
        let store = CacheStore::new(backend.clone(), clock.clone(), DEFAULT_TTL);
        (backend, clock, store)
    }

    /// Backend whose every operation fails
    struct BrokenBackend;

    impl CacheBackend for BrokenBackend {
        fn read(&self, _key: &str) -> BackendResult<Option<Vec<u8>>> {
            Err(BackendError::Storage("disk on fire".to_string()))
        }
        fn write(&self, _key: &str, _bytes: &[u8]) -> BackendResult<()> {
            Err(BackendError::Storage("disk on fire".to_string()))
        }
        fn list_keys(&self) -> BackendResult<Vec<String>> {
            Err(BackendError::Storage("disk on fire".to_string()))
        }
        fn delete(&self, _key: &str) -> BackendResult<()> {
            Err(BackendError::Storage("disk on fire".to_string()))
        }
    }

    #[test]
    fn test_get_absent() {
        let (_, _, store) = store();
        let key = CacheKey::new("vip_my", Category::Vip);
        assert!(store.get(&key).is_none());
        assert!(!store.is_fresh(&key));
    }

    #[test]
    fn test_put_then_fresh_then_stale() {
        let (_, clock, store) = store();
        let key = CacheKey::new("vip_my", Category::Vip);

        assert!(store.put(&key, &values(10.0)));
        assert!(store.is_fresh(&key));

        clock.advance(Duration::from_secs(3600));
        assert!(store.is_fresh(&key), "age == TTL is still fresh");

        clock.advance(Duration::from_secs(1));
        assert!(!store.is_fresh(&key));

        let cached = store.get(&key).unwrap();
        assert!(!cached.fresh);
        assert_eq!(cached.age, Duration::from_secs(3601));
        assert_eq!(cached.values, values(10.0));
    }

    #[test]
    fn test_put_overwrites_and_restamps() {
        let (_, clock, store) = store();
        let key = CacheKey::new("vip_my", Category::Vip);

        store.put(&key, &values(1.0));
        clock.advance(Duration::from_secs(5000));
        store.put(&key, &values(2.0));

        let cached = store.get(&key).unwrap();
        assert!(cached.fresh);
        assert_eq!(cached.age, Duration::ZERO);
        assert_eq!(cached.values, values(2.0));
    }

    #[test]
    fn test_corrupt_entry_reads_as_absent() {
        let (backend, _, store) = store();
        let key = CacheKey::new("vip_my", Category::Vip);
        backend.write(&key.storage_key(), b"{not json").unwrap();

        assert!(store.get(&key).is_none());
        assert!(!store.is_fresh(&key));
        assert_eq!(store.stats().unreadable, 1);
    }

    #[test]
    fn test_broken_backend_degrades_silently() {
        let store = CacheStore::new(
            Arc::new(BrokenBackend),
            Arc::new(ManualClock::at_epoch()),
            DEFAULT_TTL,
        );
        let key = CacheKey::new("vip_my", Category::Vip);

        assert!(!store.put(&key, &values(1.0)));
        assert!(store.get(&key).is_none());
        assert_eq!(store.clear(&ClearScope::All), 0);
        assert_eq!(store.sweep(DEFAULT_RETENTION), 0);
        assert_eq!(store.stats(), CacheStats::default());
    }

    #[test]
    fn test_clear_scopes() {
        let (_, _, store) = store();
        let vip = CacheKey::new("my", Category::Vip);
        let membership = CacheKey::new("my", Category::Membership);
        let other = CacheKey::new("ph", Category::Vip);
        for key in [&vip, &membership, &other] {
            store.put(key, &values(1.0));
        }

        assert_eq!(store.clear(&ClearScope::Key(vip.clone())), 1);
        assert_eq!(store.clear(&ClearScope::Key(vip.clone())), 0);
        assert_eq!(store.clear(&ClearScope::Sheet("my".to_string())), 1);
        assert!(store.get(&other).is_some());
        assert_eq!(store.clear(&ClearScope::All), 1);
        assert_eq!(store.stats().entries, 0);
    }

    #[test]
    fn test_sweep_keeps_stale_within_retention() {
        let (backend, clock, store) = store();
        let old = CacheKey::new("old", Category::Vip);
        let stale = CacheKey::new("stale", Category::Vip);

        store.put(&old, &values(1.0));
        clock.advance(Duration::from_secs(20 * 3600));
        store.put(&stale, &values(2.0));
        clock.advance(Duration::from_secs(5 * 3600));
        backend.write("garbage", b"???").unwrap();

        // old is 25h, stale is 5h (past TTL, inside retention)
        assert_eq!(store.sweep(DEFAULT_RETENTION), 2);
        assert!(store.get(&old).is_none());

        let kept = store.get(&stale).unwrap();
        assert!(!kept.fresh);
        assert_eq!(kept.values, values(2.0));
    }

    /// Memory backend whose reads can be made to fail
    #[derive(Default)]
    struct FlakyBackend {
        inner: MemoryBackend,
        fail_reads: std::sync::atomic::AtomicBool,
    }

    impl FlakyBackend {
        fn set_failing(&self, failing: bool) {
            self.fail_reads
                .store(failing, std::sync::atomic::Ordering::SeqCst);
        }
    }

    impl CacheBackend for FlakyBackend {
        fn read(&self, key: &str) -> BackendResult<Option<Vec<u8>>> {
            if self.fail_reads.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(BackendError::Storage("i/o timeout".to_string()));
            }
            self.inner.read(key)
        }
        fn write(&self, key: &str, bytes: &[u8]) -> BackendResult<()> {
            self.inner.write(key, bytes)
        }
        fn list_keys(&self) -> BackendResult<Vec<String>> {
            self.inner.list_keys()
        }
        fn delete(&self, key: &str) -> BackendResult<()> {
            self.inner.delete(key)
        }
    }

    #[test]
    fn test_sweep_skips_entries_it_cannot_read() {
        let backend = Arc::new(FlakyBackend::default());
        let clock = Arc::new(ManualClock::at_epoch());
        let store = CacheStore::new(backend.clone(), clock.clone(), DEFAULT_TTL);
        let key = CacheKey::new("vip_my", Category::Vip);

        store.put(&key, &values(3.0));
        clock.advance(Duration::from_secs(2 * 3600));

        backend.set_failing(true);
        assert_eq!(store.sweep(DEFAULT_RETENTION), 0);

        backend.set_failing(false);
        let kept = store.get(&key).expect("fallback entry survives a failed read");
        assert_eq!(kept.values, values(3.0));
    }

    #[test]
    fn test_stats() {
        let (_, clock, store) = store();
        store.put(&CacheKey::new("a", Category::Vip), &values(1.0));
        clock.advance(Duration::from_secs(7200));
        store.put(&CacheKey::new("b", Category::Vip), &values(1.0));

        let stats = store.stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.fresh, 1);
        assert_eq!(stats.stale, 1);
    }

    #[test]
    fn test_future_stamped_entry_counts_as_fresh() {
        let entry = CacheEntry::new(values(1.0), Utc::now(), DEFAULT_TTL);
        let earlier = Utc::now() - chrono::Duration::seconds(60);
        assert_eq!(entry.age(earlier), Duration::ZERO);
        assert!(entry.is_fresh(earlier));
    }
}
