//! Thread-Safe Storage Engine with Expiry Support
//!
//! One `RwLock<HashMap>` guards the whole keyspace, so every `get` and `set`
//! is atomic with respect to every connection. Lock guards are scoped to a
//! single operation and are released on every exit path.
//!
//! ## Expiry
//!
//! An entry whose `expires_at` is at or before "now" is treated as absent,
//! whether or not it has been physically removed yet. Expired entries are
//! removed lazily on access, and optionally by the background
//! [`ExpirySweeper`](crate::storage::ExpirySweeper).
//!
//! "Now" comes from an injectable [`Clock`] so expiry can be tested without
//! sleeping.

use crate::storage::clock::{Clock, SystemClock};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime};

/// A stored value with an optional absolute expiry time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub value: Bytes,
    /// `None` means the entry never expires.
    pub expires_at: Option<SystemTime>,
}

impl Entry {
    /// Whether the entry is expired at `now`. Expiry is inclusive: an entry
    /// expiring exactly at `now` is already gone.
    #[inline]
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

/// Options accepted by [`StorageEngine::set`].
///
/// The default has no expiry, which also clears any expiry the key had
/// before.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Relative time-to-live, measured from the moment of the `set`.
    pub px: Option<Duration>,
}

impl SetOptions {
    /// Expire `ms` milliseconds after the `set`.
    pub fn px(ms: u64) -> Self {
        Self {
            px: Some(Duration::from_millis(ms)),
        }
    }
}

/// Counters reported by [`StorageEngine::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Entries physically present, including expired ones not yet removed.
    pub keys: u64,
    pub get_ops: u64,
    pub set_ops: u64,
    /// Entries removed because they expired.
    pub expired: u64,
}

/// The shared key-value store.
///
/// Wrap it in an `Arc` and hand a clone to each connection.
///
/// # Example
///
/// ```
/// use respite::storage::{SetOptions, StorageEngine};
/// use bytes::Bytes;
///
/// let engine = StorageEngine::new();
/// engine.set(Bytes::from("foo"), Bytes::from("bar"), SetOptions::default());
/// assert_eq!(engine.get(b"foo"), Some(Bytes::from("bar")));
///
/// engine.set(Bytes::from("gone"), Bytes::from("soon"), SetOptions::px(0));
/// assert_eq!(engine.get(b"gone"), None);
/// ```
pub struct StorageEngine {
    data: RwLock<HashMap<Bytes, Entry>>,
    clock: Arc<dyn Clock>,
    get_count: AtomicU64,
    set_count: AtomicU64,
    expired_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("keys", &self.len())
            .field("clock", &self.clock)
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates an empty store backed by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store that reads time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            clock,
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    // A writer that panicked mid-operation can only have left a fully
    // inserted or fully absent entry behind, so a poisoned map is still
    // consistent and other connections keep using it.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Bytes, Entry>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Bytes, Entry>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `value` under `key`, overwriting any previous value and expiry.
    ///
    /// With `SetOptions::px(ms)` the entry expires `ms` milliseconds from
    /// now; `px(0)` expires immediately. Without it the entry never expires.
    pub fn set(&self, key: Bytes, value: Bytes, options: SetOptions) {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        // An expiry past the end of representable time never arrives.
        let expires_at = options
            .px
            .and_then(|ttl| self.clock.now().checked_add(ttl));

        self.write().insert(key, Entry { value, expires_at });
    }

    /// Returns the value for `key`, or `None` if it was never set or has
    /// expired.
    ///
    /// An expired entry found here is removed (lazy expiry).
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let now = self.clock.now();

        {
            let data = self.read();
            match data.get(key) {
                Some(entry) if !entry.is_expired_at(now) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // The entry looked expired; take the write lock to drop it. Another
        // connection may have replaced it in between, so check again.
        let mut data = self.write();
        match data.get(key) {
            Some(entry) if entry.is_expired_at(now) => {
                data.remove(key);
                self.expired_count.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Returns the full entry for `key` if it is live.
    pub fn get_entry(&self, key: &[u8]) -> Option<Entry> {
        let now = self.clock.now();
        self.read()
            .get(key)
            .filter(|entry| !entry.is_expired_at(now))
            .cloned()
    }

    /// Removes every expired entry and returns how many were removed.
    pub fn cleanup_expired(&self) -> u64 {
        let now = self.clock.now();
        let mut data = self.write();

        let before = data.len();
        data.retain(|_, entry| !entry.is_expired_at(now));
        let removed = (before - data.len()) as u64;

        if removed > 0 {
            self.expired_count.fetch_add(removed, Ordering::Relaxed);
        }
        removed
    }

    /// Number of entries physically present, including expired entries that
    /// have not been removed yet.
    pub fn len(&self) -> u64 {
        self.read().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.len(),
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::clock::ManualClock;
    use std::thread;

    fn engine_with_clock() -> (StorageEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let engine = StorageEngine::with_clock(clock.clone());
        (engine, clock)
    }

    #[test]
    fn test_set_and_get() {
        let engine = StorageEngine::new();
        engine.set(Bytes::from("foo"), Bytes::from("bar"), SetOptions::default());
        assert_eq!(engine.get(b"foo"), Some(Bytes::from("bar")));
    }

    #[test]
    fn test_get_nonexistent() {
        let engine = StorageEngine::new();
        assert_eq!(engine.get(b"xxx"), None);
    }

    #[test]
    fn test_repeated_get_is_stable() {
        let engine = StorageEngine::new();
        engine.set(Bytes::from("k"), Bytes::from("v"), SetOptions::default());
        for _ in 0..5 {
            assert_eq!(engine.get(b"k"), Some(Bytes::from("v")));
        }
    }

    #[test]
    fn test_set_overwrites() {
        let engine = StorageEngine::new();
        engine.set(Bytes::from("k"), Bytes::from("v1"), SetOptions::default());
        engine.set(Bytes::from("k"), Bytes::from("v2"), SetOptions::default());
        assert_eq!(engine.get(b"k"), Some(Bytes::from("v2")));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_empty_key_and_value() {
        let engine = StorageEngine::new();
        engine.set(Bytes::new(), Bytes::new(), SetOptions::default());
        assert_eq!(engine.get(b""), Some(Bytes::new()));
    }

    #[test]
    fn test_expiry_boundary() {
        let (engine, clock) = engine_with_clock();
        engine.set(Bytes::from("hello"), Bytes::from("world"), SetOptions::px(100));

        clock.advance(Duration::from_millis(99));
        assert_eq!(engine.get(b"hello"), Some(Bytes::from("world")));

        clock.advance(Duration::from_millis(1));
        assert_eq!(engine.get(b"hello"), None);
        // Lazily removed on that access.
        assert_eq!(engine.len(), 0);
        assert_eq!(engine.stats().expired, 1);
    }

    #[test]
    fn test_px_zero_expires_immediately() {
        let (engine, _clock) = engine_with_clock();
        engine.set(Bytes::from("k"), Bytes::from("v"), SetOptions::px(0));
        assert_eq!(engine.get(b"k"), None);
    }

    #[test]
    fn test_overwrite_clears_expiry() {
        let (engine, clock) = engine_with_clock();
        engine.set(Bytes::from("k"), Bytes::from("v1"), SetOptions::px(100));
        engine.set(Bytes::from("k"), Bytes::from("v2"), SetOptions::default());

        clock.advance(Duration::from_millis(150));
        assert_eq!(engine.get(b"k"), Some(Bytes::from("v2")));
        assert_eq!(engine.get_entry(b"k").unwrap().expires_at, None);
    }

    #[test]
    fn test_overwrite_with_new_expiry() {
        let (engine, clock) = engine_with_clock();
        engine.set(Bytes::from("k"), Bytes::from("v1"), SetOptions::default());
        engine.set(Bytes::from("k"), Bytes::from("v2"), SetOptions::px(10));

        clock.advance(Duration::from_millis(10));
        assert_eq!(engine.get(b"k"), None);
    }

    #[test]
    fn test_huge_px_never_expires() {
        let (engine, clock) = engine_with_clock();
        engine.set(Bytes::from("k"), Bytes::from("v"), SetOptions::px(u64::MAX));
        clock.advance(Duration::from_secs(10 * 365 * 24 * 3600));
        assert_eq!(engine.get(b"k"), Some(Bytes::from("v")));
    }

    #[test]
    fn test_get_entry_hides_expired() {
        let (engine, clock) = engine_with_clock();
        engine.set(Bytes::from("k"), Bytes::from("v"), SetOptions::px(5));
        assert!(engine.get_entry(b"k").is_some());

        clock.advance(Duration::from_millis(5));
        assert!(engine.get_entry(b"k").is_none());
        // get_entry does not remove anything.
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_cleanup_expired() {
        let (engine, clock) = engine_with_clock();
        for i in 0..10 {
            engine.set(
                Bytes::from(format!("temp{}", i)),
                Bytes::from("v"),
                SetOptions::px(50),
            );
        }
        engine.set(Bytes::from("persistent"), Bytes::from("v"), SetOptions::default());
        assert_eq!(engine.len(), 11);

        assert_eq!(engine.cleanup_expired(), 0);

        clock.advance(Duration::from_millis(50));
        assert_eq!(engine.cleanup_expired(), 10);
        assert_eq!(engine.len(), 1);
        assert!(!engine.is_empty());
        assert_eq!(engine.stats().expired, 10);
    }

    #[test]
    fn test_stats() {
        let engine = StorageEngine::new();
        engine.set(Bytes::from("a"), Bytes::from("1"), SetOptions::default());
        engine.set(Bytes::from("b"), Bytes::from("2"), SetOptions::default());
        engine.get(b"a");
        engine.get(b"missing");

        assert_eq!(
            engine.stats(),
            StorageStats {
                keys: 2,
                get_ops: 2,
                set_ops: 2,
                expired: 0,
            }
        );
    }

    #[test]
    fn test_concurrent_access() {
        let engine = Arc::new(StorageEngine::new());
        let mut handles = vec![];

        for t in 0..8 {
            let engine = Arc::clone(&engine);
            handles.push(thread::spawn(move || {
                for i in 0..500 {
                    let key = Bytes::from(format!("key:{}:{}", t, i));
                    let value = Bytes::from(format!("value:{}", i));
                    engine.set(key.clone(), value.clone(), SetOptions::default());
                    assert_eq!(engine.get(&key), Some(value));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(engine.len(), 8 * 500);
    }

    #[test]
    fn test_concurrent_writers_never_tear_values() {
        let engine = Arc::new(StorageEngine::new());
        let writers: Vec<_> = (0..4)
            .map(|t| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    let value = Bytes::from(vec![b'a' + t as u8; 64]);
                    for _ in 0..1000 {
                        engine.set(Bytes::from("shared"), value.clone(), SetOptions::default());
                    }
                })
            })
            .collect();

        for _ in 0..1000 {
            if let Some(value) = engine.get(b"shared") {
                assert_eq!(value.len(), 64);
                assert!(value.iter().all(|b| *b == value[0]));
            }
        }

        for writer in writers {
            writer.join().unwrap();
        }
    }
}
