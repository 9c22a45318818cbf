use parking_lot::{Mutex, RwLock};
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

///
/// ExpiringStore
///
/// String-keyed store whose entries expire `expired` after their put.
/// Expired entries read as absent; a sweep dropping them runs on put at
/// most once per `interval`. Sweeps hand back the keys they dropped so
/// owners of secondary indexes can follow.
///

#[derive(Debug)]
pub struct ExpiringStore<V> {
    entries: RwLock<HashMap<String, Entry<V>>>,
    interval: Duration,
    expired: Duration,
    last_sweep: Mutex<Instant>,
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

impl<V: Clone> ExpiringStore<V> {
    #[must_use]
    pub fn new(interval: Duration, expired: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            interval,
            expired,
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Insert `value`; returns the keys of any sweep the put triggered.
    pub fn put(&self, key: impl Into<String>, value: V) -> Vec<String> {
        let now = Instant::now();
        let swept = self.maybe_sweep(now);

        self.entries.write().insert(
            key.into(),
            Entry {
                value,
                expires_at: now + self.expired,
            },
        );

        swept
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;

        (Instant::now() < entry.expires_at).then(|| entry.value.clone())
    }

    /// Remove `key`; true when a live entry was dropped.
    pub fn remove(&self, key: &str) -> bool {
        self.entries
            .write()
            .remove(key)
            .is_some_and(|entry| Instant::now() < entry.expires_at)
    }

    /// Drop every expired entry now, returning their keys.
    pub fn sweep(&self) -> Vec<String> {
        let now = Instant::now();
        *self.last_sweep.lock() = now;

        let mut entries = self.entries.write();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| now >= entry.expires_at)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.remove(key);
        }

        expired
    }

    /// Entries held, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    fn maybe_sweep(&self, now: Instant) -> Vec<String> {
        let due = {
            let last = self.last_sweep.lock();
            now.duration_since(*last) >= self.interval
        };
        if due { self.sweep() } else { Vec::new() }
    }
}
