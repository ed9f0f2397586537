use std::collections::{HashMap, VecDeque};

use crate::distribute::WaveKey;

pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// The key new content is sealed under.
    Current(String),
    /// A specific historical version.
    Version(String, u32),
}

/// Bounded map of unwrapped wave keys.
///
/// Eviction is insertion-ordered (oldest first), not LRU. A miss only costs a
/// re-fetch and re-decrypt. Owned by a single client context; mutation goes
/// through `&mut self`, so an invalidation is visible to every later read.
pub struct WaveKeyCache {
    capacity: usize,
    entries: HashMap<CacheKey, WaveKey>,
    order: VecDeque<CacheKey>,
}

impl Default for WaveKeyCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl WaveKeyCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace. Replacing keeps the entry's original position.
    pub fn insert(&mut self, key: CacheKey, wave_key: WaveKey) {
        if let Some(slot) = self.entries.get_mut(&key) {
            *slot = wave_key;
            return;
        }

        while self.entries.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }

        self.order.push_back(key.clone());
        self.entries.insert(key, wave_key);
    }

    pub fn get(&self, key: &CacheKey) -> Option<&WaveKey> {
        self.entries.get(key)
    }

    pub fn current(&self, wave_id: &str) -> Option<&WaveKey> {
        self.get(&CacheKey::Current(wave_id.to_string()))
    }

    pub fn version(&self, wave_id: &str, version: u32) -> Option<&WaveKey> {
        self.get(&CacheKey::Version(wave_id.to_string(), version))
    }

    /// Record `wave_key` as the wave's current key, also addressable by version.
    pub fn store_current(&mut self, wave_id: &str, wave_key: WaveKey) {
        self.insert(
            CacheKey::Version(wave_id.to_string(), wave_key.version()),
            wave_key.clone(),
        );
        self.insert(CacheKey::Current(wave_id.to_string()), wave_key);
    }

    pub fn invalidate(&mut self, key: &CacheKey) -> Option<WaveKey> {
        let removed = self.entries.remove(key)?;
        self.order.retain(|k| k != key);
        Some(removed)
    }

    /// Drop the current key and every historical version of one wave.
    pub fn invalidate_wave(&mut self, wave_id: &str) {
        let belongs = |k: &CacheKey| match k {
            CacheKey::Current(id) | CacheKey::Version(id, _) => id == wave_id,
        };
        self.entries.retain(|k, _| !belongs(k));
        self.order.retain(|k| !belongs(k));
    }

    /// Logout.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}
