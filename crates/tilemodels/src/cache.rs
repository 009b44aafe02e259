//! Bounded least-recently-used cache with an eviction hook.
//!
//! Recency is tracked with a monotonically increasing tick per access. The
//! entry with the smallest tick is evicted first when an insert takes the
//! cache over capacity.
//!
//! Only [`LruCache::get`] and [`LruCache::set`] refresh recency.
//! [`LruCache::peek`] and [`LruCache::peek_mut`] are for bookkeeping paths
//! (such as committing a finished fetch) that must not keep an entry alive.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    hash::Hash,
};

/// Hook invoked with each value leaving the cache through eviction or
/// replacement.
pub type DisposeHook<K, V> = Box<dyn FnMut(&K, &mut V) + Send>;

struct Slot<V> {
    value: V,
    tick: u64,
}

/// A bounded LRU map.
pub struct LruCache<K, V> {
    capacity: usize,
    entries: HashMap<K, Slot<V>>,
    /// Access order, oldest tick first.
    order: BTreeMap<u64, K>,
    tick: u64,
    on_dispose: Option<DisposeHook<K, V>>,
}

impl<K, V> fmt::Debug for LruCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCache")
            .field("capacity", &self.capacity)
            .field("len", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl<K: Clone + Eq + Hash, V> LruCache<K, V> {
    /// Create a cache holding at most `capacity` entries. A capacity of
    /// zero is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: BTreeMap::new(),
            tick: 0,
            on_dispose: None,
        }
    }

    /// Create a cache that runs `hook` on every evicted or replaced value.
    #[must_use]
    pub fn with_dispose_hook(
        capacity: usize,
        hook: impl FnMut(&K, &mut V) + Send + 'static,
    ) -> Self {
        let mut cache = Self::new(capacity);
        cache.on_dispose = Some(Box::new(hook));
        cache
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn dispose(&mut self, key: &K, value: &mut V) {
        if let Some(hook) = self.on_dispose.as_mut() {
            hook(key, value);
        }
    }

    /// Get an entry, marking it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&mut V> {
        let tick = self.next_tick();
        let slot = self.entries.get_mut(key)?;
        self.order.remove(&slot.tick);
        self.order.insert(tick, key.clone());
        slot.tick = tick;
        Some(&mut slot.value)
    }

    /// Get an entry without touching its recency.
    #[must_use]
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|slot| &slot.value)
    }

    /// Mutably get an entry without touching its recency.
    pub fn peek_mut(&mut self, key: &K) -> Option<&mut V> {
        self.entries.get_mut(key).map(|slot| &mut slot.value)
    }

    /// Check whether a key is present without touching its recency.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert an entry as most recently used.
    ///
    /// A value already stored under `key` is disposed and dropped. If the
    /// insert takes the cache over capacity, the least recently used entry
    /// is disposed and returned.
    pub fn set(&mut self, key: K, value: V) -> Option<(K, V)> {
        let tick = self.next_tick();
        if let Some(mut old) = self.entries.remove(&key) {
            self.order.remove(&old.tick);
            self.dispose(&key, &mut old.value);
        }
        self.order.insert(tick, key.clone());
        self.entries.insert(key, Slot { value, tick });

        if self.entries.len() > self.capacity {
            return self.evict_oldest();
        }
        None
    }

    fn evict_oldest(&mut self) -> Option<(K, V)> {
        let (_, key) = self.order.pop_first()?;
        let mut slot = self.entries.remove(&key)?;
        self.dispose(&key, &mut slot.value);
        Some((key, slot.value))
    }

    /// Remove an entry, running the dispose hook on it.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let mut slot = self.entries.remove(key)?;
        self.order.remove(&slot.tick);
        self.dispose(key, &mut slot.value);
        Some(slot.value)
    }

    /// Dispose and drop every entry.
    pub fn clear(&mut self) {
        let entries = std::mem::take(&mut self.entries);
        self.order.clear();
        for (key, mut slot) in entries {
            self.dispose(&key, &mut slot.value);
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Keys from least to most recently used.
    pub fn keys_by_recency(&self) -> impl Iterator<Item = &K> {
        self.order.values()
    }

    /// Mutable access to every value, in no particular order. Does not
    /// touch recency.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.entries.values_mut().map(|slot| &mut slot.value)
    }
}
