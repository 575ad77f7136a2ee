// caliper_core/src/measurement/cache.rs

use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};

use crate::measurement::point::MeasurementPoint;
use crate::measurement::result::{MeasurementKind, MeasurementMethod};

/// Identifies a measurement by its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: MeasurementKind,
    pub points_hash: u64,
    pub method: MeasurementMethod,
}

impl CacheKey {
    /// `extra` folds in scalar inputs that are not points (the 3D flag,
    /// volume dimensions, a plane distance).
    pub fn new(
        kind: MeasurementKind,
        points: &[MeasurementPoint],
        extra: &[u64],
        method: MeasurementMethod,
    ) -> Self {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        points.len().hash(&mut hasher);
        for p in points {
            p.hash_content(&mut hasher);
        }
        extra.hash(&mut hasher);
        Self {
            kind,
            points_hash: hasher.finish(),
            method,
        }
    }
}

/// A fixed-capacity map that evicts the least recently used entry.
///
/// Both `get` and `insert` count as a use. Recency is a monotonically
/// increasing tick; `order` maps each live tick back to its key, so the
/// oldest entry is always the first one in `order`.
#[derive(Debug, Clone)]
pub struct LruCache<K, V> {
    capacity: usize,
    tick: u64,
    entries: HashMap<K, (V, u64)>,
    order: BTreeMap<u64, K>,
}

impl<K: Eq + Hash + Clone, V: Clone> LruCache<K, V> {
    /// A capacity of 0 disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            tick: 0,
            entries: HashMap::with_capacity(capacity),
            order: BTreeMap::new(),
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        let tick = self.next_tick();
        let (value, last_used) = self.entries.get_mut(key)?;
        self.order.remove(last_used);
        *last_used = tick;
        self.order.insert(tick, key.clone());
        Some(value.clone())
    }

    /// Inserts or replaces `key`, returning the evicted key if the cache was full.
    pub fn insert(&mut self, key: K, value: V) -> Option<K> {
        if self.capacity == 0 {
            return None;
        }
        let tick = self.next_tick();

        if let Some((_, old_tick)) = self.entries.remove(&key) {
            self.order.remove(&old_tick);
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.order.pop_first().map(|(_, oldest)| {
                self.entries.remove(&oldest);
                oldest
            })
        } else {
            None
        };

        self.order.insert(tick, key.clone());
        self.entries.insert(key, (value, tick));
        evicted
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = LruCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        // Touch "a" so "b" becomes the oldest.
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.insert("c", 3), Some("b"));

        assert!(cache.contains(&"a"));
        assert!(!cache.contains(&"b"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn replacing_a_key_does_not_evict() {
        let mut cache = LruCache::new(2);
        cache.insert(1, "x");
        cache.insert(2, "y");
        assert_eq!(cache.insert(1, "z"), None);
        assert_eq!(cache.get(&1), Some("z"));
        assert_eq!(cache.insert(3, "w"), Some(2));
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let mut cache = LruCache::new(0);
        cache.insert(1, 1);
        assert!(cache.is_empty());
        assert_eq!(cache.get(&1), None);
    }

    #[test]
    fn clear_empties_the_cache() {
        let mut cache = LruCache::new(4);
        for i in 0..4 {
            cache.insert(i, i);
        }
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), 4);
    }

    #[test]
    fn keys_depend_on_point_content_and_extras() {
        let a = MeasurementPoint::from_pixel(0.0, 0.0).unwrap();
        let b = MeasurementPoint::from_pixel(10.0, 0.0).unwrap();
        let kind = MeasurementKind::Distance;
        let method = MeasurementMethod::Calibrated2d;

        let k1 = CacheKey::new(kind, &[a.clone(), b.clone()], &[0], method);
        let k2 = CacheKey::new(kind, &[a.clone(), b.clone()], &[0], method);
        let k3 = CacheKey::new(kind, &[a.clone(), b.clone()], &[1], method);
        let k4 = CacheKey::new(kind, &[b, a], &[0], method);
        assert_eq!(k1, k2);
        assert_ne!(k1, k3);
        assert_ne!(k1, k4);
    }
}
