//! Per-branch memoization of fact reads.
//!
//! A [`FactCache`] maps (entity, key, query coordinate) to the value a cold
//! journal read returned. It is derived state: dropping it never changes a
//! read result. Entries are invalidated, never updated: an append at
//! coordinate C drops the (entity, key) results cached at C or later, and
//! everything cached before C stays valid forever.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use almanac_types::{Coord, EntityId, Value};

/// Hit/miss counters for one branch cache.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Reads answered from the cache.
    pub hits: u64,
    /// Reads that fell through to the journal.
    pub misses: u64,
    /// Results currently held.
    pub entries: usize,
}

/// Cached read results for one branch.
#[derive(Debug, Default)]
pub struct FactCache {
    results: HashMap<EntityId, HashMap<String, BTreeMap<Coord, Option<Value>>>>,
    entries: usize,
    hits: u64,
    misses: u64,
}

impl FactCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached results.
    pub const fn len(&self) -> usize {
        self.entries
    }

    /// Whether nothing is cached.
    pub const fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Current counters.
    pub const fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries,
        }
    }

    /// Return the cached result for (entity, key, at), or run `compute` and
    /// cache what it returns. Errors are not cached.
    pub fn get_or_compute<E>(
        &mut self,
        entity: &EntityId,
        key: &str,
        at: Coord,
        compute: impl FnOnce() -> Result<Option<Value>, E>,
    ) -> Result<Option<Value>, E> {
        if let Some(hit) = self
            .results
            .get(entity)
            .and_then(|keys| keys.get(key))
            .and_then(|points| points.get(&at))
        {
            self.hits = self.hits.saturating_add(1);
            return Ok(hit.clone());
        }
        self.misses = self.misses.saturating_add(1);
        let value = compute()?;
        let previous = self
            .results
            .entry(entity.clone())
            .or_default()
            .entry(key.to_owned())
            .or_default()
            .insert(at, value.clone());
        if previous.is_none() {
            self.entries = self.entries.saturating_add(1);
        }
        Ok(value)
    }

    /// Drop cached results for (entity, key) at coordinates `>= from`.
    pub fn invalidate_from(&mut self, entity: &EntityId, key: &str, from: Coord) {
        let Some(points) = self.results.get_mut(entity).and_then(|keys| keys.get_mut(key)) else {
            return;
        };
        let dropped = points.split_off(&from).len();
        self.entries = self.entries.saturating_sub(dropped);
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.results.clear();
        self.entries = 0;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn fixed(v: i64) -> impl FnOnce() -> Result<Option<Value>, ()> {
        move || Ok(Some(Value::Int(v)))
    }

    #[test]
    fn second_read_is_a_hit() {
        let mut cache = FactCache::new();
        let home = EntityId::node("home");
        let at = Coord::new(2, 0);
        cache.get_or_compute(&home, "mood", at, fixed(1)).unwrap();
        let again = cache
            .get_or_compute(&home, "mood", at, || -> Result<_, ()> { Err(()) })
            .unwrap();
        assert_eq!(again, Some(Value::Int(1)));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn invalidation_keeps_earlier_points() {
        let mut cache = FactCache::new();
        let home = EntityId::node("home");
        for turn in 0..4 {
            cache
                .get_or_compute(&home, "mood", Coord::new(turn, 0), fixed(0))
                .unwrap();
        }
        cache.invalidate_from(&home, "mood", Coord::new(2, 0));
        assert_eq!(cache.len(), 2);

        // turn 1 still cached, turn 3 recomputed
        cache
            .get_or_compute(&home, "mood", Coord::new(1, 0), fixed(9))
            .unwrap();
        let recomputed = cache
            .get_or_compute(&home, "mood", Coord::new(3, 0), fixed(9))
            .unwrap();
        assert_eq!(recomputed, Some(Value::Int(9)));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn errors_are_not_cached() {
        let mut cache = FactCache::new();
        let home = EntityId::node("home");
        let failed = cache.get_or_compute(&home, "mood", Coord::ZERO, || Err::<Option<Value>, _>("boom"));
        assert!(failed.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidating_other_keys_is_a_no_op() {
        let mut cache = FactCache::new();
        let home = EntityId::node("home");
        cache.get_or_compute(&home, "mood", Coord::ZERO, fixed(0)).unwrap();
        cache.invalidate_from(&home, "hunger", Coord::ZERO);
        cache.invalidate_from(&EntityId::node("work"), "mood", Coord::ZERO);
        assert_eq!(cache.len(), 1);
    }
}
