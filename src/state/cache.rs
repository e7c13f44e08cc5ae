//! Keyed cache of remote collections with explicit freshness control.
//!
//! Staleness never blocks a read: [`KeyedCache::get`] returns whatever was
//! last stored. Freshness is only consulted to decide whether a fetch must go
//! to the network.

use std::{any::Any, fmt, sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

use crate::dao::models::{Resource, Variant};

/// Cache slot identifier: a remote collection plus one of its projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Collection the entry holds.
    pub resource: Resource,
    /// Projection of the collection.
    pub variant: Variant,
}

impl CacheKey {
    /// Key of `resource` in the `variant` projection.
    pub fn new(resource: Resource, variant: Variant) -> Self {
        Self { resource, variant }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.variant)
    }
}

/// Cached value stamped with the time it was stored.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    /// Stored value.
    pub value: T,
    /// When the value was stored.
    pub fetched_at: Instant,
}

impl<T> CacheEntry<T> {
    /// Time elapsed since the value was stored.
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    /// Whether the entry is younger than `ttl`.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.age() < ttl
    }
}

type Slot = CacheEntry<Arc<dyn Any + Send + Sync>>;

/// Unbounded cache keyed by [`CacheKey`], holding values of any type.
#[derive(Default)]
pub struct KeyedCache {
    entries: DashMap<CacheKey, Slot>,
}

impl KeyedCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value, fresh or not. A miss is `None`, as is a type mismatch.
    pub fn get<T>(&self, key: CacheKey) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let value = self.entries.get(&key)?.value.clone();
        match value.downcast_ref::<T>() {
            Some(value) => Some(value.clone()),
            None => {
                debug!(%key, "cached value has a different type; treating as miss");
                None
            }
        }
    }

    /// Overwrite the slot unconditionally and stamp it with the current time.
    pub fn set<T>(&self, key: CacheKey, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.entries.insert(
            key,
            CacheEntry {
                value: Arc::new(value),
                fetched_at: Instant::now(),
            },
        );
    }

    /// Whether the slot holds a value stored less than `ttl` ago.
    pub fn is_fresh(&self, key: CacheKey, ttl: Duration) -> bool {
        self.entries
            .get(&key)
            .is_some_and(|entry| entry.is_fresh(ttl))
    }

    /// Whether the slot holds anything.
    pub fn contains(&self, key: CacheKey) -> bool {
        self.entries.contains_key(&key)
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
