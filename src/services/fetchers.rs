//! Cache-backed remote reads.
//!
//! `force = false` answers from a fresh cache entry without touching the
//! network; anything else performs a network read and overwrites the entry.
//! When the network read fails and a value is cached, the stale value wins.

use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::{
    dao::{
        models::{Competition, LiveSessions, Resource, Team, Variant},
        remote::{RemoteResult, RemoteSource},
    },
    state::cache::{CacheKey, KeyedCache},
};

/// Remote fetchers sharing one cache.
#[derive(Clone)]
pub struct Fetchers {
    cache: Arc<KeyedCache>,
    source: Arc<dyn RemoteSource>,
    ttl: Duration,
}

impl Fetchers {
    /// Wrap `source` with `cache`, treating entries older than `ttl` as stale.
    pub fn new(cache: Arc<KeyedCache>, source: Arc<dyn RemoteSource>, ttl: Duration) -> Self {
        Self { cache, source, ttl }
    }

    /// Cache shared with the rest of the process.
    pub fn cache(&self) -> &Arc<KeyedCache> {
        &self.cache
    }

    /// Freshness window of cached entries.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Teams in the given projection; see the module docs for `force`.
    pub async fn fetch_teams(&self, variant: Variant, force: bool) -> RemoteResult<Vec<Team>> {
        let source = self.source.clone();
        self.fetch_cached(CacheKey::new(Resource::Teams, variant), force, move || {
            source.fetch_teams(variant)
        })
        .await
    }

    /// Competitions in the given projection; see the module docs for `force`.
    pub async fn fetch_competitions(
        &self,
        variant: Variant,
        force: bool,
    ) -> RemoteResult<Vec<Competition>> {
        let source = self.source.clone();
        self.fetch_cached(
            CacheKey::new(Resource::Competitions, variant),
            force,
            move || source.fetch_competitions(variant),
        )
        .await
    }

    /// Live sessions are never cached: the store keeps the last snapshot.
    pub async fn fetch_live_sessions(&self) -> RemoteResult<LiveSessions> {
        self.source.fetch_live_sessions().await
    }

    /// Whatever is cached for `teams`, without network access.
    pub fn cached_teams(&self, variant: Variant) -> Option<Vec<Team>> {
        self.cache.get(CacheKey::new(Resource::Teams, variant))
    }

    /// Whatever is cached for `competitions`, without network access.
    pub fn cached_competitions(&self, variant: Variant) -> Option<Vec<Competition>> {
        self.cache.get(CacheKey::new(Resource::Competitions, variant))
    }

    /// Variants of `resource` that currently have a cache entry.
    pub fn cached_variants(&self, resource: Resource) -> Vec<Variant> {
        Variant::ALL
            .into_iter()
            .filter(|variant| self.cache.contains(CacheKey::new(resource, *variant)))
            .collect()
    }

    async fn fetch_cached<T, F>(&self, key: CacheKey, force: bool, fetch: F) -> RemoteResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> BoxFuture<'static, RemoteResult<T>>,
    {
        if !force && self.cache.is_fresh(key, self.ttl) {
            if let Some(value) = self.cache.get::<T>(key) {
                debug!(%key, "cache hit");
                return Ok(value);
            }
        }

        match fetch().await {
            Ok(value) => {
                self.cache.set(key, value.clone());
                debug!(%key, force, "cache refreshed from remote");
                Ok(value)
            }
            Err(err) => match self.cache.get::<T>(key) {
                Some(stale) => {
                    warn!(%key, error = %err, "remote fetch failed; serving stale cache");
                    Ok(stale)
                }
                None => Err(err),
            },
        }
    }
}
