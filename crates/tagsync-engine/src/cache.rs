// SPDX-License-Identifier: GPL-3.0-or-later

//! Optional memoization of catalog track listings, injected by the caller.

use moka::sync::Cache;
use tagsync_config::CacheConfig;
use tagsync_domain::{Catalog, ProviderTrack};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackListKey {
    pub catalog: Catalog,
    pub album_id: String,
}

impl TrackListKey {
    pub fn new(catalog: Catalog, album_id: impl Into<String>) -> Self {
        Self {
            catalog,
            album_id: album_id.into(),
        }
    }
}

pub trait LookupCache: Send + Sync {
    fn get(&self, key: &TrackListKey) -> Option<Vec<ProviderTrack>>;
    fn set(&self, key: TrackListKey, tracks: Vec<ProviderTrack>);
}

/// Never stores anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl LookupCache for NoCache {
    fn get(&self, _key: &TrackListKey) -> Option<Vec<ProviderTrack>> {
        None
    }

    fn set(&self, _key: TrackListKey, _tracks: Vec<ProviderTrack>) {}
}

/// Bounded in-memory cache; nothing is persisted.
#[derive(Clone)]
pub struct MokaLookupCache {
    inner: Cache<TrackListKey, Vec<ProviderTrack>>,
}

impl MokaLookupCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            inner: Cache::new(config.max_entries.max(1)),
        }
    }
}

impl LookupCache for MokaLookupCache {
    fn get(&self, key: &TrackListKey) -> Option<Vec<ProviderTrack>> {
        let hit = self.inner.get(key);
        debug!(target: "cache", catalog = %key.catalog, album_id = %key.album_id, hit = hit.is_some(), "track list lookup");
        hit
    }

    fn set(&self, key: TrackListKey, tracks: Vec<ProviderTrack>) {
        self.inner.insert(key, tracks);
    }
}
