// SPDX-License-Identifier: GPL-3.0-or-later

//! Seam between the engine and the per-catalog clients.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tagsync_domain::{Catalog, ProviderAlbum, ProviderTrack};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// One catalog, normalized into [`ProviderAlbum`] / [`ProviderTrack`] shapes.
///
/// Timeouts, retries and rate limiting belong to the implementation.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn catalog(&self) -> Catalog;

    async fn search_albums(
        &self,
        artist: &str,
        album: &str,
    ) -> Result<Vec<ProviderAlbum>, ProviderError>;

    async fn get_tracks(&self, album_id: &str) -> Result<Vec<ProviderTrack>, ProviderError>;
}

/// Adapters by catalog. A catalog without an adapter behaves like an unavailable one.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: BTreeMap<Catalog, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) -> &mut Self {
        self.adapters.insert(adapter.catalog(), adapter);
        self
    }

    pub fn with(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, catalog: Catalog) -> Option<&Arc<dyn ProviderAdapter>> {
        self.adapters.get(&catalog)
    }

    pub fn catalogs(&self) -> impl Iterator<Item = Catalog> + '_ {
        self.adapters.keys().copied()
    }
}

pub struct FallbackChain;

impl FallbackChain {
    /// Alternates to try, in order, when `start` yields no confident album.
    pub fn for_catalog(start: Catalog) -> &'static [Catalog] {
        match start {
            Catalog::Qobuz => &[Catalog::Spotify, Catalog::Discogs, Catalog::MusicBrainz],
            Catalog::Spotify => &[Catalog::Qobuz, Catalog::Discogs, Catalog::MusicBrainz],
            Catalog::Discogs => &[Catalog::Qobuz, Catalog::Spotify, Catalog::MusicBrainz],
            Catalog::MusicBrainz => &[Catalog::Qobuz, Catalog::Spotify, Catalog::Discogs],
        }
    }

    /// `start` followed by its alternates when fallback is enabled.
    pub fn attempt_order(start: Catalog, fallback_enabled: bool) -> Vec<Catalog> {
        let mut order = vec![start];
        if fallback_enabled {
            order.extend_from_slice(Self::for_catalog(start));
        }
        order
    }
}
