// SPDX-License-Identifier: GPL-3.0-or-later

//! JSON fixtures describing one local folder and canned catalog responses.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tagsync_domain::{
    deserialize_release_date_lenient, AlbumQuery, Catalog, LocalTrackFile, ProviderAlbum,
    ProviderTrack, ReleaseDate,
};
use tagsync_engine::{ProviderAdapter, ProviderError, ProviderRegistry};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("failed to read fixture {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid fixture {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Fixture {
    pub query: AlbumQuery,
    #[serde(default)]
    pub local_files: Vec<LocalTrackFile>,
    /// Catalogs missing here behave as unavailable.
    #[serde(default)]
    pub catalogs: BTreeMap<Catalog, Vec<FixtureAlbum>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FixtureAlbum {
    pub id: String,
    pub name: String,
    pub artist_name: String,
    #[serde(default, deserialize_with = "deserialize_release_date_lenient")]
    pub release_date: Option<ReleaseDate>,
    /// Defaults to the number of listed tracks.
    #[serde(default)]
    pub track_count: Option<u32>,
    #[serde(default)]
    pub disc_count: Option<u32>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub tracks: Vec<ProviderTrack>,
}

impl FixtureAlbum {
    fn to_provider_album(&self, catalog: Catalog) -> ProviderAlbum {
        let listed = u32::try_from(self.tracks.len()).unwrap_or(u32::MAX);
        let mut album = ProviderAlbum::new(
            catalog,
            self.id.clone(),
            self.artist_name.clone(),
            self.name.clone(),
            self.track_count.unwrap_or(listed),
        );
        album.release_date = self.release_date.clone();
        album.disc_count = self.disc_count.unwrap_or_else(|| {
            self.tracks
                .iter()
                .map(|track| track.disc_number)
                .max()
                .unwrap_or(1)
        });
        album.genres = self.genres.clone();
        album
    }
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        let raw = std::fs::read_to_string(path).map_err(|source| FixtureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw).map_err(|source| FixtureError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn registry(&self) -> ProviderRegistry {
        self.catalogs
            .iter()
            .fold(ProviderRegistry::new(), |registry, (catalog, albums)| {
                registry.with(Arc::new(FixtureProvider::new(*catalog, albums)))
            })
    }
}

/// Serves canned search results and track listings for one catalog.
#[derive(Debug, Clone)]
pub struct FixtureProvider {
    catalog: Catalog,
    albums: Vec<ProviderAlbum>,
    tracks: HashMap<String, Vec<ProviderTrack>>,
}

impl FixtureProvider {
    pub fn new(catalog: Catalog, albums: &[FixtureAlbum]) -> Self {
        Self {
            catalog,
            albums: albums
                .iter()
                .map(|album| album.to_provider_album(catalog))
                .collect(),
            tracks: albums
                .iter()
                .map(|album| (album.id.clone(), album.tracks.clone()))
                .collect(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for FixtureProvider {
    fn catalog(&self) -> Catalog {
        self.catalog
    }

    async fn search_albums(
        &self,
        artist: &str,
        album: &str,
    ) -> Result<Vec<ProviderAlbum>, ProviderError> {
        debug!(target: "cli", catalog = %self.catalog, artist, album, results = self.albums.len(), "fixture search");
        Ok(self.albums.clone())
    }

    async fn get_tracks(&self, album_id: &str) -> Result<Vec<ProviderTrack>, ProviderError> {
        self.tracks
            .get(album_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("{} album {album_id}", self.catalog)))
    }
}
