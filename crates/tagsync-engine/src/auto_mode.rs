// SPDX-License-Identifier: GPL-3.0-or-later

//! Automatic decision automaton.
//!
//! ```text
//! Idle → SearchingAlbum → AlbumEvaluated → AutoSelected ──────────→ TrackMatching → AutoSaved ─────────→ Completed
//!             ↑                 │        → AwaitingFallback ─┐                    → DeferToInteractive →
//!             └─────────────────┼────────────────────────────┘
//!                               └→ DeferToInteractive (chain exhausted or fallback disabled)
//! ```
//!
//! Each catalog is tried at most once, in the order given by
//! [`FallbackChain`]. Search failures count as "no candidates" so the chain
//! keeps going; a failure to list the tracks of an already selected album is
//! the only provider error returned to the caller. Every transition carries a
//! rationale with the scores and threshold behind it.

use crate::album_scoring::{pick_best, AlbumCandidateScorer, ScoredAlbum};
use crate::cache::{LookupCache, NoCache, TrackListKey};
use crate::genres::merge_genres;
use crate::provider::{FallbackChain, ProviderError, ProviderRegistry};
use crate::track_pairing::{SortStrategyResult, TrackPair, TrackPairer};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tagsync_config::{AppConfig, AutoModeConfig};
use tagsync_domain::{AlbumQuery, Catalog, LocalTrackFile, ProviderAlbum, ProviderTrack};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum AutoModeError {
    #[error("failed to list tracks of {catalog} album {album_id}: {source}")]
    TrackListing {
        catalog: Catalog,
        album_id: String,
        #[source]
        source: ProviderError,
    },
}

/// Checked between catalog attempts.
pub trait Cancellation: Send + Sync {
    fn is_cancelled(&self) -> bool;
}

impl<F> Cancellation for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_cancelled(&self) -> bool {
        self()
    }
}

impl Cancellation for AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancel;

impl Cancellation for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoModeState {
    Idle,
    SearchingAlbum,
    AlbumEvaluated,
    AutoSelected,
    AwaitingFallback,
    TrackMatching,
    AutoSaved,
    DeferToInteractive,
    Cancelled,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub from: AutoModeState,
    pub to: AutoModeState,
    pub catalog: Option<Catalog>,
    pub rationale: String,
}

/// Everything one catalog returned, scored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogAttempt {
    pub catalog: Catalog,
    pub candidates: Vec<ScoredAlbum>,
    /// Set when the catalog could not be queried.
    pub error: Option<String>,
}

impl CatalogAttempt {
    pub fn best(&self) -> Option<&ScoredAlbum> {
        pick_best(&self.candidates)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AlbumSelection {
    AutoSelected {
        catalog: Catalog,
        candidate: ScoredAlbum,
        rationale: String,
    },
    DeferToInteractive {
        rationale: String,
    },
    Cancelled {
        rationale: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlbumPhase {
    pub selection: AlbumSelection,
    pub attempts: Vec<CatalogAttempt>,
    pub transitions: Vec<Transition>,
}

impl AlbumPhase {
    pub fn final_state(&self) -> AutoModeState {
        self.transitions
            .last()
            .map(|transition| transition.to)
            .unwrap_or(AutoModeState::Idle)
    }
}

/// What the tagging layer needs to persist an automatic decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaggingPlan {
    pub catalog: Catalog,
    pub album: ProviderAlbum,
    /// Winning pairs; unmatched slots keep their absent side as `None`.
    pub pairs: Vec<TrackPair>,
    pub genres: Vec<String>,
    pub save_cover: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AutoModeDecision {
    AutoSaved {
        plan: TaggingPlan,
        rationale: String,
    },
    /// `selected` is set when an album cleared the threshold but its tracks did not.
    DeferToInteractive {
        selected: Option<ScoredAlbum>,
        rationale: String,
    },
    Cancelled {
        rationale: String,
    },
}

impl AutoModeDecision {
    pub fn state(&self) -> AutoModeState {
        match self {
            Self::AutoSaved { .. } => AutoModeState::AutoSaved,
            Self::DeferToInteractive { .. } => AutoModeState::DeferToInteractive,
            Self::Cancelled { .. } => AutoModeState::Cancelled,
        }
    }

    pub fn rationale(&self) -> &str {
        match self {
            Self::AutoSaved { rationale, .. }
            | Self::DeferToInteractive { rationale, .. }
            | Self::Cancelled { rationale } => rationale,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutoModeOutcome {
    pub decision: AutoModeDecision,
    /// Every catalog tried, with all of its scored candidates.
    pub attempts: Vec<CatalogAttempt>,
    /// Every evaluated pairing strategy; empty when no album was selected.
    pub strategy_results: Vec<SortStrategyResult>,
    pub transitions: Vec<Transition>,
}

impl AutoModeOutcome {
    pub fn final_state(&self) -> AutoModeState {
        self.transitions
            .last()
            .map(|transition| transition.to)
            .unwrap_or(AutoModeState::Idle)
    }
}

#[derive(Debug)]
struct Audit {
    state: AutoModeState,
    transitions: Vec<Transition>,
}

impl Audit {
    fn new() -> Self {
        Self {
            state: AutoModeState::Idle,
            transitions: Vec::new(),
        }
    }

    fn advance(&mut self, to: AutoModeState, catalog: Option<Catalog>, rationale: String) {
        info!(
            target: "automode",
            from = ?self.state,
            to = ?to,
            catalog = ?catalog,
            "{rationale}"
        );
        self.transitions.push(Transition {
            from: self.state,
            to,
            catalog,
            rationale,
        });
        self.state = to;
    }
}

pub struct AutoModeController {
    registry: ProviderRegistry,
    config: AutoModeConfig,
    scorer: AlbumCandidateScorer,
    pairer: TrackPairer,
    cache: Arc<dyn LookupCache>,
}

impl AutoModeController {
    pub fn new(registry: ProviderRegistry, config: &AppConfig) -> Self {
        Self {
            registry,
            config: config.automode.validated(),
            scorer: AlbumCandidateScorer::new(&config.scoring),
            pairer: TrackPairer::new(config.confidence.clone()),
            cache: Arc::new(NoCache),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn LookupCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &AutoModeConfig {
        &self.config
    }

    /// Search the start catalog and, if allowed, its fallback chain until one
    /// candidate clears the confidence threshold.
    pub async fn select_album(
        &self,
        query: &AlbumQuery,
        expected_track_count: u32,
        cancellation: &dyn Cancellation,
    ) -> AlbumPhase {
        let mut audit = Audit::new();
        let (selection, attempts) = self
            .select_album_audited(query, expected_track_count, cancellation, &mut audit)
            .await;

        AlbumPhase {
            selection,
            attempts,
            transitions: audit.transitions,
        }
    }

    /// Full pass for one folder: album selection, then track pairing.
    pub async fn run(
        &self,
        query: &AlbumQuery,
        locals: &[LocalTrackFile],
        cancellation: &dyn Cancellation,
    ) -> Result<AutoModeOutcome, AutoModeError> {
        let mut audit = Audit::new();
        let threshold = self.config.confidence_threshold;

        if locals.is_empty() {
            let rationale = "folder has no local files; nothing to match".to_string();
            audit.advance(AutoModeState::DeferToInteractive, None, rationale.clone());
            audit.advance(AutoModeState::Completed, None, "run finished".to_string());
            return Ok(AutoModeOutcome {
                decision: AutoModeDecision::DeferToInteractive {
                    selected: None,
                    rationale,
                },
                attempts: Vec::new(),
                strategy_results: Vec::new(),
                transitions: audit.transitions,
            });
        }

        let expected_track_count = u32::try_from(locals.len()).unwrap_or(u32::MAX);
        let (selection, attempts) = self
            .select_album_audited(query, expected_track_count, cancellation, &mut audit)
            .await;

        let mut strategy_results = Vec::new();
        let decision = match selection {
            AlbumSelection::Cancelled { rationale } => AutoModeDecision::Cancelled { rationale },
            AlbumSelection::DeferToInteractive { rationale } => AutoModeDecision::DeferToInteractive {
                selected: None,
                rationale,
            },
            AlbumSelection::AutoSelected {
                catalog, candidate, ..
            } => {
                audit.advance(
                    AutoModeState::TrackMatching,
                    Some(catalog),
                    format!(
                        "pairing {} local files with {} album {} ('{}')",
                        locals.len(),
                        catalog,
                        candidate.album.id,
                        candidate.album.name
                    ),
                );

                let tracks = self.fetch_tracks(catalog, &candidate.album.id).await?;
                let pairing = self.pairer.pair(locals, &tracks);
                let best = &pairing.best;

                if best.aggregate_confidence >= threshold {
                    let rationale = format!(
                        "{} >= threshold {:.2}; every strategy: [{}]",
                        best.summary(),
                        threshold,
                        pairing
                            .results
                            .iter()
                            .map(SortStrategyResult::summary)
                            .collect::<Vec<_>>()
                            .join("; ")
                    );
                    audit.advance(AutoModeState::AutoSaved, Some(catalog), rationale.clone());

                    let genres = merge_genres(
                        &query.existing_genres,
                        &incoming_genres(&candidate.album, &tracks),
                        self.config.genre_mode,
                    );
                    strategy_results = pairing.results;
                    AutoModeDecision::AutoSaved {
                        plan: TaggingPlan {
                            catalog,
                            album: candidate.album,
                            pairs: pairing.best.pairs,
                            genres,
                            save_cover: self.config.save_cover,
                        },
                        rationale,
                    }
                } else {
                    let rationale = format!(
                        "best pairing {} is below threshold {:.2}",
                        best.summary(),
                        threshold
                    );
                    audit.advance(AutoModeState::DeferToInteractive, Some(catalog), rationale.clone());
                    strategy_results = pairing.results;
                    AutoModeDecision::DeferToInteractive {
                        selected: Some(candidate),
                        rationale,
                    }
                }
            }
        };

        audit.advance(
            AutoModeState::Completed,
            None,
            format!("run finished in state {:?}", decision.state()),
        );

        Ok(AutoModeOutcome {
            decision,
            attempts,
            strategy_results,
            transitions: audit.transitions,
        })
    }

    async fn select_album_audited(
        &self,
        query: &AlbumQuery,
        expected_track_count: u32,
        cancellation: &dyn Cancellation,
        audit: &mut Audit,
    ) -> (AlbumSelection, Vec<CatalogAttempt>) {
        let threshold = self.config.confidence_threshold;
        let order = FallbackChain::attempt_order(self.config.start_catalog, self.config.fallback_enabled);
        let mut attempts: Vec<CatalogAttempt> = Vec::with_capacity(order.len());

        for (position, catalog) in order.iter().copied().enumerate() {
            if cancellation.is_cancelled() {
                let rationale = format!("cancelled before querying {catalog}");
                audit.advance(AutoModeState::Cancelled, Some(catalog), rationale.clone());
                return (AlbumSelection::Cancelled { rationale }, attempts);
            }

            audit.advance(
                AutoModeState::SearchingAlbum,
                Some(catalog),
                format!(
                    "querying {catalog} for '{} - {}' expecting {expected_track_count} tracks",
                    query.artist, query.album
                ),
            );

            let attempt = self.query_catalog(catalog, query, expected_track_count).await;
            audit.advance(AutoModeState::AlbumEvaluated, Some(catalog), describe_attempt(&attempt));

            if let Some(best) = attempt.best().filter(|best| best.score.total >= threshold).cloned() {
                let rationale = format!(
                    "selected {catalog} album {} ('{} - {}') with {} >= threshold {threshold:.2}; rejected: [{}]",
                    best.album.id,
                    best.album.artist_name,
                    best.album.name,
                    best.score.summary(),
                    describe_rejected(&attempt, best.index)
                );
                audit.advance(AutoModeState::AutoSelected, Some(catalog), rationale.clone());
                attempts.push(attempt);
                return (
                    AlbumSelection::AutoSelected {
                        catalog,
                        candidate: best,
                        rationale,
                    },
                    attempts,
                );
            }

            let best_total = attempt.best().map(|best| best.score.total);
            attempts.push(attempt);

            if let Some(next) = order.get(position + 1) {
                audit.advance(
                    AutoModeState::AwaitingFallback,
                    Some(catalog),
                    format!(
                        "best {catalog} score {} below threshold {threshold:.2}; falling back to {next}",
                        format_score(best_total)
                    ),
                );
            }
        }

        let best_overall = attempts
            .iter()
            .filter_map(|attempt| attempt.best())
            .fold(None::<&ScoredAlbum>, |acc, candidate| match acc {
                Some(current) if current.score.total >= candidate.score.total => Some(current),
                _ => Some(candidate),
            });
        let tried = order.iter().map(Catalog::to_string).collect::<Vec<_>>().join(", ");
        let rationale = match best_overall {
            Some(best) => format!(
                "no candidate reached threshold {threshold:.2} after trying [{tried}]; best was {} album {} with {}",
                best.album.catalog,
                best.album.id,
                best.score.summary()
            ),
            None => format!("no candidates returned after trying [{tried}]"),
        };
        audit.advance(AutoModeState::DeferToInteractive, None, rationale.clone());

        (AlbumSelection::DeferToInteractive { rationale }, attempts)
    }

    async fn query_catalog(
        &self,
        catalog: Catalog,
        query: &AlbumQuery,
        expected_track_count: u32,
    ) -> CatalogAttempt {
        let Some(adapter) = self.registry.get(catalog) else {
            warn!(target: "automode", catalog = %catalog, "no adapter registered, treating as unavailable");
            return CatalogAttempt {
                catalog,
                candidates: Vec::new(),
                error: Some("no adapter registered".to_string()),
            };
        };

        match adapter.search_albums(&query.artist, &query.album).await {
            Ok(albums) => CatalogAttempt {
                catalog,
                candidates: self.scorer.score_all(query, expected_track_count, &albums),
                error: None,
            },
            Err(error) => {
                warn!(target: "automode", catalog = %catalog, error = %error, "album search failed, treating as zero candidates");
                CatalogAttempt {
                    catalog,
                    candidates: Vec::new(),
                    error: Some(error.to_string()),
                }
            }
        }
    }

    async fn fetch_tracks(
        &self,
        catalog: Catalog,
        album_id: &str,
    ) -> Result<Vec<ProviderTrack>, AutoModeError> {
        let key = TrackListKey::new(catalog, album_id);
        if let Some(tracks) = self.cache.get(&key) {
            return Ok(tracks);
        }

        let listing_error = |source: ProviderError| AutoModeError::TrackListing {
            catalog,
            album_id: album_id.to_string(),
            source,
        };

        let adapter = self
            .registry
            .get(catalog)
            .ok_or_else(|| listing_error(ProviderError::Unavailable("no adapter registered".to_string())))?;
        let tracks = adapter.get_tracks(album_id).await.map_err(|error| {
            warn!(target: "automode", catalog = %catalog, album_id, error = %error, "track listing failed");
            listing_error(error)
        })?;

        self.cache.set(key, tracks.clone());
        Ok(tracks)
    }
}

/// Album genres, or the union of track genres when the album has none.
fn incoming_genres(album: &ProviderAlbum, tracks: &[ProviderTrack]) -> Vec<String> {
    if !album.genres.is_empty() {
        return album.genres.clone();
    }
    tracks.iter().flat_map(|track| track.genres.iter().cloned()).collect()
}

fn describe_attempt(attempt: &CatalogAttempt) -> String {
    if let Some(error) = &attempt.error {
        return format!("{} unavailable ({error}); zero candidates", attempt.catalog);
    }
    match attempt.best() {
        Some(best) => format!(
            "{} returned {} candidates; best {} ({})",
            attempt.catalog,
            attempt.candidates.len(),
            best.album.id,
            best.score.summary()
        ),
        None => format!("{} returned no candidates", attempt.catalog),
    }
}

fn describe_rejected(attempt: &CatalogAttempt, chosen_index: usize) -> String {
    attempt
        .candidates
        .iter()
        .filter(|candidate| candidate.index != chosen_index)
        .map(|candidate| format!("{} {:.3}", candidate.album.id, candidate.score.total))
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_score(score: Option<f64>) -> String {
    score.map_or_else(|| "n/a".to_string(), |score| format!("{score:.3}"))
}
