// SPDX-License-Identifier: GPL-3.0-or-later

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tagsync_config::AppConfig;
use tagsync_domain::{AlbumQuery, Catalog, LocalTrackFile, ProviderAlbum, ProviderTrack};
use tagsync_engine::{
    AlbumSelection, AutoModeController, AutoModeDecision, AutoModeError, AutoModeState,
    MokaLookupCache, NeverCancel, ProviderAdapter, ProviderError, ProviderRegistry,
};

const TEN: &str = "One Two Three Four Five Six Seven Eight Nine Ten";
const SEVEN: &str = "One Two Three Four Five Six Seven";

struct FakeCatalog {
    catalog: Catalog,
    albums: Vec<ProviderAlbum>,
    tracks: HashMap<String, Vec<ProviderTrack>>,
    fail_search: bool,
    fail_tracks: bool,
    searches: AtomicUsize,
    track_listings: AtomicUsize,
}

impl FakeCatalog {
    fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            albums: Vec::new(),
            tracks: HashMap::new(),
            fail_search: false,
            fail_tracks: false,
            searches: AtomicUsize::new(0),
            track_listings: AtomicUsize::new(0),
        }
    }

    fn album(mut self, id: &str, artist: &str, name: &str, track_count: u32) -> Self {
        self.albums
            .push(ProviderAlbum::new(self.catalog, id, artist, name, track_count));
        self
    }

    fn tracks(mut self, album_id: &str, tracks: Vec<ProviderTrack>) -> Self {
        self.tracks.insert(album_id.to_string(), tracks);
        self
    }

    fn failing_search(mut self) -> Self {
        self.fail_search = true;
        self
    }

    fn failing_tracks(mut self) -> Self {
        self.fail_tracks = true;
        self
    }
}

#[async_trait]
impl ProviderAdapter for FakeCatalog {
    fn catalog(&self) -> Catalog {
        self.catalog
    }

    async fn search_albums(
        &self,
        _artist: &str,
        _album: &str,
    ) -> Result<Vec<ProviderAlbum>, ProviderError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.fail_search {
            return Err(ProviderError::Unavailable("connection refused".to_string()));
        }
        Ok(self.albums.clone())
    }

    async fn get_tracks(&self, album_id: &str) -> Result<Vec<ProviderTrack>, ProviderError> {
        self.track_listings.fetch_add(1, Ordering::SeqCst);
        if self.fail_tracks {
            return Err(ProviderError::InvalidResponse("truncated body".to_string()));
        }
        self.tracks
            .get(album_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(album_id.to_string()))
    }
}

fn config(start: Catalog, fallback_enabled: bool) -> AppConfig {
    let mut config = AppConfig::default();
    config.automode.start_catalog = start;
    config.automode.fallback_enabled = fallback_enabled;
    config.automode.confidence_threshold = 0.80;
    config
}

fn help_locals() -> Vec<LocalTrackFile> {
    [("Help!", 138_000), ("The Night Before", 154_000), ("Ticket to Ride", 190_000)]
        .iter()
        .enumerate()
        .map(|(index, (title, ms))| {
            LocalTrackFile::new(format!("/music/Help/{:02}.flac", index + 1), index, *title)
                .with_duration_ms(*ms)
        })
        .collect()
}

fn help_tracks() -> Vec<ProviderTrack> {
    let mut tracks = vec![
        ProviderTrack::new("h1", 1, "Help!").with_duration_ms(138_000),
        ProviderTrack::new("h2", 2, "The Night Before").with_duration_ms(154_000),
        ProviderTrack::new("h3", 3, "Ticket to Ride").with_duration_ms(190_000),
    ];
    tracks[0].genres = vec!["Pop".to_string()];
    tracks[1].genres = vec!["rock".to_string(), " ".to_string()];
    tracks
}

fn help_query() -> AlbumQuery {
    let mut query = AlbumQuery::new("The Beatles", "Help!");
    query.existing_genres = vec!["Rock".to_string()];
    query
}

fn states(transitions: &[tagsync_engine::Transition]) -> Vec<AutoModeState> {
    transitions.iter().map(|transition| transition.to).collect()
}

#[tokio::test]
async fn low_start_score_falls_back_to_confident_catalog() {
    let discogs = FakeCatalog::new(Catalog::Discogs).album("d1", "Band", "Completely Different", 10);
    let spotify = FakeCatalog::new(Catalog::Spotify).album("s1", "Band", SEVEN, 10);
    let musicbrainz = Arc::new(FakeCatalog::new(Catalog::MusicBrainz).album("m1", "Band", TEN, 10));
    // Qobuz is deliberately not registered
    let registry = ProviderRegistry::new()
        .with(Arc::new(discogs))
        .with(Arc::new(spotify))
        .with(musicbrainz.clone());

    let controller = AutoModeController::new(registry, &config(Catalog::Discogs, true));
    let phase = controller
        .select_album(&AlbumQuery::new("Band", TEN), 10, &NeverCancel)
        .await;

    match &phase.selection {
        AlbumSelection::AutoSelected {
            catalog, candidate, ..
        } => {
            assert_eq!(*catalog, Catalog::Spotify);
            assert_eq!(candidate.album.id, "s1");
            assert!((candidate.score.total - 0.88).abs() < 1e-9);
        }
        other => panic!("expected auto selection, got {other:?}"),
    }
    assert_eq!(phase.final_state(), AutoModeState::AutoSelected);

    let discogs_best = phase.attempts[0].best().expect("discogs candidate");
    assert!((discogs_best.score.total - 0.60).abs() < 1e-9);
    assert_eq!(phase.attempts[1].catalog, Catalog::Qobuz);
    assert!(phase.attempts[1].error.is_some());
    assert_eq!(phase.attempts.len(), 3);
    assert_eq!(musicbrainz.searches.load(Ordering::SeqCst), 0);

    assert_eq!(
        states(&phase.transitions),
        vec![
            AutoModeState::SearchingAlbum,
            AutoModeState::AlbumEvaluated,
            AutoModeState::AwaitingFallback,
            AutoModeState::SearchingAlbum,
            AutoModeState::AlbumEvaluated,
            AutoModeState::AwaitingFallback,
            AutoModeState::SearchingAlbum,
            AutoModeState::AlbumEvaluated,
            AutoModeState::AutoSelected,
        ]
    );
    assert_eq!(phase.transitions[0].from, AutoModeState::Idle);
    assert!(phase.transitions.iter().all(|t| !t.rationale.is_empty()));
}

#[tokio::test]
async fn disabled_fallback_defers_after_start_catalog() {
    let discogs = FakeCatalog::new(Catalog::Discogs).album("d1", "Band", "Completely Different", 10);
    let spotify = Arc::new(FakeCatalog::new(Catalog::Spotify).album("s1", "Band", TEN, 10));
    let registry = ProviderRegistry::new()
        .with(Arc::new(discogs))
        .with(spotify.clone());

    let controller = AutoModeController::new(registry, &config(Catalog::Discogs, false));
    let phase = controller
        .select_album(&AlbumQuery::new("Band", TEN), 10, &NeverCancel)
        .await;

    let AlbumSelection::DeferToInteractive { rationale } = &phase.selection else {
        panic!("expected deferral, got {:?}", phase.selection);
    };
    assert!(rationale.contains("threshold 0.80"));
    assert_eq!(phase.attempts.len(), 1);
    assert_eq!(spotify.searches.load(Ordering::SeqCst), 0);
    assert_eq!(phase.final_state(), AutoModeState::DeferToInteractive);
}

#[tokio::test]
async fn exhausted_chain_defers_with_every_candidate() {
    let registry = Catalog::ALL.iter().fold(ProviderRegistry::new(), |registry, catalog| {
        registry.with(Arc::new(
            FakeCatalog::new(*catalog)
                .album(&format!("{catalog}-a"), "Band", "Something Else", 10)
                .album(&format!("{catalog}-b"), "Other Band", TEN, 30),
        ))
    });

    let controller = AutoModeController::new(registry, &config(Catalog::Qobuz, true));
    let phase = controller
        .select_album(&AlbumQuery::new("Band", TEN), 10, &NeverCancel)
        .await;

    assert!(matches!(phase.selection, AlbumSelection::DeferToInteractive { .. }));
    let tried: Vec<Catalog> = phase.attempts.iter().map(|a| a.catalog).collect();
    assert_eq!(
        tried,
        vec![Catalog::Qobuz, Catalog::Spotify, Catalog::Discogs, Catalog::MusicBrainz]
    );
    assert!(phase.attempts.iter().all(|a| a.candidates.len() == 2));
}

#[tokio::test]
async fn search_failure_counts_as_no_candidates() {
    let qobuz = FakeCatalog::new(Catalog::Qobuz).failing_search();
    let spotify = FakeCatalog::new(Catalog::Spotify).album("s1", "Band", TEN, 10);
    let registry = ProviderRegistry::new().with(Arc::new(qobuz)).with(Arc::new(spotify));

    let controller = AutoModeController::new(registry, &config(Catalog::Qobuz, true));
    let phase = controller
        .select_album(&AlbumQuery::new("Band", TEN), 10, &NeverCancel)
        .await;

    assert!(matches!(
        phase.selection,
        AlbumSelection::AutoSelected { catalog: Catalog::Spotify, .. }
    ));
    let failed = &phase.attempts[0];
    assert!(failed.candidates.is_empty());
    assert!(failed
        .error
        .as_deref()
        .is_some_and(|error| error.contains("connection refused")));
}

#[tokio::test]
async fn cancellation_is_checked_before_each_catalog() {
    let qobuz = Arc::new(FakeCatalog::new(Catalog::Qobuz).album("q1", "Band", "Nope", 1));
    let spotify = Arc::new(FakeCatalog::new(Catalog::Spotify).album("s1", "Band", TEN, 10));
    let registry = ProviderRegistry::new().with(qobuz.clone()).with(spotify.clone());
    let controller = AutoModeController::new(registry, &config(Catalog::Qobuz, true));

    let checks = AtomicUsize::new(0);
    let cancel_after_first = || checks.fetch_add(1, Ordering::SeqCst) >= 1;
    let outcome = controller
        .run(&AlbumQuery::new("Band", TEN), &help_locals(), &cancel_after_first)
        .await
        .expect("cancellation is not an error");

    assert_eq!(outcome.decision.state(), AutoModeState::Cancelled);
    assert!(outcome.decision.rationale().contains("Spotify"));
    assert_eq!(qobuz.searches.load(Ordering::SeqCst), 1);
    assert_eq!(spotify.searches.load(Ordering::SeqCst), 0);
    assert_eq!(outcome.final_state(), AutoModeState::Completed);

    let flag = AtomicBool::new(true);
    let outcome = controller
        .run(&AlbumQuery::new("Band", TEN), &help_locals(), &flag)
        .await
        .expect("cancellation is not an error");
    assert_eq!(outcome.decision.state(), AutoModeState::Cancelled);
    assert_eq!(qobuz.searches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn confident_album_and_tracks_are_auto_saved() {
    let qobuz = FakeCatalog::new(Catalog::Qobuz)
        .album("help-remaster", "The Beatles", "Help! (Remastered)", 14)
        .album("help", "The Beatles", "Help!", 3)
        .tracks("help", help_tracks());
    let registry = ProviderRegistry::new().with(Arc::new(qobuz));

    let controller = AutoModeController::new(registry, &config(Catalog::Qobuz, true));
    let outcome = controller
        .run(&help_query(), &help_locals(), &NeverCancel)
        .await
        .expect("run succeeds");

    let AutoModeDecision::AutoSaved { plan, rationale } = &outcome.decision else {
        panic!("expected auto save, got {:?}", outcome.decision);
    };
    assert_eq!(plan.catalog, Catalog::Qobuz);
    assert_eq!(plan.album.id, "help");
    assert_eq!(plan.pairs.len(), 3);
    assert!(plan.pairs.iter().all(|pair| pair.is_complete()));
    assert!(plan.save_cover);
    // album has no genres, so track genres are merged in catalog order
    assert_eq!(plan.genres, vec!["Rock".to_string(), "Pop".to_string()]);
    assert!(rationale.contains("byOrder"));
    assert_eq!(outcome.strategy_results.len(), 5);
    assert_eq!(outcome.attempts[0].candidates.len(), 2);

    assert_eq!(
        states(&outcome.transitions),
        vec![
            AutoModeState::SearchingAlbum,
            AutoModeState::AlbumEvaluated,
            AutoModeState::AutoSelected,
            AutoModeState::TrackMatching,
            AutoModeState::AutoSaved,
            AutoModeState::Completed,
        ]
    );
}

#[tokio::test]
async fn unconvincing_track_pairing_defers_with_review() {
    let strangers = vec![
        ProviderTrack::new("x1", 1, "Zzz").with_duration_ms(400_000),
        ProviderTrack::new("x2", 2, "Qqq").with_duration_ms(420_000),
        ProviderTrack::new("x3", 3, "Xxx").with_duration_ms(440_000),
    ];
    let qobuz = FakeCatalog::new(Catalog::Qobuz)
        .album("help", "The Beatles", "Help!", 3)
        .tracks("help", strangers);
    let registry = ProviderRegistry::new().with(Arc::new(qobuz));

    let controller = AutoModeController::new(registry, &config(Catalog::Qobuz, true));
    let outcome = controller
        .run(&help_query(), &help_locals(), &NeverCancel)
        .await
        .expect("run succeeds");

    let AutoModeDecision::DeferToInteractive { selected, rationale } = &outcome.decision else {
        panic!("expected deferral, got {:?}", outcome.decision);
    };
    assert!(rationale.contains("below threshold 0.80"));
    assert_eq!(selected.as_ref().map(|s| s.album.id.as_str()), Some("help"));
    assert_eq!(outcome.strategy_results.len(), 5);
    assert_eq!(outcome.attempts.len(), 1);
}

#[tokio::test]
async fn untimed_partially_tagged_folder_defers_on_weak_titles() {
    let locals = vec![
        LocalTrackFile::new("/music/Help/01.flac", 0, "Help!").with_position(1, 1),
        LocalTrackFile::new("/music/Help/02.flac", 1, "The Night Before (mono)"),
        LocalTrackFile::new("/music/Help/03.flac", 2, "Ticket to Ride (take 2)"),
    ];
    let untimed = vec![
        ProviderTrack::new("h1", 1, "Help!"),
        ProviderTrack::new("h2", 2, "The Night Before"),
        ProviderTrack::new("h3", 3, "Ticket to Ride"),
    ];
    let qobuz = FakeCatalog::new(Catalog::Qobuz)
        .album("help", "The Beatles", "Help!", 3)
        .tracks("help", untimed);
    let registry = ProviderRegistry::new().with(Arc::new(qobuz));

    let controller = AutoModeController::new(registry, &config(Catalog::Qobuz, true));
    let outcome = controller
        .run(&help_query(), &locals, &NeverCancel)
        .await
        .expect("run succeeds");

    let AutoModeDecision::DeferToInteractive { selected, rationale } = &outcome.decision else {
        panic!("expected deferral, got {:?}", outcome.decision);
    };
    assert!(rationale.contains("below threshold 0.80"), "{rationale}");
    assert_eq!(selected.as_ref().map(|s| s.album.id.as_str()), Some("help"));
    assert_eq!(outcome.strategy_results.len(), 5);
    for result in &outcome.strategy_results {
        assert_eq!(result.complete_pairs().count(), 3, "{} left files unpaired", result.strategy);
        assert_eq!(result.high_count, 0);
    }
}

#[tokio::test]
async fn outcome_serializes_with_stable_names() {
    let qobuz = FakeCatalog::new(Catalog::Qobuz)
        .album("help", "The Beatles", "Help!", 3)
        .tracks("help", help_tracks());
    let registry = ProviderRegistry::new().with(Arc::new(qobuz));

    let controller = AutoModeController::new(registry, &config(Catalog::Qobuz, true));
    let outcome = controller
        .run(&help_query(), &help_locals(), &NeverCancel)
        .await
        .expect("run succeeds");
    let json = serde_json::to_value(&outcome).expect("outcome serializes");

    assert_eq!(json["decision"]["state"], "auto_saved");
    let pair = &json["decision"]["plan"]["pairs"][0];
    assert_eq!(pair["level"], "high");
    assert_eq!(pair["basis"], "position");
    assert_eq!(pair["track"]["title"], "Help!");
    assert_eq!(json["decision"]["plan"]["catalog"], "qobuz");

    assert_eq!(json["strategy_results"][0]["strategy"], "byOrder");
    let strategies: Vec<&str> = json["strategy_results"]
        .as_array()
        .expect("strategy results array")
        .iter()
        .filter_map(|result| result["strategy"].as_str())
        .collect();
    assert_eq!(strategies, vec!["byOrder", "byTitle", "byDuration", "smart", "byTrackNumber"]);

    assert_eq!(json["attempts"][0]["catalog"], "qobuz");
    assert!(json["attempts"][0]["error"].is_null());
    assert_eq!(json["transitions"][0]["from"], "idle");
    assert_eq!(json["transitions"][0]["to"], "searching_album");
}

#[tokio::test]
async fn track_listing_failure_is_returned() {
    let qobuz = FakeCatalog::new(Catalog::Qobuz)
        .album("help", "The Beatles", "Help!", 3)
        .failing_tracks();
    let registry = ProviderRegistry::new().with(Arc::new(qobuz));

    let controller = AutoModeController::new(registry, &config(Catalog::Qobuz, true));
    let error = controller
        .run(&help_query(), &help_locals(), &NeverCancel)
        .await
        .expect_err("track listing fails");

    let AutoModeError::TrackListing {
        catalog, album_id, ..
    } = error;
    assert_eq!(catalog, Catalog::Qobuz);
    assert_eq!(album_id, "help");
}

#[tokio::test]
async fn cached_track_lists_skip_the_adapter() {
    let qobuz = Arc::new(
        FakeCatalog::new(Catalog::Qobuz)
            .album("help", "The Beatles", "Help!", 3)
            .tracks("help", help_tracks()),
    );
    let registry = ProviderRegistry::new().with(qobuz.clone());
    let cache = Arc::new(MokaLookupCache::new(&Default::default()));

    let controller =
        AutoModeController::new(registry, &config(Catalog::Qobuz, true)).with_cache(cache);
    for _ in 0..2 {
        let outcome = controller
            .run(&help_query(), &help_locals(), &NeverCancel)
            .await
            .expect("run succeeds");
        assert_eq!(outcome.decision.state(), AutoModeState::AutoSaved);
    }

    assert_eq!(qobuz.searches.load(Ordering::SeqCst), 2);
    assert_eq!(qobuz.track_listings.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn empty_folder_defers_without_querying() {
    let qobuz = Arc::new(FakeCatalog::new(Catalog::Qobuz).album("help", "The Beatles", "Help!", 3));
    let registry = ProviderRegistry::new().with(qobuz.clone());

    let controller = AutoModeController::new(registry, &config(Catalog::Qobuz, true));
    let outcome = controller
        .run(&help_query(), &[], &NeverCancel)
        .await
        .expect("run succeeds");

    assert_eq!(outcome.decision.state(), AutoModeState::DeferToInteractive);
    assert_eq!(qobuz.searches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn out_of_range_threshold_is_clamped() {
    let mut settings = config(Catalog::Qobuz, false);
    settings.automode.confidence_threshold = 0.2;
    let controller = AutoModeController::new(ProviderRegistry::new(), &settings);
    assert_eq!(controller.config().confidence_threshold, 0.5);
}
