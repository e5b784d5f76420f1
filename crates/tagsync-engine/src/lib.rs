// SPDX-License-Identifier: GPL-3.0-or-later

//! Matching engine: album scoring, track pairing and the automatic decision
//! automaton that drives them against one or more catalogs.

pub mod album_scoring;
pub mod auto_mode;
pub mod cache;
pub mod confidence;
pub mod genres;
pub mod provider;
pub mod similarity;
pub mod track_pairing;


pub use album_scoring::{AlbumCandidateScorer, AlbumScore, ScoredAlbum};
pub use auto_mode::{
    AlbumPhase, AlbumSelection, AutoModeController, AutoModeDecision, AutoModeError,
    AutoModeOutcome, AutoModeState, Cancellation, CatalogAttempt, NeverCancel, TaggingPlan,
    Transition,
};
pub use cache::{LookupCache, MokaLookupCache, NoCache, TrackListKey};
pub use confidence::{ConfidenceLevel, MatchConfidence};
pub use genres::merge_genres;
pub use provider::{FallbackChain, ProviderAdapter, ProviderError, ProviderRegistry};
pub use track_pairing::{PairingOutcome, SortStrategy, SortStrategyResult, TrackPair, TrackPairer};
