// SPDX-License-Identifier: GPL-3.0-or-later

//! Weighted album-level candidate scoring.
//!
//! `total = 0.30 * artist + 0.40 * album + 0.30 * track_count`, every term in
//! `[0, 1]`. Deciding whether a score is good enough is left to the caller.

use crate::similarity::{jaccard_similarity, strip_edition_markers};
use serde::Serialize;
use tagsync_config::ScoringConfig;
use tagsync_domain::{AlbumQuery, ProviderAlbum};
use tracing::debug;

pub const ARTIST_WEIGHT: f64 = 0.30;
pub const ALBUM_WEIGHT: f64 = 0.40;
pub const TRACK_COUNT_WEIGHT: f64 = 0.30;

/// Score how well a candidate's track count agrees with the local folder.
///
/// Exact → 1.0, off by 1–2 → 0.8, off by 3–5 → 0.5, further → 0.0.
pub fn track_count_score(candidate_count: u32, expected_count: u32) -> f64 {
    match candidate_count.abs_diff(expected_count) {
        0 => 1.0,
        1..=2 => 0.8,
        3..=5 => 0.5,
        _ => 0.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AlbumScore {
    pub artist_similarity: f64,
    pub album_similarity: f64,
    pub track_count_score: f64,
    pub total: f64,
}

impl AlbumScore {
    pub fn summary(&self) -> String {
        format!(
            "total:{:.3} [artist:{:.0}%, album:{:.0}%, tracks:{:.0}%]",
            self.total,
            self.artist_similarity * 100.0,
            self.album_similarity * 100.0,
            self.track_count_score * 100.0
        )
    }
}

/// A candidate with its score and its position in the list the catalog returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredAlbum {
    pub index: usize,
    pub album: ProviderAlbum,
    pub score: AlbumScore,
}

#[derive(Debug, Clone, Default)]
pub struct AlbumCandidateScorer {
    strip_edition_markers: bool,
}

impl AlbumCandidateScorer {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            strip_edition_markers: config.strip_edition_markers,
        }
    }

    pub fn score(
        &self,
        query: &AlbumQuery,
        expected_track_count: u32,
        candidate: &ProviderAlbum,
    ) -> AlbumScore {
        let artist_similarity = jaccard_similarity(&query.artist, &candidate.artist_name);
        let album_similarity = if self.strip_edition_markers {
            jaccard_similarity(
                &strip_edition_markers(&query.album),
                &strip_edition_markers(&candidate.name),
            )
        } else {
            jaccard_similarity(&query.album, &candidate.name)
        };
        let track_count_score = track_count_score(candidate.track_count, expected_track_count);

        let total = (ARTIST_WEIGHT * artist_similarity
            + ALBUM_WEIGHT * album_similarity
            + TRACK_COUNT_WEIGHT * track_count_score)
            .clamp(0.0, 1.0);

        AlbumScore {
            artist_similarity,
            album_similarity,
            track_count_score,
            total,
        }
    }

    /// Score every candidate, keeping the catalog's order.
    pub fn score_all(
        &self,
        query: &AlbumQuery,
        expected_track_count: u32,
        candidates: &[ProviderAlbum],
    ) -> Vec<ScoredAlbum> {
        candidates
            .iter()
            .enumerate()
            .map(|(index, album)| ScoredAlbum {
                index,
                album: album.clone(),
                score: self.score(query, expected_track_count, album),
            })
            .collect()
    }

    pub fn best(
        &self,
        query: &AlbumQuery,
        expected_track_count: u32,
        candidates: &[ProviderAlbum],
    ) -> Option<ScoredAlbum> {
        let scored = self.score_all(query, expected_track_count, candidates);
        pick_best(&scored).cloned()
    }
}

/// Highest total wins; equal totals keep the lowest original index.
pub fn pick_best(scored: &[ScoredAlbum]) -> Option<&ScoredAlbum> {
    let mut best: Option<&ScoredAlbum> = None;
    for candidate in scored {
        match best {
            Some(current) if candidate.score.total > current.score.total => best = Some(candidate),
            Some(current) if candidate.score.total == current.score.total => {
                debug!(
                    target: "album_scoring",
                    kept = %current.album.id,
                    tied = %candidate.album.id,
                    score = current.score.total,
                    "tied album candidates, keeping the earlier one"
                );
            }
            Some(_) => {}
            None => best = Some(candidate),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagsync_domain::Catalog;

    fn album(id: &str, artist: &str, name: &str, tracks: u32) -> ProviderAlbum {
        ProviderAlbum::new(Catalog::Spotify, id, artist, name, tracks)
    }

    #[test]
    fn track_count_anchor_values() {
        assert_eq!(track_count_score(14, 14), 1.0);
        assert_eq!(track_count_score(12, 14), 0.8);
        assert_eq!(track_count_score(16, 14), 0.8);
        assert_eq!(track_count_score(9, 14), 0.5);
        assert_eq!(track_count_score(8, 14), 0.0);
        assert_eq!(track_count_score(20, 14), 0.0);
    }

    #[test]
    fn exact_candidate_scores_one() {
        let scorer = AlbumCandidateScorer::default();
        let query = AlbumQuery::new("The Beatles", "Help!");
        let score = scorer.score(&query, 14, &album("a", "The Beatles", "Help!", 14));

        assert!((score.total - 1.0).abs() < 1e-12);
        assert_eq!(score.artist_similarity, 1.0);
        assert_eq!(score.album_similarity, 1.0);
        assert_eq!(score.track_count_score, 1.0);
    }

    #[test]
    fn weights_apply_per_component() {
        let scorer = AlbumCandidateScorer::default();
        let query = AlbumQuery::new("The Beatles", "Help!");
        // artist exact, album unrelated, track count exact
        let score = scorer.score(&query, 14, &album("a", "The Beatles", "Revolver", 14));
        assert!((score.total - 0.60).abs() < 1e-12);
    }

    #[test]
    fn ties_keep_lowest_index() {
        let scorer = AlbumCandidateScorer::default();
        let query = AlbumQuery::new("The Beatles", "Help!");
        let candidates = vec![
            album("first", "The Beatles", "Help!", 14),
            album("second", "The Beatles", "Help!", 14),
        ];

        let best = scorer.best(&query, 14, &candidates).expect("candidate expected");
        assert_eq!(best.album.id, "first");
        assert_eq!(best.index, 0);
    }

    #[test]
    fn best_prefers_higher_score_regardless_of_position() {
        let scorer = AlbumCandidateScorer::default();
        let query = AlbumQuery::new("The Beatles", "Help!");
        let candidates = vec![
            album("deluxe", "The Beatles", "Help! Deluxe", 30),
            album("plain", "The Beatles", "Help!", 14),
        ];

        let best = scorer.best(&query, 14, &candidates).expect("candidate expected");
        assert_eq!(best.album.id, "plain");
        assert_eq!(best.index, 1);
    }

    #[test]
    fn empty_candidate_list_has_no_best() {
        let scorer = AlbumCandidateScorer::default();
        assert!(scorer.best(&AlbumQuery::new("x", "y"), 3, &[]).is_none());
    }

    #[test]
    fn edition_markers_are_literal_unless_enabled() {
        let query = AlbumQuery::new("The Beatles", "Abbey Road");
        let candidate = album("a", "The Beatles", "Abbey Road (Remastered 2009)", 17);

        let literal = AlbumCandidateScorer::default().score(&query, 17, &candidate);
        assert!(literal.album_similarity < 1.0);

        let stripping = AlbumCandidateScorer::new(&ScoringConfig {
            strip_edition_markers: true,
        })
        .score(&query, 17, &candidate);
        assert_eq!(stripping.album_similarity, 1.0);
    }

    #[test]
    fn scoring_is_deterministic() {
        let scorer = AlbumCandidateScorer::default();
        let query = AlbumQuery::new("Miles Davis", "Kind of Blue");
        let candidate = album("a", "Miles Davis Quintet", "Kind of Blue (Legacy)", 6);
        let first = scorer.score(&query, 5, &candidate);
        let second = scorer.score(&query, 5, &candidate);
        assert_eq!(first.total.to_bits(), second.total.to_bits());
    }
}
