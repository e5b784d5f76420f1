// SPDX-License-Identifier: GPL-3.0-or-later

//! Per-pair confidence between one local file and one catalog track.
//!
//! The level comes from the tolerance bands in [`ConfidenceBands`]; the
//! numeric score is only used to rank strategies against each other.

use crate::similarity::title_similarity;
use serde::Serialize;
use tagsync_config::ConfidenceBands;
use tagsync_domain::{LocalTrackFile, ProviderTrack};

/// Duration closeness assumed when either side has no duration.
const UNKNOWN_DURATION_CLOSENESS: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchConfidence {
    pub level: ConfidenceLevel,
    /// Blend of title similarity and duration closeness, in [0, 1].
    pub score: f64,
    pub title_similarity: f64,
    pub duration_delta_ms: Option<u64>,
}

/// Classify a (local, catalog) pairing.
pub fn assess(
    local: &LocalTrackFile,
    track: &ProviderTrack,
    bands: &ConfidenceBands,
) -> MatchConfidence {
    let title = title_similarity(&local.title, &track.title);
    let delta = duration_delta_ms(local, track);

    let within = |limit: u64| delta.is_some_and(|d| d <= limit);
    let level = if within(bands.high_duration_ms) && title >= bands.high_title_similarity {
        ConfidenceLevel::High
    } else if within(bands.medium_duration_ms) || title >= bands.medium_title_similarity {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    };

    let title_weight = bands.title_weight.clamp(0.0, 1.0);
    let score = (title_weight * title + (1.0 - title_weight) * duration_closeness(delta, bands))
        .clamp(0.0, 1.0);

    MatchConfidence {
        level,
        score,
        title_similarity: title,
        duration_delta_ms: delta,
    }
}

/// Absolute duration difference, or `None` when either duration is unknown.
pub fn duration_delta_ms(local: &LocalTrackFile, track: &ProviderTrack) -> Option<u64> {
    match (local.duration_ms, track.duration_ms) {
        (Some(left), Some(right)) => Some(left.abs_diff(right)),
        _ => None,
    }
}

/// `1 - delta / span`, floored at zero.
pub fn duration_closeness(delta: Option<u64>, bands: &ConfidenceBands) -> f64 {
    match delta {
        None => UNKNOWN_DURATION_CLOSENESS,
        Some(0) => 1.0,
        Some(_) if bands.duration_span_ms == 0 => 0.0,
        Some(delta) => (1.0 - delta as f64 / bands.duration_span_ms as f64).max(0.0),
    }
}
