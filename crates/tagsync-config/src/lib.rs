// SPDX-License-Identifier: GPL-3.0-or-later
use std::path::Path;

use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tagsync_domain::{Catalog, GenreMode};
use tracing::{info, warn};

pub const MIN_CONFIDENCE_THRESHOLD: f64 = 0.5;
pub const MAX_CONFIDENCE_THRESHOLD: f64 = 1.0;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.80;

/// Settings that drive the automatic decision automaton.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoModeConfig {
    /// Minimum album score and aggregate track confidence for automatic decisions.
    pub confidence_threshold: f64,
    pub fallback_enabled: bool,
    /// Ask the tagging layer to also save cover art on auto-save.
    pub save_cover: bool,
    pub genre_mode: GenreMode,
    pub start_catalog: Catalog,
}

impl Default for AutoModeConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            fallback_enabled: true,
            save_cover: true,
            genre_mode: GenreMode::Merge,
            start_catalog: Catalog::Qobuz,
        }
    }
}

impl AutoModeConfig {
    /// Return a copy whose threshold lies in [0.5, 1.0].
    ///
    /// Non-finite thresholds fall back to the default.
    pub fn validated(&self) -> Self {
        let threshold = self.confidence_threshold;
        let confidence_threshold = if !threshold.is_finite() {
            warn!(target: "config", threshold, "confidence threshold is not finite, using default {DEFAULT_CONFIDENCE_THRESHOLD}");
            DEFAULT_CONFIDENCE_THRESHOLD
        } else if !(MIN_CONFIDENCE_THRESHOLD..=MAX_CONFIDENCE_THRESHOLD).contains(&threshold) {
            let clamped = threshold.clamp(MIN_CONFIDENCE_THRESHOLD, MAX_CONFIDENCE_THRESHOLD);
            warn!(target: "config", threshold, clamped, "confidence threshold out of [0.5, 1.0] range, clamping");
            clamped
        } else {
            threshold
        };

        Self {
            confidence_threshold,
            ..self.clone()
        }
    }
}

/// Duration and title tolerance bands for per-track confidence.
///
/// High: delta <= `high_duration_ms` and title >= `high_title_similarity`.
/// Medium: delta <= `medium_duration_ms` or title >= `medium_title_similarity`.
/// Low: anything else. An unknown duration never satisfies a duration band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBands {
    pub high_duration_ms: u64,
    pub medium_duration_ms: u64,
    pub high_title_similarity: f64,
    pub medium_title_similarity: f64,
    /// Share of the numeric pair score taken by title similarity; the rest is duration closeness.
    pub title_weight: f64,
    /// Delta at which duration closeness reaches zero.
    pub duration_span_ms: u64,
}

impl Default for ConfidenceBands {
    fn default() -> Self {
        Self {
            high_duration_ms: 5_000,
            medium_duration_ms: 15_000,
            high_title_similarity: 0.80,
            medium_title_similarity: 0.50,
            title_weight: 0.70,
            duration_span_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Drop bracketed edition markers such as "(Remastered)" before album scoring.
    pub strip_edition_markers: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_entries: 1_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub automode: AutoModeConfig,
    pub confidence: ConfidenceBands,
    pub scoring: ScoringConfig,
    pub cache: CacheConfig,
    pub telemetry: TelemetryConfig,
}

/// Load configuration from defaults, optional TOML file, and environment overrides (prefix: TAGSYNC_).
pub fn load(config_path: Option<&Path>) -> Result<AppConfig> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(path) = config_path {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("TAGSYNC_").split("__"));

    let mut config: AppConfig = figment.extract()?;
    config.automode = config.automode.validated();
    info!(
        target: "config",
        threshold = config.automode.confidence_threshold,
        fallback = config.automode.fallback_enabled,
        start_catalog = %config.automode.start_catalog,
        "configuration loaded"
    );
    Ok(config)
}
