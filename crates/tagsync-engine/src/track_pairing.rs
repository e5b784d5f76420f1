// SPDX-License-Identifier: GPL-3.0-or-later

//! Local file ↔ catalog track pairing.
//!
//! Several sort strategies each propose a 1:1 partial pairing; every proposal
//! is scored with [`confidence::assess`](crate::confidence::assess) and the
//! best one is kept:
//!
//! 1. most High-confidence pairs,
//! 2. then most complete pairs,
//! 3. then highest aggregate confidence,
//! 4. then the fixed priority order of [`SortStrategy::PRIORITY`].
//!
//! The aggregate is a mean over complete pairs only, so it is never compared
//! between results that paired a different number of files.
//!
//! `ByTitle` and `ByDuration` are greedy: the best remaining edge is taken
//! until one side runs out. This is not an optimal bipartite assignment.
//!
//! Every strategy result lists one pair per local file in on-disk order,
//! followed by the catalog tracks nobody claimed, so no input is ever dropped.

use crate::confidence::{assess, duration_delta_ms, ConfidenceLevel};
use crate::similarity::title_similarity;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tagsync_config::ConfidenceBands;
use tagsync_domain::{LocalTrackFile, ProviderTrack};
use tracing::{debug, info};

/// Aggregate confidences closer than this are treated as equal.
const AGGREGATE_TIE_EPSILON: f64 = 1e-9;

/// Roman tokens above this are words ("MIX", "CD"), not movement numbers.
const MAX_ROMAN_ORDINAL: u32 = 100;

lazy_static! {
    // a Roman numeral only counts when it closes the title or is followed by `.`, `:` or `)`
    static ref ORDINAL_REGEX: Regex = Regex::new(r"\b(?:(\d{1,4})\b|([IVXLCDM]+)(?:[.:)]|\s*$))")
        .expect("ordinal regex is valid");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SortStrategy {
    #[serde(rename = "byOrder")]
    ByOrder,
    #[serde(rename = "byTitle")]
    ByTitle,
    #[serde(rename = "byDuration")]
    ByDuration,
    #[serde(rename = "smart")]
    Smart,
    #[serde(rename = "byTrackNumber")]
    ByTrackNumber,
}

impl SortStrategy {
    /// Evaluation order, which is also the final tie-break.
    pub const PRIORITY: [SortStrategy; 5] = [
        SortStrategy::ByOrder,
        SortStrategy::ByTitle,
        SortStrategy::ByDuration,
        SortStrategy::Smart,
        SortStrategy::ByTrackNumber,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ByOrder => "byOrder",
            Self::ByTitle => "byTitle",
            Self::ByDuration => "byDuration",
            Self::Smart => "smart",
            Self::ByTrackNumber => "byTrackNumber",
        }
    }
}

impl std::fmt::Display for SortStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Why two items ended up in the same pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchBasis {
    Position,
    Title,
    Duration,
    Ordinal,
    TrackNumber,
    /// One side is absent.
    Unmatched,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackPair {
    pub local: Option<LocalTrackFile>,
    pub track: Option<ProviderTrack>,
    pub level: ConfidenceLevel,
    pub score: f64,
    pub basis: MatchBasis,
}

impl TrackPair {
    fn unmatched(local: Option<LocalTrackFile>, track: Option<ProviderTrack>) -> Self {
        Self {
            local,
            track,
            level: ConfidenceLevel::Low,
            score: 0.0,
            basis: MatchBasis::Unmatched,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.local.is_some() && self.track.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SortStrategyResult {
    pub strategy: SortStrategy,
    pub pairs: Vec<TrackPair>,
    pub high_count: usize,
    /// Mean score over complete pairs, in [0, 1]; 0 when nothing was paired.
    pub aggregate_confidence: f64,
}

impl SortStrategyResult {
    pub fn complete_pairs(&self) -> impl Iterator<Item = &TrackPair> {
        self.pairs.iter().filter(|pair| pair.is_complete())
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} high, {:.1}% aggregate over {} pairs",
            self.strategy,
            self.high_count,
            self.aggregate_confidence * 100.0,
            self.complete_pairs().count()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairingOutcome {
    pub best: SortStrategyResult,
    /// Every evaluated strategy, in priority order.
    pub results: Vec<SortStrategyResult>,
}

/// Proposed catalog index (and basis) per local file, in on-disk order.
type Assignment = Vec<Option<(usize, MatchBasis)>>;

#[derive(Debug, Clone, Default)]
pub struct TrackPairer {
    bands: ConfidenceBands,
}

impl TrackPairer {
    pub fn new(bands: ConfidenceBands) -> Self {
        Self { bands }
    }

    /// Run every strategy and keep the best result.
    pub fn pair(&self, locals: &[LocalTrackFile], tracks: &[ProviderTrack]) -> PairingOutcome {
        let locals = on_disk_order(locals);
        let results: Vec<SortStrategyResult> = SortStrategy::PRIORITY
            .iter()
            .map(|strategy| self.evaluate(*strategy, &locals, tracks))
            .collect();

        let mut best = 0;
        for (index, candidate) in results.iter().enumerate().skip(1) {
            let current = &results[best];
            let counts = (candidate.high_count, candidate.complete_pairs().count())
                .cmp(&(current.high_count, current.complete_pairs().count()));
            let diff = candidate.aggregate_confidence - current.aggregate_confidence;
            if counts.is_gt() || (counts.is_eq() && diff > AGGREGATE_TIE_EPSILON) {
                best = index;
            } else if counts.is_eq() && diff.abs() <= AGGREGATE_TIE_EPSILON {
                debug!(
                    target: "pairing",
                    kept = %current.strategy,
                    tied = %candidate.strategy,
                    high = current.high_count,
                    aggregate = current.aggregate_confidence,
                    "strategies tied, keeping higher priority"
                );
            }
        }

        let best = results[best].clone();
        info!(
            target: "pairing",
            strategy = %best.strategy,
            high = best.high_count,
            aggregate = best.aggregate_confidence,
            locals = locals.len(),
            tracks = tracks.len(),
            "selected pairing strategy"
        );

        PairingOutcome { best, results }
    }

    /// Run a single strategy.
    pub fn run_strategy(
        &self,
        strategy: SortStrategy,
        locals: &[LocalTrackFile],
        tracks: &[ProviderTrack],
    ) -> SortStrategyResult {
        self.evaluate(strategy, &on_disk_order(locals), tracks)
    }

    fn evaluate(
        &self,
        strategy: SortStrategy,
        locals: &[LocalTrackFile],
        tracks: &[ProviderTrack],
    ) -> SortStrategyResult {
        let assignment = match strategy {
            SortStrategy::ByOrder => by_order(locals.len(), tracks.len()),
            SortStrategy::ByTitle => greedy(locals.len(), tracks.len(), MatchBasis::Title, |i, j| {
                title_similarity(&locals[i].title, &tracks[j].title)
            }),
            SortStrategy::ByDuration => {
                greedy(locals.len(), tracks.len(), MatchBasis::Duration, |i, j| {
                    match duration_delta_ms(&locals[i], &tracks[j]) {
                        Some(delta) => -(delta as f64),
                        None => f64::NEG_INFINITY,
                    }
                })
            }
            SortStrategy::Smart => smart(locals, tracks),
            SortStrategy::ByTrackNumber => by_track_number(locals, tracks),
        };

        let result = self.assemble(strategy, locals, tracks, &assignment);
        debug!(target: "pairing", "{}", result.summary());
        result
    }

    fn assemble(
        &self,
        strategy: SortStrategy,
        locals: &[LocalTrackFile],
        tracks: &[ProviderTrack],
        assignment: &Assignment,
    ) -> SortStrategyResult {
        let mut claimed = vec![false; tracks.len()];
        let mut pairs = Vec::with_capacity(locals.len() + tracks.len());

        for (local, slot) in locals.iter().zip(assignment) {
            match slot {
                Some((j, basis)) => {
                    claimed[*j] = true;
                    let confidence = assess(local, &tracks[*j], &self.bands);
                    pairs.push(TrackPair {
                        local: Some(local.clone()),
                        track: Some(tracks[*j].clone()),
                        level: confidence.level,
                        score: confidence.score,
                        basis: *basis,
                    });
                }
                None => pairs.push(TrackPair::unmatched(Some(local.clone()), None)),
            }
        }

        for (track, _) in tracks.iter().zip(&claimed).filter(|(_, claimed)| !**claimed) {
            pairs.push(TrackPair::unmatched(None, Some(track.clone())));
        }

        let complete: Vec<&TrackPair> = pairs.iter().filter(|pair| pair.is_complete()).collect();
        let high_count = complete
            .iter()
            .filter(|pair| pair.level == ConfidenceLevel::High)
            .count();
        let aggregate_confidence = if complete.is_empty() {
            0.0
        } else {
            complete.iter().map(|pair| pair.score).sum::<f64>() / complete.len() as f64
        };

        SortStrategyResult {
            strategy,
            pairs,
            high_count,
            aggregate_confidence,
        }
    }
}

fn on_disk_order(locals: &[LocalTrackFile]) -> Vec<LocalTrackFile> {
    let mut ordered = locals.to_vec();
    ordered.sort_by_key(|local| local.index);
    ordered
}

fn by_order(local_count: usize, track_count: usize) -> Assignment {
    (0..local_count)
        .map(|i| (i < track_count).then_some((i, MatchBasis::Position)))
        .collect()
}

/// Repeatedly take the highest-weight edge whose endpoints are both free.
///
/// Equal weights fall back to on-disk position, then catalog position.
fn greedy(
    local_count: usize,
    track_count: usize,
    basis: MatchBasis,
    weight: impl Fn(usize, usize) -> f64,
) -> Assignment {
    let mut edges: Vec<(f64, usize, usize)> = (0..local_count)
        .flat_map(|i| (0..track_count).map(move |j| (i, j)))
        .map(|(i, j)| (weight(i, j), i, j))
        .collect();
    edges.sort_by(|left, right| {
        right
            .0
            .total_cmp(&left.0)
            .then(left.1.cmp(&right.1))
            .then(left.2.cmp(&right.2))
    });

    let mut assignment: Assignment = vec![None; local_count];
    let mut claimed = vec![false; track_count];
    let mut remaining = local_count.min(track_count);

    for (_, i, j) in edges {
        if remaining == 0 {
            break;
        }
        if assignment[i].is_some() || claimed[j] {
            continue;
        }
        assignment[i] = Some((j, basis));
        claimed[j] = true;
        remaining -= 1;
    }

    assignment
}

/// Pair by a shared ordinal, then hand out what is left by position.
fn smart(locals: &[LocalTrackFile], tracks: &[ProviderTrack]) -> Assignment {
    let local_ordinals = extract_ordinals(&locals.iter().map(|l| l.title.as_str()).collect::<Vec<_>>());
    let track_ordinals = extract_ordinals(&tracks.iter().map(|t| t.title.as_str()).collect::<Vec<_>>());

    let mut assignment: Assignment = vec![None; locals.len()];
    let mut claimed = vec![false; tracks.len()];

    for (i, ordinal) in local_ordinals.iter().enumerate() {
        let Some(ordinal) = ordinal else {
            continue;
        };
        if let Some(j) = (0..tracks.len()).find(|&j| !claimed[j] && track_ordinals[j] == Some(*ordinal)) {
            assignment[i] = Some((j, MatchBasis::Ordinal));
            claimed[j] = true;
        }
    }

    fill_by_position(&mut assignment, &claimed);
    assignment
}

/// Pair by (disc, track) tag; untagged or unmatched files take what is left by position.
fn by_track_number(locals: &[LocalTrackFile], tracks: &[ProviderTrack]) -> Assignment {
    let mut claimed = vec![false; tracks.len()];

    let mut assignment: Assignment = locals
        .iter()
        .map(|local| {
            let number = local.track_number?;
            let disc = local.disc_number.unwrap_or(1);
            let j = (0..tracks.len()).find(|&j| {
                !claimed[j] && tracks[j].disc_number == disc && tracks[j].track_number == number
            })?;
            claimed[j] = true;
            Some((j, MatchBasis::TrackNumber))
        })
        .collect();

    fill_by_position(&mut assignment, &claimed);
    assignment
}

/// Hand free catalog tracks, in catalog order, to unassigned files in on-disk order.
fn fill_by_position(assignment: &mut Assignment, claimed: &[bool]) {
    let mut free_tracks = (0..claimed.len()).filter(|&j| !claimed[j]);
    for slot in assignment.iter_mut().filter(|slot| slot.is_none()) {
        match free_tracks.next() {
            Some(j) => *slot = Some((j, MatchBasis::Position)),
            None => break,
        }
    }
}

/// Ordinal of each title once the boilerplate prefix shared by all of them is removed.
pub fn extract_ordinals(titles: &[&str]) -> Vec<Option<u32>> {
    let prefix_len = if titles.len() >= 2 {
        common_prefix_len(titles)
    } else {
        0
    };

    titles
        .iter()
        .map(|title| first_ordinal(title.get(prefix_len..).unwrap_or(title)))
        .collect()
}

/// Byte length of the shared case-insensitive prefix, cut back to end on a
/// non-alphanumeric character so a number is never split.
fn common_prefix_len(titles: &[&str]) -> usize {
    let Some((first, rest)) = titles.split_first() else {
        return 0;
    };

    let mut len = first.len();
    for title in rest {
        len = first[..len]
            .char_indices()
            .zip(title.chars())
            .take_while(|((_, left), right)| left.eq_ignore_ascii_case(right))
            .last()
            .map(|((index, c), _)| index + c.len_utf8())
            .unwrap_or(0);
    }

    first[..len]
        .char_indices()
        .rev()
        .find(|(_, c)| !c.is_alphanumeric())
        .map(|(index, c)| index + c.len_utf8())
        .unwrap_or(0)
}

fn first_ordinal(text: &str) -> Option<u32> {
    ORDINAL_REGEX.captures_iter(text).find_map(|captures| {
        if let Some(digits) = captures.get(1) {
            return digits.as_str().parse().ok();
        }
        captures
            .get(2)
            .and_then(|roman| parse_roman(roman.as_str()))
            .filter(|value| *value <= MAX_ROMAN_ORDINAL)
    })
}

/// Parse a canonical uppercase Roman numeral; non-canonical forms such as `IIII` are rejected.
fn parse_roman(value: &str) -> Option<u32> {
    let digit = |c: char| match c {
        'I' => Some(1),
        'V' => Some(5),
        'X' => Some(10),
        'L' => Some(50),
        'C' => Some(100),
        'D' => Some(500),
        'M' => Some(1000),
        _ => None,
    };

    let digits: Vec<u32> = value.chars().map(digit).collect::<Option<_>>()?;
    let mut total = 0;
    for (index, current) in digits.iter().enumerate() {
        match digits.get(index + 1) {
            Some(next) if next > current => total -= *current as i64,
            _ => total += *current as i64,
        }
    }

    let total = u32::try_from(total).ok().filter(|n| (1..4000).contains(n))?;
    (to_roman(total) == value).then_some(total)
}

fn to_roman(mut value: u32) -> String {
    const TABLE: [(u32, &str); 13] = [
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];

    let mut out = String::new();
    for (amount, symbol) in TABLE {
        while value >= amount {
            out.push_str(symbol);
            value -= amount;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roman_numerals_round_trip_canonical_forms_only() {
        assert_eq!(parse_roman("I"), Some(1));
        assert_eq!(parse_roman("IV"), Some(4));
        assert_eq!(parse_roman("XIV"), Some(14));
        assert_eq!(parse_roman("MCMLXV"), Some(1965));
        assert_eq!(parse_roman("IIII"), None);
        assert_eq!(parse_roman("VX"), None);
    }

    #[test]
    fn common_prefix_backs_off_to_word_boundary() {
        assert_eq!(common_prefix_len(&["Variation 1", "Variation 10"]), "Variation ".len());
        assert_eq!(common_prefix_len(&["Part I", "Part II"]), "Part ".len());
        assert_eq!(common_prefix_len(&["Alpha", "Beta"]), 0);
    }

    #[test]
    fn ordinals_follow_shared_boilerplate() {
        let ordinals = extract_ordinals(&[
            "Goldberg Variations, BWV 988: Variatio 1. a 1 Clav.",
            "Goldberg Variations, BWV 988: Variatio 2. a 1 Clav.",
            "Goldberg Variations, BWV 988: Variatio 13. a 2 Clav.",
        ]);
        assert_eq!(ordinals, vec![Some(1), Some(2), Some(13)]);

        let movements = extract_ordinals(&[
            "Symphony No. 5: I. Allegro con brio",
            "Symphony No. 5: II. Andante con moto",
            "Symphony No. 5: III. Scherzo",
        ]);
        assert_eq!(movements, vec![Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn ordinals_missing_when_title_has_no_number() {
        assert_eq!(extract_ordinals(&["Yesterday", "Help!"]), vec![None, None]);
        assert_eq!(extract_ordinals(&["Track 7"]), vec![Some(7)]);
    }

    #[test]
    fn roman_ordinals_need_a_closing_position() {
        assert_eq!(extract_ordinals(&["I Feel Fine", "She's a Woman"]), vec![None, None]);
        assert_eq!(extract_ordinals(&["Part I", "Part II"]), vec![Some(1), Some(2)]);
        assert_eq!(extract_ordinals(&["Suite (IV)"]), vec![Some(4)]);
        assert_eq!(extract_ordinals(&["Club MIX"]), vec![None]);
        assert_eq!(extract_ordinals(&["Bonus CD"]), vec![None]);
    }

    #[test]
    fn by_track_number_falls_back_to_position_for_untagged_files() {
        let locals = vec![
            LocalTrackFile::new("/a/1.flac", 0, "A").with_position(1, 2),
            LocalTrackFile::new("/a/2.flac", 1, "B"),
            LocalTrackFile::new("/a/3.flac", 2, "C"),
        ];
        let tracks = vec![
            ProviderTrack::new("t1", 1, "B"),
            ProviderTrack::new("t2", 2, "A"),
            ProviderTrack::new("t3", 3, "C"),
        ];

        assert_eq!(
            by_track_number(&locals, &tracks),
            vec![
                Some((1, MatchBasis::TrackNumber)),
                Some((0, MatchBasis::Position)),
                Some((2, MatchBasis::Position)),
            ]
        );
    }

    #[test]
    fn greedy_takes_heaviest_edges_first() {
        let weights = [[0.9, 0.1], [0.95, 0.8]];
        let assignment = greedy(2, 2, MatchBasis::Title, |i, j| weights[i][j]);
        // (1,0) goes first, leaving (0,1): greedy, not optimal
        assert_eq!(assignment, vec![Some((1, MatchBasis::Title)), Some((0, MatchBasis::Title))]);
    }

    #[test]
    fn by_order_leaves_surplus_unassigned() {
        assert_eq!(
            by_order(3, 2),
            vec![Some((0, MatchBasis::Position)), Some((1, MatchBasis::Position)), None]
        );
    }
}
