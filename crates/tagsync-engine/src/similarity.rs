// SPDX-License-Identifier: GPL-3.0-or-later

//! Text similarity primitives shared by album scoring and track pairing.
//!
//! All functions are pure, case-insensitive (ASCII lowering only) and return
//! a value in `[0.0, 1.0]`.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};

lazy_static! {
    static ref EDITION_MARKER_REGEX: Regex = Regex::new(
        r"(?i)\s*[\(\[][^\)\]]*\b(?:remaster(?:ed)?|deluxe|edition|expanded|anniversary|bonus|mono|stereo|version)\b[^\)\]]*[\)\]]"
    )
    .expect("edition marker regex is valid");
}

/// Position-independent character overlap divided by the longer length.
///
/// `"listen"` and `"silent"` score 1.0: the multiset of characters is the same.
pub fn char_similarity(left: &str, right: &str) -> f64 {
    let left: Vec<char> = left.chars().map(|c| c.to_ascii_lowercase()).collect();
    let right: Vec<char> = right.chars().map(|c| c.to_ascii_lowercase()).collect();

    match (left.is_empty(), right.is_empty()) {
        (true, true) => return 1.0,
        (true, false) | (false, true) => return 0.0,
        _ => {}
    }

    let mut remaining: HashMap<char, usize> = HashMap::new();
    for c in &left {
        *remaining.entry(*c).or_default() += 1;
    }

    let matched = right
        .iter()
        .filter(|c| match remaining.get_mut(*c) {
            Some(count) if *count > 0 => {
                *count -= 1;
                true
            }
            _ => false,
        })
        .count();

    matched as f64 / left.len().max(right.len()) as f64
}

/// Intersection over union of the lowercase word tokens of both strings.
///
/// Tokens are split on anything that is not alphanumeric, so punctuation and
/// whitespace never contribute.
pub fn jaccard_similarity(left: &str, right: &str) -> f64 {
    let left = tokenize(left);
    let right = tokenize(right);

    match (left.is_empty(), right.is_empty()) {
        (true, true) => return 1.0,
        (true, false) | (false, true) => return 0.0,
        _ => {}
    }

    let intersection = left.intersection(&right).count();
    let union = left.union(&right).count();
    intersection as f64 / union as f64
}

/// Similarity used for track titles: an even blend of character and token overlap.
pub fn title_similarity(left: &str, right: &str) -> f64 {
    (0.5 * char_similarity(left, right) + 0.5 * jaccard_similarity(left, right)).clamp(0.0, 1.0)
}

/// Remove bracketed edition markers such as `(Remastered 2009)` or `[Deluxe Edition]`.
pub fn strip_edition_markers(name: &str) -> String {
    EDITION_MARKER_REGEX.replace_all(name, "").trim().to_string()
}

fn tokenize(value: &str) -> BTreeSet<String> {
    value
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}
