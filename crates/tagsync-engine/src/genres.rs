// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::HashSet;
use tagsync_domain::GenreMode;

/// Combine genres already on disk with genres offered by a catalog.
///
/// Comparison is case-insensitive and the first-seen spelling wins. Entries
/// are trimmed and blanks are dropped.
pub fn merge_genres(existing: &[String], incoming: &[String], mode: GenreMode) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();

    let sources: [&[String]; 2] = match mode {
        GenreMode::Replace => [incoming, &[]],
        GenreMode::Merge => [existing, incoming],
    };

    for genre in sources.into_iter().flatten() {
        let genre = genre.trim();
        if genre.is_empty() {
            continue;
        }
        if seen.insert(genre.to_lowercase()) {
            merged.push(genre.to_string());
        }
    }

    merged
}
