// SPDX-License-Identifier: GPL-3.0-or-later
use chrono::{DateTime, Datelike, NaiveDate};
use serde::{de::IgnoredAny, Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

// ============================================================================
// Enums
// ============================================================================

/// External metadata catalogs a folder can be matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Catalog {
    Qobuz,
    Spotify,
    Discogs,
    MusicBrainz,
}

impl Catalog {
    pub const ALL: [Catalog; 4] = [
        Catalog::Qobuz,
        Catalog::Spotify,
        Catalog::Discogs,
        Catalog::MusicBrainz,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qobuz => "qobuz",
            Self::Spotify => "spotify",
            Self::Discogs => "discogs",
            Self::MusicBrainz => "musicbrainz",
        }
    }
}

impl std::fmt::Display for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Qobuz => write!(f, "Qobuz"),
            Self::Spotify => write!(f, "Spotify"),
            Self::Discogs => write!(f, "Discogs"),
            Self::MusicBrainz => write!(f, "MusicBrainz"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown catalog: {0}")]
pub struct UnknownCatalog(pub String);

impl FromStr for Catalog {
    type Err = UnknownCatalog;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "qobuz" => Ok(Self::Qobuz),
            "spotify" => Ok(Self::Spotify),
            "discogs" => Ok(Self::Discogs),
            "musicbrainz" | "mb" => Ok(Self::MusicBrainz),
            _ => Err(UnknownCatalog(value.to_string())),
        }
    }
}

/// How incoming catalog genres combine with genres already tagged on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenreMode {
    Replace,
    #[default]
    Merge,
}

impl std::fmt::Display for GenreMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Replace => write!(f, "replace"),
            Self::Merge => write!(f, "merge"),
        }
    }
}

// ============================================================================
// Release dates
// ============================================================================

/// A release date with year, month or day precision.
///
/// Catalogs disagree on precision (`1965`, `1965-08`, `1965-08-06`,
/// `1965-08-06T00:00:00Z`), so only the parts that were present are kept.
/// Serialized as its ISO 8601 string form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReleaseDate {
    pub year: i32,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

impl ReleaseDate {
    pub fn new(year: i32, month: Option<u32>, day: Option<u32>) -> Self {
        Self { year, month, day }
    }

    /// Parse `YYYY`, `YYYY-MM`, `YYYY-MM-DD` (or `/` separated) and RFC 3339 timestamps.
    ///
    /// Returns `None` for anything else, or when a component is out of range.
    pub fn parse_str(value: &str) -> Option<Self> {
        let value = value.trim();

        if value.len() > 10 && value.contains('T') {
            let date = DateTime::parse_from_rfc3339(value).ok()?.date_naive();
            return Self::checked(date.year(), Some(date.month()), Some(date.day()));
        }

        let delimiter = if value.contains('/') { '/' } else { '-' };
        let mut parts = value.split(delimiter);
        let year = parts.next()?.parse().ok()?;
        let month = match parts.next() {
            Some(part) => Some(part.parse().ok()?),
            None => None,
        };
        let day = match parts.next() {
            Some(part) => Some(part.parse().ok()?),
            None => None,
        };
        if parts.next().is_some() || (day.is_some() && month.is_none()) {
            return None;
        }

        Self::checked(year, month, day)
    }

    fn checked(year: i32, month: Option<u32>, day: Option<u32>) -> Option<Self> {
        if !(1900..=2100).contains(&year) {
            return None;
        }
        if let Some(month) = month {
            if !(1..=12).contains(&month) {
                return None;
            }
            if let Some(day) = day {
                NaiveDate::from_ymd_opt(year, month, day)?;
            }
        }
        Some(Self { year, month, day })
    }

    pub fn to_iso8601(&self) -> String {
        match (self.month, self.day) {
            (Some(m), Some(d)) => format!("{:04}-{:02}-{:02}", self.year, m, d),
            (Some(m), None) => format!("{:04}-{:02}", self.year, m),
            (None, _) => format!("{:04}", self.year),
        }
    }
}

impl std::fmt::Display for ReleaseDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_iso8601())
    }
}

impl TryFrom<String> for ReleaseDate {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse_str(&value).ok_or_else(|| format!("invalid release date: {value}"))
    }
}

impl From<ReleaseDate> for String {
    fn from(value: ReleaseDate) -> Self {
        value.to_iso8601()
    }
}

/// `deserialize_with` helper for catalog payloads: a date that does not parse
/// becomes `None` instead of failing the whole record.
pub fn deserialize_release_date_lenient<'de, D>(
    deserializer: D,
) -> Result<Option<ReleaseDate>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawReleaseDate {
        Text(String),
        Year(i64),
        Other(IgnoredAny),
    }

    let text = match Option::<RawReleaseDate>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(RawReleaseDate::Text(text)) if text.trim().is_empty() => return Ok(None),
        Some(RawReleaseDate::Text(text)) => text,
        Some(RawReleaseDate::Year(year)) => year.to_string(),
        Some(RawReleaseDate::Other(_)) => {
            warn!(target: "domain", "ignoring release date that is neither text nor a year");
            return Ok(None);
        }
    };

    let parsed = ReleaseDate::parse_str(&text);
    if parsed.is_none() {
        warn!(target: "domain", value = %text, "ignoring unparseable release date");
    }
    Ok(parsed)
}

// ============================================================================
// Local side
// ============================================================================

/// One audio file found in a local folder, as reported by the scanner.
///
/// `index` is the on-disk enumeration position and is what positional
/// pairing follows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalTrackFile {
    pub path: PathBuf,
    #[serde(default)]
    pub disc_number: Option<u32>,
    #[serde(default)]
    pub track_number: Option<u32>,
    pub title: String,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    pub index: usize,
}

impl LocalTrackFile {
    pub fn new(path: impl AsRef<Path>, index: usize, title: impl Into<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            disc_number: None,
            track_number: None,
            title: title.into(),
            duration_ms: None,
            index,
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_position(mut self, disc_number: u32, track_number: u32) -> Self {
        self.disc_number = Some(disc_number);
        self.track_number = Some(track_number);
        self
    }
}

/// What the local folder is believed to contain, used to query catalogs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AlbumQuery {
    pub artist: String,
    pub album: String,
    /// Genres already tagged on the local files.
    #[serde(default)]
    pub existing_genres: Vec<String>,
}

impl AlbumQuery {
    pub fn new(artist: impl Into<String>, album: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            album: album.into(),
            existing_genres: Vec::new(),
        }
    }
}

// ============================================================================
// Catalog side
// ============================================================================

/// A catalog album in the normalized shape every provider adapter returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderAlbum {
    pub id: String,
    pub name: String,
    pub artist_name: String,
    #[serde(default, deserialize_with = "deserialize_release_date_lenient")]
    pub release_date: Option<ReleaseDate>,
    pub track_count: u32,
    #[serde(default = "default_disc_count")]
    pub disc_count: u32,
    #[serde(default)]
    pub genres: Vec<String>,
    pub catalog: Catalog,
}

fn default_disc_count() -> u32 {
    1
}

impl ProviderAlbum {
    pub fn new(
        catalog: Catalog,
        id: impl Into<String>,
        artist_name: impl Into<String>,
        name: impl Into<String>,
        track_count: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            artist_name: artist_name.into(),
            release_date: None,
            track_count,
            disc_count: 1,
            genres: Vec::new(),
            catalog,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderTrack {
    pub id: String,
    pub title: String,
    #[serde(default = "default_disc_count")]
    pub disc_number: u32,
    pub track_number: u32,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub composer: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
}

impl ProviderTrack {
    pub fn new(id: impl Into<String>, track_number: u32, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            disc_number: 1,
            track_number,
            duration_ms: None,
            artists: Vec::new(),
            composer: None,
            genres: Vec::new(),
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}
