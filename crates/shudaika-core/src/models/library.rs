use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shudaika_api::traits::MediaIds;

/// Whether a library entry is a series or a movie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Series,
    Movie,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Series => "Series",
            Self::Movie => "Movie",
        }
    }

    /// Database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Series => "series",
            Self::Movie => "movie",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "series" => Some(Self::Series),
            "movie" => Some(Self::Movie),
            _ => None,
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifiers a library entry is known by in the upstream services.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderIds {
    pub anilist: Option<u64>,
    pub mal: Option<u64>,
    pub animethemes_slug: Option<String>,
}

impl ProviderIds {
    pub fn media_ids(&self) -> MediaIds {
        MediaIds {
            anilist: self.anilist,
            mal: self.mal,
        }
    }

    /// Slug with surrounding whitespace removed, if non-blank.
    pub fn slug(&self) -> Option<&str> {
        self.animethemes_slug
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// A series or movie folder the sync runs over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryItem {
    pub id: i64,
    pub name: String,
    pub year: Option<i32>,
    pub path: PathBuf,
    pub kind: MediaKind,
    pub enabled: bool,
    pub ids: ProviderIds,
    pub updated_at: DateTime<Utc>,
}

/// Audio (theme music) or video (theme backdrop) output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputAxis {
    Audio,
    Video,
}

impl OutputAxis {
    pub const ALL: &[OutputAxis] = &[Self::Audio, Self::Video];

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Audio => "mp3",
            Self::Video => "webm",
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video)
    }
}

impl std::fmt::Display for OutputAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Audio => f.write_str("audio"),
            Self::Video => f.write_str("video"),
        }
    }
}

/// One file the sync wants present on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredFile {
    pub target_path: PathBuf,
    pub source_url: String,
    pub is_video: bool,
    pub volume: u8,
}
