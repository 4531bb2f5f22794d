use serde::Deserialize;

use crate::traits::{CanonicalMedia, MediaTitle};

// ── GraphQL response wrappers ────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GraphQLResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQLError>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQLError {
    pub message: String,
}

// ── Search query ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PageResponse {
    #[serde(rename = "Page")]
    pub page: PageData,
}

#[derive(Debug, Deserialize)]
pub struct PageData {
    #[serde(default)]
    pub media: Vec<AniListMedia>,
}

#[derive(Debug, Deserialize)]
pub struct AniListMedia {
    pub id: u64,
    #[serde(rename = "idMal")]
    pub id_mal: Option<u64>,
    pub title: Option<AniListTitle>,
    #[serde(rename = "seasonYear")]
    pub season_year: Option<i32>,
    #[serde(rename = "startDate")]
    pub start_date: Option<FuzzyDate>,
}

#[derive(Debug, Deserialize)]
pub struct AniListTitle {
    pub romaji: Option<String>,
    pub english: Option<String>,
    pub native: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FuzzyDate {
    pub year: Option<i32>,
}

// ── Conversions ──────────────────────────────────────────────────

impl AniListMedia {
    pub fn into_canonical(self) -> CanonicalMedia {
        let title = self
            .title
            .map(|t| MediaTitle {
                romaji: t.romaji,
                english: t.english,
                native: t.native,
            })
            .unwrap_or_default();

        // Start date is authoritative; season year covers entries with a fuzzy start.
        let start_year = self
            .start_date
            .and_then(|d| d.year)
            .or(self.season_year);

        CanonicalMedia {
            anilist_id: self.id,
            mal_id: self.id_mal,
            title,
            start_year,
        }
    }
}
