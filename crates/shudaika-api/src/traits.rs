//! Service-agnostic interfaces for the two upstreams.
//!
//! The core pipeline only talks to these traits, so the AniList and
//! AnimeThemes clients can be swapped for fakes in tests.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::models::CatalogAnime;

/// Title search against a canonical anime database.
pub trait AnimeSearch: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Search by free-text title, optionally restricted to a season year.
    /// Returns at most ten candidates in upstream order.
    fn search_candidates(
        &self,
        title: &str,
        year: Option<i32>,
    ) -> impl Future<Output = Result<Vec<CanonicalMedia>, Self::Error>> + Send;
}

/// Lookup of the opening/ending graph for a single title.
///
/// Implementations swallow transport and decode failures (after logging them)
/// and report "not found" instead.
pub trait ThemeCatalog: Send + Sync {
    fn get_by_external_id(
        &self,
        site: ExternalSite,
        id: u64,
    ) -> impl Future<Output = Option<CatalogAnime>> + Send;

    fn get_by_slug(&self, slug: &str) -> impl Future<Output = Option<CatalogAnime>> + Send;
}

/// Identifier families the theme catalog can cross-reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExternalSite {
    AniList,
    MyAnimeList,
}

impl ExternalSite {
    /// Value of the catalog's `filter[site]` parameter.
    pub fn as_catalog_str(self) -> &'static str {
        match self {
            Self::AniList => "AniList",
            Self::MyAnimeList => "MyAnimeList",
        }
    }
}

impl std::fmt::Display for ExternalSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_catalog_str())
    }
}

/// Title variants of a search candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaTitle {
    pub romaji: Option<String>,
    pub english: Option<String>,
    pub native: Option<String>,
}

impl MediaTitle {
    /// Non-empty variants in romaji, english, native order.
    pub fn variants(&self) -> impl Iterator<Item = &str> {
        [&self.romaji, &self.english, &self.native]
            .into_iter()
            .filter_map(|t| t.as_deref())
            .filter(|t| !t.trim().is_empty())
    }

    pub fn preferred(&self) -> &str {
        self.variants().next().unwrap_or("Unknown")
    }
}

/// A search hit from the canonical database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalMedia {
    pub anilist_id: u64,
    pub mal_id: Option<u64>,
    pub title: MediaTitle,
    pub start_year: Option<i32>,
}

/// Cross-service identifiers resolved for one title.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaIds {
    pub anilist: Option<u64>,
    pub mal: Option<u64>,
}

impl MediaIds {
    pub fn is_empty(&self) -> bool {
        self.anilist.is_none() && self.mal.is_none()
    }
}
