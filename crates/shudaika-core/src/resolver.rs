//! Free-text title → canonical identifiers.

use tracing::{debug, info, warn};

use shudaika_api::traits::{AnimeSearch, CanonicalMedia, MediaIds};

use crate::matcher;

/// Largest accepted distance between requested and matched year.
const MAX_YEAR_GAP: u32 = 1;

/// Resolves library titles against a search service, never failing.
pub struct MediaResolver<S> {
    search: S,
}

impl<S: AnimeSearch> MediaResolver<S> {
    pub fn new(search: S) -> Self {
        Self { search }
    }

    pub fn search_service(&self) -> &S {
        &self.search
    }

    /// Best matching identifiers for `title` (and `year`, when known).
    ///
    /// Every failure mode (transport error, no results, implausible year)
    /// yields empty ids and a log line.
    pub async fn search_media(&self, title: &str, year: Option<i32>) -> MediaIds {
        let title = title.trim();
        if title.is_empty() {
            warn!("Refusing to search for an empty title");
            return MediaIds::default();
        }

        let mut candidates = match self.candidates(title, year).await {
            Some(c) => c,
            None => return MediaIds::default(),
        };

        if candidates.is_empty() && year.is_some() {
            debug!(title, ?year, "No results with year filter, retrying without");
            candidates = match self.candidates(title, None).await {
                Some(c) => c,
                None => return MediaIds::default(),
            };
        }

        select(&candidates, title, year)
    }

    async fn candidates(&self, title: &str, year: Option<i32>) -> Option<Vec<CanonicalMedia>> {
        match self.search.search_candidates(title, year).await {
            Ok(mut c) => {
                c.truncate(shudaika_api::anilist::client::SEARCH_LIMIT);
                Some(c)
            }
            Err(e) => {
                warn!(title, ?year, error = %e, "Title search failed");
                None
            }
        }
    }
}

/// Pick the best candidate and apply the year-gap guard.
pub fn select(candidates: &[CanonicalMedia], title: &str, year: Option<i32>) -> MediaIds {
    let Some((best, score)) = matcher::best_candidate(candidates, title, year) else {
        info!(title, ?year, "No search results");
        return MediaIds::default();
    };

    if let Some(wanted) = year {
        let gap = best.start_year.map(|y| (y - wanted).unsigned_abs());
        // An unknown candidate year already paid its penalty in the score.
        if gap.is_some_and(|g| g > MAX_YEAR_GAP) {
            warn!(
                title,
                wanted,
                found = ?best.start_year,
                candidate = best.title.preferred(),
                "Best match is too far from the requested year, rejecting"
            );
            return MediaIds::default();
        }
    }

    debug!(
        title,
        anilist_id = best.anilist_id,
        mal_id = ?best.mal_id,
        score,
        "Resolved title"
    );
    MediaIds {
        anilist: Some(best.anilist_id),
        mal: best.mal_id,
    }
}
