use reqwest::Client;
use url::Url;

use super::error::AnimeThemesError;
use super::types::{AnimeShowResponse, ResourceIndexResponse};
use crate::models::CatalogAnime;
use crate::rate_limit::RateLimiter;
use crate::traits::{ExternalSite, ThemeCatalog};

pub const BASE_URL: &str = "https://api.animethemes.moe/";

const ANIME_INCLUDES: &str = "animethemes.animethemeentries.videos.audio,resources";

/// AnimeThemes REST client.
#[derive(Debug, Clone)]
pub struct AnimeThemesClient {
    http: Client,
    base: Url,
    limiter: RateLimiter,
}

impl AnimeThemesClient {
    pub fn new(http: Client, limiter: RateLimiter) -> Result<Self, AnimeThemesError> {
        Self::with_base_url(http, limiter, BASE_URL)
    }

    pub fn with_base_url(
        http: Client,
        limiter: RateLimiter,
        base: &str,
    ) -> Result<Self, AnimeThemesError> {
        let mut base = Url::parse(base)?;
        if base.cannot_be_a_base() {
            return Err(AnimeThemesError::Parse(format!("not a base URL: {base}")));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { http, base, limiter })
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    fn url(&self, segments: &[&str]) -> Result<Url, AnimeThemesError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| AnimeThemesError::Parse("base URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn check_response(
        resp: reqwest::Response,
    ) -> Result<reqwest::Response, AnimeThemesError> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            Err(AnimeThemesError::Api {
                status,
                message: body,
            })
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<T, AnimeThemesError> {
        self.limiter.wait_if_needed().await;
        tracing::debug!(operation, url = %url, "AnimeThemes request");

        let resp = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await?;

        self.limiter.update_state(resp.headers()).await;

        let resp = Self::check_response(resp).await?;
        resp.json()
            .await
            .map_err(|e| AnimeThemesError::Parse(e.to_string()))
    }

    /// Resolve an external id to the catalog slug of the title it belongs to.
    pub async fn find_slug(
        &self,
        site: ExternalSite,
        id: u64,
    ) -> Result<Option<String>, AnimeThemesError> {
        let url = self.url(&["resource"])?;
        let body: ResourceIndexResponse = self
            .get_json(
                "ResourceLookup",
                url,
                &[
                    ("filter[site]", site.as_catalog_str().to_string()),
                    ("filter[external_id]", id.to_string()),
                    ("include", "anime".to_string()),
                ],
            )
            .await?;
        Ok(body.first_slug())
    }

    /// Fetch one title with its theme, entry, video and audio graph.
    pub async fn fetch_anime(&self, slug: &str) -> Result<CatalogAnime, AnimeThemesError> {
        let url = self.url(&["anime", slug])?;
        let body: AnimeShowResponse = self
            .get_json(
                "AnimeShow",
                url,
                &[("include", ANIME_INCLUDES.to_string())],
            )
            .await?;
        Ok(body.anime.into_catalog())
    }
}

impl ThemeCatalog for AnimeThemesClient {
    async fn get_by_external_id(&self, site: ExternalSite, id: u64) -> Option<CatalogAnime> {
        let slug = match self.find_slug(site, id).await {
            Ok(Some(slug)) => slug,
            Ok(None) => {
                tracing::debug!(%site, id, "No AnimeThemes entry for external id");
                return None;
            }
            Err(e) => {
                tracing::warn!(%site, id, error = %e, "AnimeThemes resource lookup failed");
                return None;
            }
        };
        self.get_by_slug(&slug).await
    }

    async fn get_by_slug(&self, slug: &str) -> Option<CatalogAnime> {
        match self.fetch_anime(slug).await {
            Ok(anime) => Some(anime),
            Err(e) if e.is_not_found() => {
                tracing::debug!(slug, "AnimeThemes slug not found");
                None
            }
            Err(e) => {
                tracing::warn!(slug, error = %e, "AnimeThemes fetch failed");
                None
            }
        }
    }
}
