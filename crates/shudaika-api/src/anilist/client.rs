use reqwest::Client;

use super::error::AniListError;
use super::types::{AniListMedia, GraphQLResponse, PageResponse};
use crate::rate_limit::RateLimiter;
use crate::traits::{AnimeSearch, CanonicalMedia};

pub const API_URL: &str = "https://graphql.anilist.co";

/// Candidates considered per search.
pub const SEARCH_LIMIT: usize = 10;

const SEARCH_QUERY: &str = r#"
query ($search: String, $year: Int) {
    Page(perPage: 10) {
        media(search: $search, seasonYear: $year, type: ANIME) {
            id
            idMal
            title { romaji english native }
            seasonYear
            startDate { year }
        }
    }
}
"#;

/// AniList GraphQL client (anonymous; search only).
#[derive(Debug, Clone)]
pub struct AniListClient {
    http: Client,
    endpoint: String,
    limiter: RateLimiter,
}

impl AniListClient {
    pub fn new(http: Client, limiter: RateLimiter) -> Self {
        Self {
            http,
            endpoint: API_URL.to_string(),
            limiter,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    async fn graphql_request<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, AniListError> {
        self.limiter.wait_if_needed().await;
        tracing::debug!(operation, "AniList GraphQL request");

        let resp = self
            .http
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .json(&serde_json::json!({
                "query": query,
                "variables": variables,
            }))
            .send()
            .await?;

        self.limiter.update_state(resp.headers()).await;

        let status = resp.status();
        if !status.is_success() {
            let status_code = status.as_u16();
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(operation, status = status_code, "AniList API error");
            return Err(AniListError::Api {
                status: status_code,
                message: body,
            });
        }

        tracing::debug!(operation, status = %status, "AniList response received");
        let body: GraphQLResponse<T> = resp
            .json()
            .await
            .map_err(|e| AniListError::Parse(e.to_string()))?;

        match body.data {
            Some(data) => Ok(data),
            None => {
                let message = body
                    .errors
                    .iter()
                    .map(|e| e.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; ");
                Err(AniListError::Api {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }

    /// Search for anime (raw types).
    async fn search_raw(
        &self,
        title: &str,
        year: Option<i32>,
    ) -> Result<Vec<AniListMedia>, AniListError> {
        let mut vars = serde_json::json!({ "search": title });
        if let Some(year) = year {
            vars["year"] = serde_json::json!(year);
        }

        let page: PageResponse = self.graphql_request("Search", SEARCH_QUERY, vars).await?;
        Ok(page.page.media)
    }
}

impl AnimeSearch for AniListClient {
    type Error = AniListError;

    async fn search_candidates(
        &self,
        title: &str,
        year: Option<i32>,
    ) -> Result<Vec<CanonicalMedia>, AniListError> {
        let media = self.search_raw(title, year).await?;
        Ok(media
            .into_iter()
            .take(SEARCH_LIMIT)
            .map(AniListMedia::into_canonical)
            .collect())
    }
}
