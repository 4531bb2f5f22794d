//! Reactive, header-driven rate limiting.
//!
//! A [`RateLimiter`] never probes an upstream for its quota. It only remembers
//! what the last response told it (`remaining`, `reset`) and parks callers
//! until the advertised reset time once the quota is used up.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;
use tokio::sync::Mutex;

/// Quota assumed before the first response has been observed.
pub const DEFAULT_INITIAL_QUOTA: u32 = 90;

/// Extra wait past the advertised reset, to absorb clock skew.
const RESET_BUFFER: Duration = Duration::from_secs(1);

const DEFAULT_REMAINING_HEADER: &str = "x-ratelimit-remaining";
const DEFAULT_RESET_HEADER: &str = "x-ratelimit-reset";
const RETRY_AFTER_HEADER: &str = "retry-after";

/// Last observed quota for one upstream service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateState {
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateState {
    fn initial(quota: u32) -> Self {
        Self {
            remaining: quota,
            reset_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// How long a caller arriving at `now` has to wait, if at all.
    pub fn delay_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        if now > self.reset_at || self.remaining > 1 {
            return None;
        }
        let until = (self.reset_at - now).to_std().unwrap_or_default();
        Some(until + RESET_BUFFER)
    }
}

/// Per-service limiter. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    service: Arc<str>,
    remaining_header: Arc<str>,
    reset_header: Arc<str>,
    state: Arc<Mutex<RateState>>,
}

impl RateLimiter {
    pub fn new(service: &str) -> Self {
        Self::with_initial_quota(service, DEFAULT_INITIAL_QUOTA)
    }

    pub fn with_initial_quota(service: &str, quota: u32) -> Self {
        Self {
            service: service.into(),
            remaining_header: DEFAULT_REMAINING_HEADER.into(),
            reset_header: DEFAULT_RESET_HEADER.into(),
            state: Arc::new(Mutex::new(RateState::initial(quota))),
        }
    }

    /// Override the header names this service reports its quota in.
    pub fn with_headers(mut self, remaining: &str, reset: &str) -> Self {
        self.remaining_header = remaining.to_ascii_lowercase().into();
        self.reset_header = reset.to_ascii_lowercase().into();
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub async fn state(&self) -> RateState {
        *self.state.lock().await
    }

    /// Suspend the caller while the quota is exhausted and the reset time lies
    /// in the future. Returns immediately otherwise.
    pub async fn wait_if_needed(&self) {
        let delay = {
            let state = self.state.lock().await;
            state.delay_at(Utc::now())
        };

        if let Some(delay) = delay {
            tracing::info!(
                service = %self.service,
                wait_ms = delay.as_millis() as u64,
                "Rate limit exhausted, waiting for reset"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Record the quota reported by a response. Missing or malformed headers
    /// leave the previous state untouched.
    pub async fn update_state(&self, headers: &HeaderMap) {
        let remaining = header_number::<u32>(headers, &self.remaining_header);
        let reset = header_number::<i64>(headers, &self.reset_header)
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

        let next = match (remaining, reset) {
            (Some(remaining), Some(reset_at)) => RateState {
                remaining,
                reset_at,
            },
            (_, None) => {
                let Some(reset_at) = header_number::<u64>(headers, RETRY_AFTER_HEADER)
                    .and_then(|secs| i64::try_from(secs).ok())
                    .and_then(chrono::Duration::try_seconds)
                    .and_then(|wait| Utc::now().checked_add_signed(wait))
                else {
                    return;
                };
                RateState {
                    remaining: 0,
                    reset_at,
                }
            }
            _ => return,
        };

        let mut state = self.state.lock().await;
        *state = next;
        tracing::debug!(
            service = %self.service,
            remaining = next.remaining,
            reset_at = %next.reset_at,
            "Rate limit state updated"
        );
    }
}

fn header_number<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(remaining: &str, reset: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert("x-ratelimit-remaining", HeaderValue::from_str(remaining).unwrap());
        map.insert("x-ratelimit-reset", HeaderValue::from_str(reset).unwrap());
        map
    }

    #[tokio::test]
    async fn test_initial_state_does_not_block() {
        let limiter = RateLimiter::new("anilist");
        let state = limiter.state().await;
        assert_eq!(state.remaining, DEFAULT_INITIAL_QUOTA);
        assert!(state.delay_at(Utc::now()).is_none());
    }

    #[tokio::test]
    async fn test_update_state_overwrites() {
        let limiter = RateLimiter::new("anilist");
        let reset = Utc::now().timestamp() + 60;
        limiter.update_state(&headers("42", &reset.to_string())).await;

        let state = limiter.state().await;
        assert_eq!(state.remaining, 42);
        assert_eq!(state.reset_at.timestamp(), reset);
    }

    #[tokio::test]
    async fn test_unparsable_headers_leave_state_unchanged() {
        let limiter = RateLimiter::new("animethemes");
        let before = limiter.state().await;

        limiter.update_state(&headers("lots", "soon")).await;
        limiter.update_state(&HeaderMap::new()).await;

        assert_eq!(limiter.state().await, before);
    }

    #[tokio::test]
    async fn test_retry_after_without_reset() {
        let limiter = RateLimiter::new("animethemes");
        let mut map = HeaderMap::new();
        map.insert("retry-after", HeaderValue::from_static("30"));
        limiter.update_state(&map).await;

        let state = limiter.state().await;
        assert_eq!(state.remaining, 0);
        assert!(state.delay_at(Utc::now()).unwrap() > Duration::from_secs(25));
    }

    #[tokio::test]
    async fn test_out_of_range_retry_after_is_ignored() {
        let limiter = RateLimiter::new("animethemes");
        let before = limiter.state().await;

        for value in ["10000000000000", "18446744073709551615"] {
            let mut map = HeaderMap::new();
            map.insert("retry-after", HeaderValue::from_static(value));
            limiter.update_state(&map).await;
        }

        assert_eq!(limiter.state().await, before);
    }

    #[test]
    fn test_delay_only_when_exhausted() {
        let now = Utc::now();
        let reset_at = now + chrono::Duration::seconds(5);

        let plenty = RateState { remaining: 10, reset_at };
        assert!(plenty.delay_at(now).is_none());

        let last = RateState { remaining: 1, reset_at };
        let delay = last.delay_at(now).unwrap();
        assert!(delay >= Duration::from_secs(6) - Duration::from_millis(1));
        assert!(delay <= Duration::from_secs(6));
    }

    #[test]
    fn test_passed_reset_never_blocks() {
        let now = Utc::now();
        let state = RateState {
            remaining: 0,
            reset_at: now - chrono::Duration::seconds(1),
        };
        assert!(state.delay_at(now).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_blocks_until_reset_plus_buffer() {
        let limiter = RateLimiter::new("anilist");
        let reset = Utc::now().timestamp() + 5;
        limiter.update_state(&headers("1", &reset.to_string())).await;

        let started = tokio::time::Instant::now();
        limiter.wait_if_needed().await;
        let waited = started.elapsed();

        // Reset is whole seconds, so the wait lands in (5s, 6s].
        assert!(waited > Duration::from_secs(5), "waited {waited:?}");
        assert!(waited <= Duration::from_secs(6) + Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_returns_immediately_after_reset() {
        let limiter = RateLimiter::new("anilist");
        let reset = Utc::now().timestamp() - 2;
        limiter.update_state(&headers("0", &reset.to_string())).await;

        let started = tokio::time::Instant::now();
        limiter.wait_if_needed().await;
        assert!(started.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let a = RateLimiter::new("anilist").with_headers("X-Remaining", "X-Reset");
        let b = a.clone();
        let mut map = HeaderMap::new();
        map.insert("x-remaining", HeaderValue::from_static("3"));
        map.insert("x-reset", HeaderValue::from_static("2000000000"));
        a.update_state(&map).await;
        assert_eq!(b.state().await.remaining, 3);
        assert_eq!(b.service(), "anilist");
    }
}
