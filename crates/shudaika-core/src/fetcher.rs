//! Streaming HTTP download to a local file.

use std::future::Future;
use std::path::Path;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::SyncError;

/// Fetches a remote file to a local path.
///
/// `dest` is always a temporary path; on error the caller removes it.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;
}

/// [`Fetcher`] that streams a `reqwest` response body to disk.
#[derive(Clone)]
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            r = self.http.get(url).send() => r?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                next = stream.next() => next,
            };
            let Some(chunk) = chunk else { break };
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        debug!(url, bytes = written, "Download complete");
        Ok(())
    }
}
