use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::encoder::{Encoder, Finalized};
use crate::error::SyncError;
use crate::fetcher::Fetcher;
use crate::models::DesiredFile;

/// Attempts per file and the backoff between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Sleep after failed attempt `n` is `n * backoff_unit`.
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_unit: Duration::from_secs(2),
        }
    }
}

/// How one queued file ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Placed(Finalized),
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadStats {
    pub downloaded: usize,
    pub raw_fallbacks: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl DownloadStats {
    fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Placed(finalized) => {
                self.downloaded += 1;
                if finalized == Finalized::RawFallback {
                    self.raw_fallbacks += 1;
                }
            }
            FileOutcome::Failed => self.failed += 1,
            FileOutcome::Cancelled => self.cancelled += 1,
        }
    }
}

/// Shared state every download task needs.
pub(crate) struct Downloader<F> {
    pub fetcher: Arc<F>,
    pub encoder: Arc<Encoder>,
    pub retry: RetryPolicy,
}

impl<F> Clone for Downloader<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            encoder: Arc::clone(&self.encoder),
            retry: self.retry,
        }
    }
}

impl<F: Fetcher> Downloader<F> {
    /// Run all `jobs` with at most `concurrency` in flight.
    ///
    /// `on_done(finished, total)` fires once per job as it completes.
    pub async fn download_all(
        &self,
        jobs: Vec<DesiredFile>,
        concurrency: usize,
        cancel: &CancellationToken,
        mut on_done: impl FnMut(usize, usize),
    ) -> DownloadStats {
        let total = jobs.len();
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for job in jobs {
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let this = self.clone();

            tasks.spawn(async move {
                let _permit = tokio::select! {
                    _ = cancel.cancelled() => return FileOutcome::Cancelled,
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(p) => p,
                        Err(_) => return FileOutcome::Cancelled,
                    },
                };
                if cancel.is_cancelled() {
                    return FileOutcome::Cancelled;
                }
                this.download_with_retry(&job, &cancel).await
            });
        }

        let mut stats = DownloadStats::default();
        let mut finished = 0;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.unwrap_or_else(|e| {
                error!(error = %e, "Download task panicked");
                FileOutcome::Failed
            });
            stats.record(outcome);
            finished += 1;
            on_done(finished, total);
        }
        stats
    }

    async fn download_with_retry(
        &self,
        job: &DesiredFile,
        cancel: &CancellationToken,
    ) -> FileOutcome {
        let target = job.target_path.display().to_string();

        if let Some(dir) = job.target_path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                error!(target, error = %e, "Cannot create target directory");
                return FileOutcome::Failed;
            }
        }

        let attempts = self.retry.attempts.max(1);
        for attempt in 1..=attempts {
            match self.download_one(job, cancel).await {
                Ok(finalized) => {
                    info!(target, ?finalized, "Theme file placed");
                    return FileOutcome::Placed(finalized);
                }
                Err(e) if e.is_cancelled() => return FileOutcome::Cancelled,
                Err(e) if attempt < attempts => {
                    let backoff = self.retry.backoff_unit * attempt;
                    warn!(
                        target,
                        attempt,
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "Download failed, retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return FileOutcome::Cancelled,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
                Err(e) => {
                    error!(target, attempts, error = %e, "Download failed, giving up");
                }
            }
        }
        FileOutcome::Failed
    }

    async fn download_one(
        &self,
        job: &DesiredFile,
        cancel: &CancellationToken,
    ) -> Result<Finalized, SyncError> {
        let part = part_path(&job.target_path);

        let result = match self.fetcher.fetch(&job.source_url, &part, cancel).await {
            Ok(()) => {
                self.encoder
                    .finalize(&part, &job.target_path, job.is_video, &job.source_url, job.volume)
                    .await
            }
            Err(e) => Err(e),
        };

        if result.is_err() {
            let _ = tokio::fs::remove_file(&part).await;
        }
        result
    }
}

/// `{target}.part`
pub fn part_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".part");
    target.with_file_name(name)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Writes the URL into `dest` after a short pause, tracking concurrency.
    #[derive(Default)]
    pub(crate) struct FakeFetcher {
        pub delay: Duration,
        /// Number of leading calls that fail.
        pub fail_first: usize,
        pub calls: AtomicUsize,
        pub in_flight: AtomicUsize,
        pub max_in_flight: AtomicUsize,
        pub urls: Mutex<Vec<String>>,
    }

    impl Fetcher for FakeFetcher {
        async fn fetch(
            &self,
            url: &str,
            dest: &Path,
            cancel: &CancellationToken,
        ) -> Result<(), SyncError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.urls.lock().unwrap().push(url.to_string());

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let result = tokio::select! {
                _ = cancel.cancelled() => Err(SyncError::Cancelled),
                _ = tokio::time::sleep(self.delay) => Ok(()),
            };
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result?;

            // Leave a partial file behind, as a broken transfer would.
            tokio::fs::write(dest, url.as_bytes()).await?;
            if call < self.fail_first {
                return Err(SyncError::Status {
                    status: 503,
                    url: url.to_string(),
                });
            }
            Ok(())
        }
    }

    pub(crate) fn job(dir: &Path, name: &str) -> DesiredFile {
        DesiredFile {
            target_path: dir.join("backdrops").join(format!("{name}-video.webm")),
            source_url: format!("https://v.animethemes.moe/{name}.webm"),
            is_video: true,
            volume: 100,
        }
    }

    fn downloader(fetcher: FakeFetcher, backoff: Duration) -> Downloader<FakeFetcher> {
        Downloader {
            fetcher: Arc::new(fetcher),
            encoder: Arc::new(Encoder::default()),
            retry: RetryPolicy {
                attempts: 3,
                backoff_unit: backoff,
            },
        }
    }

    #[test]
    fn test_part_path() {
        assert_eq!(
            part_path(Path::new("/a/backdrops/OP1-video.webm")),
            PathBuf::from("/a/backdrops/OP1-video.webm.part")
        );
    }

    #[tokio::test]
    async fn test_at_most_two_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let d = downloader(
            FakeFetcher {
                delay: Duration::from_millis(30),
                ..Default::default()
            },
            Duration::ZERO,
        );
        let jobs: Vec<DesiredFile> =
            (1..=5).map(|i| job(dir.path(), &format!("OP{i}"))).collect();

        let mut reports = Vec::new();
        let stats = d
            .download_all(jobs.clone(), 2, &CancellationToken::new(), |done, total| {
                reports.push((done, total))
            })
            .await;

        assert_eq!(stats.downloaded, 5);
        assert_eq!(d.fetcher.max_in_flight.load(Ordering::SeqCst), 2);
        assert_eq!(reports.last(), Some(&(5, 5)));
        for j in &jobs {
            assert!(j.target_path.exists());
            assert!(!part_path(&j.target_path).exists());
        }
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let d = downloader(
            FakeFetcher {
                fail_first: 2,
                ..Default::default()
            },
            Duration::from_millis(1),
        );

        let j = job(dir.path(), "OP1");
        let stats = d
            .download_all(vec![j.clone()], 1, &CancellationToken::new(), |_, _| {})
            .await;

        assert_eq!(stats.downloaded, 1);
        assert_eq!(d.fetcher.calls.load(Ordering::SeqCst), 3);
        assert!(j.target_path.exists());
    }

    #[tokio::test]
    async fn test_exhausted_retries_clean_up() {
        let dir = tempfile::tempdir().unwrap();
        let d = downloader(
            FakeFetcher {
                fail_first: usize::MAX,
                ..Default::default()
            },
            Duration::from_millis(1),
        );

        let j = job(dir.path(), "ED1");
        let stats = d
            .download_all(vec![j.clone()], 1, &CancellationToken::new(), |_, _| {})
            .await;

        assert_eq!(stats.failed, 1);
        assert_eq!(d.fetcher.calls.load(Ordering::SeqCst), 3);
        assert!(!j.target_path.exists());
        assert!(!part_path(&j.target_path).exists());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let d = downloader(FakeFetcher::default(), Duration::ZERO);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let jobs = vec![job(dir.path(), "OP1"), job(dir.path(), "OP2")];
        let mut finished = 0;
        let stats = d.download_all(jobs, 2, &cancel, |done, _| finished = done).await;

        assert_eq!(stats.cancelled, 2);
        assert_eq!(finished, 2);
        assert_eq!(d.fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_during_backoff_stops_retrying() {
        let dir = tempfile::tempdir().unwrap();
        let d = downloader(
            FakeFetcher {
                fail_first: 1,
                ..Default::default()
            },
            Duration::from_secs(60),
        );
        let cancel = CancellationToken::new();

        tokio::spawn({
            let fetcher = Arc::clone(&d.fetcher);
            let cancel = cancel.clone();
            async move {
                while fetcher.calls.load(Ordering::SeqCst) == 0 {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
                cancel.cancel();
            }
        });

        let j = job(dir.path(), "OP1");
        let stats = tokio::time::timeout(
            Duration::from_secs(10),
            d.download_all(vec![j.clone()], 1, &cancel, |_, _| {}),
        )
        .await
        .expect("backoff should end on cancellation");

        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(d.fetcher.calls.load(Ordering::SeqCst), 1);
        assert!(!j.target_path.exists());
        assert!(!part_path(&j.target_path).exists());
    }
}
