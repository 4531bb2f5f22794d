//! The theme sync run: resolve every library entry, download what is
//! missing, then optionally prune files that are no longer wanted.

mod download;
mod plan;
mod progress;
mod reconcile;

pub use download::{part_path, DownloadStats, FileOutcome, RetryPolicy};
pub use plan::{base_name, plan_entry, source_url, target_file_name, EntryPlan};
pub use progress::{ProgressTracker, SyncPhase, SyncProgress};
pub use reconcile::reconcile_entry;

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use shudaika_api::models::CatalogAnime;
use shudaika_api::traits::{AnimeSearch, ExternalSite, ThemeCatalog};

use crate::config::{AppConfig, KindPolicies, ThemePolicy};
use crate::encoder::Encoder;
use crate::error::CoreError;
use crate::fetcher::Fetcher;
use crate::library::MediaLibrary;
use crate::models::{DesiredFile, LibraryItem, MediaKind, OutputAxis};
use crate::resolver::MediaResolver;

use download::Downloader;

/// Run options, taken from [`AppConfig`] and overridable per run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub audio_dir: String,
    pub video_dir: String,
    pub series: KindPolicies,
    pub movie: KindPolicies,
    pub max_concurrent_downloads: usize,
    pub force_redownload: bool,
    pub delete_unwanted: bool,
}

impl From<&AppConfig> for SyncConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            audio_dir: config.paths.audio_dir.clone(),
            video_dir: config.paths.video_dir.clone(),
            series: config.series.clone(),
            movie: config.movie.clone(),
            max_concurrent_downloads: config.download_concurrency(),
            force_redownload: config.general.force_redownload,
            delete_unwanted: config.general.delete_unwanted,
        }
    }
}

impl SyncConfig {
    pub fn policy(&self, kind: MediaKind, axis: OutputAxis) -> &ThemePolicy {
        let policies = match kind {
            MediaKind::Series => &self.series,
            MediaKind::Movie => &self.movie,
        };
        match axis {
            OutputAxis::Audio => &policies.audio,
            OutputAxis::Video => &policies.video,
        }
    }
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub entries: usize,
    pub resolved: usize,
    pub skipped: usize,
    pub desired: usize,
    pub queued: usize,
    pub downloads: DownloadStats,
    pub deleted: usize,
    pub cancelled: bool,
}

/// Drives a full sync over a [`MediaLibrary`].
pub struct ThemeSync<S, C, F> {
    resolver: MediaResolver<S>,
    catalog: C,
    downloader: Downloader<F>,
    config: SyncConfig,
    progress: ProgressTracker,
}

impl<S, C, F> ThemeSync<S, C, F>
where
    S: AnimeSearch,
    C: ThemeCatalog,
    F: Fetcher,
{
    pub fn new(search: S, catalog: C, fetcher: F, encoder: Encoder, config: SyncConfig) -> Self {
        Self {
            resolver: MediaResolver::new(search),
            catalog,
            downloader: Downloader {
                fetcher: Arc::new(fetcher),
                encoder: Arc::new(encoder),
                retry: RetryPolicy::default(),
            },
            config,
            progress: ProgressTracker::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.downloader.retry = retry;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn progress(&self) -> watch::Receiver<SyncProgress> {
        self.progress.subscribe()
    }

    /// Run all three phases once.
    ///
    /// Only failing to list the library is an error; everything per entry
    /// or per file is logged and counted in the summary.
    pub async fn run<L: MediaLibrary>(
        &self,
        library: &L,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, CoreError> {
        let items = library.entries()?;
        let mut summary = RunSummary {
            entries: items.len(),
            ..Default::default()
        };

        self.progress.start();
        info!(entries = items.len(), "Resolving library entries");

        // ── Phase 1: resolve, sequential ────────────────────────
        let mut plans = Vec::new();
        let mut queue = Vec::new();
        for (i, item) in items.iter().enumerate() {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            match self.resolve_entry(library, item).await {
                Some(anime) => {
                    let plan = plan_entry(item, &anime, &self.config);
                    debug!(entry = %item.name, desired = plan.desired.len(), "Planned entry");
                    summary.resolved += 1;
                    summary.desired += plan.desired.len();
                    queue.extend(self.missing_files(&plan.desired).await);
                    plans.push(plan);
                }
                None => summary.skipped += 1,
            }
            self.progress.resolved(i + 1, items.len());
        }

        if summary.cancelled {
            info!("Sync cancelled during resolution");
            self.progress.finish();
            return Ok(summary);
        }

        // ── Phase 2: download, bounded ──────────────────────────
        self.progress.enter(SyncPhase::DownloadingAll);
        summary.queued = queue.len();
        info!(
            queued = queue.len(),
            concurrency = self.config.max_concurrent_downloads,
            "Downloading"
        );
        summary.downloads = self
            .downloader
            .download_all(queue, self.config.max_concurrent_downloads, cancel, |done, total| {
                self.progress.downloaded(done, total)
            })
            .await;
        summary.cancelled = cancel.is_cancelled();

        // ── Phase 3: reconcile ──────────────────────────────────
        if self.config.delete_unwanted && !summary.cancelled {
            self.progress.enter(SyncPhase::Reconciling);
            let deleted = tokio::task::spawn_blocking(move || {
                plans.iter().map(|p| reconcile_entry(p).len()).sum::<usize>()
            })
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Reconcile task failed");
                0
            });
            summary.deleted = deleted;
        }

        self.progress.finish();
        info!(
            resolved = summary.resolved,
            skipped = summary.skipped,
            downloaded = summary.downloads.downloaded,
            failed = summary.downloads.failed,
            deleted = summary.deleted,
            cancelled = summary.cancelled,
            "Sync finished"
        );
        Ok(summary)
    }

    /// Fill in missing identifiers and fetch the catalog entry.
    async fn resolve_entry<L: MediaLibrary>(
        &self,
        library: &L,
        item: &LibraryItem,
    ) -> Option<CatalogAnime> {
        let mut ids = item.ids.clone();
        let mut changed = false;

        if ids.anilist.is_none() && ids.mal.is_none() {
            let found = self.resolver.search_media(&item.name, item.year).await;
            if !found.is_empty() {
                ids.anilist = found.anilist;
                ids.mal = found.mal;
                changed = true;
            }
        }

        let anime = match ids.slug() {
            Some(slug) => self.catalog.get_by_slug(slug).await,
            None => {
                let anime = self.lookup_by_ids(ids.anilist, ids.mal).await;
                if let Some(a) = &anime {
                    ids.animethemes_slug = Some(a.slug.clone());
                    changed = true;
                }
                anime
            }
        };

        if changed {
            if let Err(e) = library.set_provider_ids(item.id, &ids) {
                warn!(entry = %item.name, error = %e, "Failed to store resolved ids");
            }
        }

        if anime.is_none() {
            warn!(
                entry = %item.name,
                anilist_id = ?ids.anilist,
                mal_id = ?ids.mal,
                "No theme catalog entry, skipping"
            );
        }
        anime
    }

    async fn lookup_by_ids(&self, anilist: Option<u64>, mal: Option<u64>) -> Option<CatalogAnime> {
        if let Some(id) = anilist {
            let anime = self
                .catalog
                .get_by_external_id(ExternalSite::AniList, id)
                .await;
            if anime.is_some() {
                return anime;
            }
        }
        match mal {
            Some(id) => {
                self.catalog
                    .get_by_external_id(ExternalSite::MyAnimeList, id)
                    .await
            }
            None => None,
        }
    }

    async fn missing_files(&self, desired: &[DesiredFile]) -> Vec<DesiredFile> {
        let mut missing = Vec::new();
        for file in desired {
            let exists = tokio::fs::try_exists(&file.target_path).await.unwrap_or(false);
            if exists && !self.config.force_redownload {
                continue;
            }
            missing.push(file.clone());
        }
        missing
    }
}
