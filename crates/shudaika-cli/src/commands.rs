use std::path::Path;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use shudaika_api::anilist::AniListClient;
use shudaika_api::animethemes::AnimeThemesClient;
use shudaika_api::rate_limit::RateLimiter;
use shudaika_api::traits::ThemeCatalog;
use shudaika_core::config::AppConfig;
use shudaika_core::encoder::Encoder;
use shudaika_core::error::CoreError;
use shudaika_core::fetcher::HttpFetcher;
use shudaika_core::models::{LibraryItem, MediaKind, OutputAxis, ProviderIds};
use shudaika_core::pipeline::{self, SyncConfig, SyncPhase, ThemeSync};
use shudaika_core::resolver::MediaResolver;
use shudaika_core::scorer::{self, CandidateFilter};
use shudaika_core::storage::Storage;

use crate::cli::{ConfigCommand, LibraryCommand, SyncArgs};
use crate::error::CliError;

/// The HTTP clients every network command shares.
struct Services {
    http: reqwest::Client,
    anilist: AniListClient,
    animethemes: AnimeThemesClient,
}

impl Services {
    fn new(config: &AppConfig) -> Result<Self, CliError> {
        let services = &config.services;
        let http = reqwest::Client::builder()
            .user_agent(&services.user_agent)
            .build()?;

        let anilist = AniListClient::new(
            http.clone(),
            RateLimiter::with_initial_quota("anilist", services.initial_quota),
        )
        .with_endpoint(&services.anilist_url);

        let animethemes = AnimeThemesClient::with_base_url(
            http.clone(),
            RateLimiter::with_initial_quota("animethemes", services.initial_quota),
            &services.animethemes_url,
        )?;

        Ok(Self {
            http,
            anilist,
            animethemes,
        })
    }
}

fn open_storage() -> Result<Storage, CliError> {
    let path = AppConfig::ensure_db_path()?;
    Ok(Storage::open(&path)?)
}

pub async fn sync(config: &AppConfig, args: &SyncArgs) -> Result<(), CliError> {
    let mut sync_config = SyncConfig::from(config);
    sync_config.force_redownload |= args.force;
    sync_config.delete_unwanted |= args.delete;
    if let Some(n) = args.concurrency {
        sync_config.max_concurrent_downloads = usize::from(n);
    }

    let storage = open_storage()?;
    let services = Services::new(config)?;
    let runner = ThemeSync::new(
        services.anilist,
        services.animethemes,
        HttpFetcher::new(services.http),
        Encoder::new(config.general.encoder_path.clone()),
        sync_config,
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl+C received, finishing in-flight work");
                cancel.cancel();
            }
        }
    });

    let mut progress = runner.progress();
    let reporter = tokio::spawn(async move {
        let mut last_phase = SyncPhase::Idle;
        let mut last_decile = 0;
        while progress.changed().await.is_ok() {
            let p = *progress.borrow_and_update();
            if p.phase != last_phase || p.percent / 10 > last_decile {
                info!(phase = %p.phase, percent = p.percent, "Progress");
                last_phase = p.phase;
                last_decile = p.percent / 10;
            }
        }
    });

    let started = Instant::now();
    let summary = runner.run(&storage, &cancel).await?;
    drop(runner);
    let _ = reporter.await;

    println!(
        "Entries:     {} ({} resolved, {} skipped)",
        summary.entries, summary.resolved, summary.skipped
    );
    println!(
        "Theme files: {} wanted, {} queued",
        summary.desired, summary.queued
    );
    println!(
        "Downloads:   {} placed ({} unprocessed), {} failed, {} cancelled",
        summary.downloads.downloaded,
        summary.downloads.raw_fallbacks,
        summary.downloads.failed,
        summary.downloads.cancelled
    );
    if summary.deleted > 0 {
        println!("Removed:     {}", summary.deleted);
    }
    println!("Elapsed:     {:.1}s", started.elapsed().as_secs_f32());
    if summary.cancelled {
        println!("Sync was cancelled; completed files were kept.");
    }
    Ok(())
}

pub async fn search(config: &AppConfig, title: &str, year: Option<i32>) -> Result<(), CliError> {
    let services = Services::new(config)?;
    let resolver = MediaResolver::new(services.anilist);
    let ids = resolver.search_media(title, year).await;

    if ids.is_empty() {
        println!("No match for \"{title}\"");
        return Ok(());
    }
    println!("AniList: {}", fmt_id(ids.anilist));
    println!("MAL:     {}", fmt_id(ids.mal));
    Ok(())
}

pub async fn themes(
    config: &AppConfig,
    slug: &str,
    movie: bool,
    video: bool,
) -> Result<(), CliError> {
    let services = Services::new(config)?;
    let Some(anime) = services.animethemes.get_by_slug(slug).await else {
        return Err(CliError::InvalidArgument(format!(
            "no catalog entry for slug `{slug}`"
        )));
    };

    let kind = if movie {
        MediaKind::Movie
    } else {
        MediaKind::Series
    };
    let axis = if video {
        OutputAxis::Video
    } else {
        OutputAxis::Audio
    };
    let sync_config = SyncConfig::from(config);
    let policy = sync_config.policy(kind, axis);

    println!(
        "{} ({}): {kind} {axis}, keeping {}",
        anime.name,
        anime.slug,
        policy.max_themes.max(0)
    );
    let candidates = scorer::scored_candidates(&anime.themes, CandidateFilter::from(policy));
    if candidates.is_empty() {
        println!("  no eligible themes");
    }
    for (i, c) in candidates.iter().enumerate() {
        let marker = if (i as i32) < policy.max_themes {
            "*"
        } else {
            " "
        };
        let target = pipeline::target_file_name(&pipeline::base_name(c.theme, c.entry), axis);
        println!(
            "{marker} {:>3}  {:<22} {}",
            c.score,
            target,
            pipeline::source_url(c.video, axis)
        );
    }
    Ok(())
}

pub fn library(command: &LibraryCommand) -> Result<(), CliError> {
    let storage = open_storage()?;
    match command {
        LibraryCommand::Add {
            path,
            name,
            year,
            movie,
        } => {
            let name = match name {
                Some(n) => n.clone(),
                None => folder_name(path)?,
            };
            let item = LibraryItem {
                id: 0,
                name,
                year: *year,
                path: path.clone(),
                kind: if *movie {
                    MediaKind::Movie
                } else {
                    MediaKind::Series
                },
                enabled: true,
                ids: ProviderIds::default(),
                updated_at: Default::default(),
            };
            let id = storage.insert_item(&item)?;
            println!("Added #{id}: {} ({})", item.name, item.kind);
        }
        LibraryCommand::List => {
            let items = storage.all_items()?;
            if items.is_empty() {
                println!("Library is empty. Add folders with `shudaika library add <path>`.");
            }
            for item in items {
                println!(
                    "{:>4} {} {:<6} {:<40} {:>4}  anilist={} slug={}  {}",
                    item.id,
                    if item.enabled { "+" } else { "-" },
                    item.kind.as_str(),
                    item.name,
                    item.year.map(|y| y.to_string()).unwrap_or_default(),
                    fmt_id(item.ids.anilist),
                    item.ids.slug().unwrap_or("-"),
                    item.path.display()
                );
            }
        }
        LibraryCommand::Remove { id } => {
            storage.delete_item(*id)?;
            println!("Removed #{id}");
        }
        LibraryCommand::Enable { id } => {
            storage.set_enabled(*id, true)?;
            println!("Enabled #{id}");
        }
        LibraryCommand::Disable { id } => {
            storage.set_enabled(*id, false)?;
            println!("Disabled #{id}");
        }
    }
    Ok(())
}

pub fn config(config: &AppConfig, command: &ConfigCommand) -> Result<(), CliError> {
    match command {
        ConfigCommand::Path => println!("{}", AppConfig::config_path().display()),
        ConfigCommand::Show => {
            let text = toml::to_string_pretty(config)
                .map_err(|e| CoreError::Config(e.to_string()))?;
            print!("{text}");
        }
    }
    Ok(())
}

fn folder_name(path: &Path) -> Result<String, CliError> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| {
            CliError::InvalidArgument(format!("cannot derive a title from {}", path.display()))
        })
}

fn fmt_id(id: Option<u64>) -> String {
    id.map(|v| v.to_string()).unwrap_or_else(|| "-".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_name() {
        assert_eq!(
            folder_name(Path::new("/media/anime/Kanon (2006)")).unwrap(),
            "Kanon (2006)"
        );
        assert!(folder_name(Path::new("/")).is_err());
    }

    #[test]
    fn test_fmt_id() {
        assert_eq!(fmt_id(Some(5)), "5");
        assert_eq!(fmt_id(None), "-");
    }
}
