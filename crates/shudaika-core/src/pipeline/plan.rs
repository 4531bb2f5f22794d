use std::collections::HashSet;
use std::path::{Path, PathBuf};

use shudaika_api::models::{CatalogAnime, Theme, ThemeEntry, Video};

use super::SyncConfig;
use crate::models::{DesiredFile, LibraryItem, OutputAxis};
use crate::scorer::{self, CandidateFilter};

/// Everything the sync wants for one library entry.
#[derive(Debug, Clone)]
pub struct EntryPlan {
    pub item_id: i64,
    pub name: String,
    pub audio_dir: PathBuf,
    pub video_dir: PathBuf,
    /// Lowercased theme slugs of the catalog entry, used to recognize our files.
    pub theme_slugs: Vec<String>,
    pub desired: Vec<DesiredFile>,
}

impl EntryPlan {
    pub fn is_desired(&self, path: &Path) -> bool {
        self.desired.iter().any(|f| f.target_path == path)
    }
}

/// File stem shared by the audio and video outputs of one entry, e.g. `OP1v2`.
pub fn base_name(theme: &Theme, entry: &ThemeEntry) -> String {
    let stem = theme.file_stem();
    if entry.version > 1 {
        format!("{stem}v{}", entry.version)
    } else {
        stem.to_string()
    }
}

pub fn target_file_name(base: &str, axis: OutputAxis) -> String {
    match axis {
        OutputAxis::Video => format!("{base}-video.{}", axis.extension()),
        OutputAxis::Audio => format!("{base}.{}", axis.extension()),
    }
}

/// Where the bytes for an output come from.
pub fn source_url(video: &Video, axis: OutputAxis) -> &str {
    match axis {
        OutputAxis::Video => &video.link,
        OutputAxis::Audio => video.audio_link.as_deref().unwrap_or(&video.link),
    }
}

/// Pick the files to keep for `item` from its catalog entry.
pub fn plan_entry(item: &LibraryItem, anime: &CatalogAnime, config: &SyncConfig) -> EntryPlan {
    let audio_dir = item.path.join(&config.audio_dir);
    let video_dir = item.path.join(&config.video_dir);

    let mut seen = HashSet::new();
    let mut desired = Vec::new();

    for &axis in OutputAxis::ALL {
        let policy = config.policy(item.kind, axis);
        if !policy.is_enabled() {
            continue;
        }
        let dir = if axis.is_video() {
            &video_dir
        } else {
            &audio_dir
        };
        let candidates = scorer::scored_candidates(&anime.themes, CandidateFilter::from(policy));

        for c in candidates.into_iter().take(policy.max_themes as usize) {
            let target_path = dir.join(target_file_name(&base_name(c.theme, c.entry), axis));
            if !seen.insert(target_path.clone()) {
                continue;
            }
            desired.push(DesiredFile {
                target_path,
                source_url: source_url(c.video, axis).to_string(),
                is_video: axis.is_video(),
                volume: policy.clamped_volume(),
            });
        }
    }

    EntryPlan {
        item_id: item.id,
        name: item.name.clone(),
        audio_dir,
        video_dir,
        theme_slugs: anime.theme_slugs(),
        desired,
    }
}
