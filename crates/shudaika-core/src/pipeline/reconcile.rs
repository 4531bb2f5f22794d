use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::plan::EntryPlan;

/// Delete stale theme files of one entry.
///
/// A file is stale when it sits directly in the entry's audio or video
/// directory, is not desired, and its name contains one of the entry's
/// theme slugs. Anything else in those directories is left alone.
pub fn reconcile_entry(plan: &EntryPlan) -> Vec<PathBuf> {
    let slugs: Vec<String> = plan
        .theme_slugs
        .iter()
        .map(|s| s.to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    if slugs.is_empty() {
        return Vec::new();
    }

    let mut deleted = Vec::new();
    for dir in [&plan.audio_dir, &plan.video_dir] {
        for path in stale_files(dir, plan, &slugs) {
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    info!(
                        entry = %plan.name,
                        path = %path.display(),
                        "Removed unwanted theme file"
                    );
                    deleted.push(path);
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to remove unwanted theme file"
                    );
                }
            }
        }
    }
    deleted
}

fn stale_files(dir: &Path, plan: &EntryPlan, slugs: &[String]) -> Vec<PathBuf> {
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "Nothing to reconcile");
        return Vec::new();
    }

    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|path| !plan.is_desired(path))
        .filter(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            slugs.iter().any(|slug| name.contains(slug.as_str()))
        })
        .collect()
}
