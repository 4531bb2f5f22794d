use std::path::PathBuf;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub paths: PathsConfig,
    pub series: KindPolicies,
    pub movie: KindPolicies,
    pub services: ServicesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub max_concurrent_downloads: usize,
    pub force_redownload: bool,
    pub delete_unwanted: bool,
    /// Encoder binary; `None` disables post-processing entirely.
    pub encoder_path: Option<PathBuf>,
}

/// Directory names created under each library entry's base path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub audio_dir: String,
    pub video_dir: String,
}

/// Audio and video policies for one media kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindPolicies {
    pub audio: ThemePolicy,
    pub video: ThemePolicy,
}

/// Which themes to keep for one (media kind, output axis) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemePolicy {
    /// Zero or negative disables the axis.
    pub max_themes: i32,
    /// Output volume in percent, 0..=100.
    pub volume: u8,
    pub ignore_op: bool,
    pub ignore_ed: bool,
    pub ignore_overlaps: bool,
    pub ignore_credits: bool,
}

impl ThemePolicy {
    pub fn is_enabled(&self) -> bool {
        self.max_themes > 0
    }

    pub fn clamped_volume(&self) -> u8 {
        self.volume.min(100)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    pub anilist_url: String,
    pub animethemes_url: String,
    pub user_agent: String,
    /// Quota assumed per service until the first response reports one.
    pub initial_quota: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub filter: String,
    /// When set, logs are also written to a daily rolling file here.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "shudaika=info".into(),
            directory: None,
        }
    }
}

impl AppConfig {
    /// Load config: user file if it exists, built-in defaults otherwise.
    pub fn load() -> Result<Self, CoreError> {
        let user_path = Self::config_path();
        if user_path.exists() {
            Self::load_from(&user_path)
        } else {
            toml::from_str(DEFAULT_CONFIG).map_err(|e| CoreError::Config(e.to_string()))
        }
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self, CoreError> {
        let user_str =
            std::fs::read_to_string(path).map_err(|e| CoreError::Config(e.to_string()))?;
        toml::from_str(&user_str).map_err(|e| CoreError::Config(e.to_string()))
    }

    /// Save current config to the user config file.
    pub fn save(&self) -> Result<(), CoreError> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| CoreError::Config(e.to_string()))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    pub fn download_concurrency(&self) -> usize {
        self.general.max_concurrent_downloads.max(1)
    }

    /// Path to user config file (XDG on Linux, AppData on Windows).
    pub fn config_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Path to the library database file.
    pub fn db_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.data_dir().join("shudaika.db"))
            .unwrap_or_else(|| PathBuf::from("shudaika.db"))
    }

    /// Ensure the data directory exists and return the DB path.
    pub fn ensure_db_path() -> Result<PathBuf, CoreError> {
        let path = Self::db_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(path)
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "shudaika")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("built-in default config is valid TOML")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config = AppConfig::default();
        assert_eq!(config.general.max_concurrent_downloads, 3);
        assert!(!config.general.delete_unwanted);
        assert_eq!(config.paths.audio_dir, "theme-music");
        assert!(config.series.audio.is_enabled());
        assert!(!config.series.video.is_enabled());
        assert_eq!(config.logging.filter, "shudaika=info");
    }

    #[test]
    fn test_concurrency_floor() {
        let mut config = AppConfig::default();
        config.general.max_concurrent_downloads = 0;
        assert_eq!(config.download_concurrency(), 1);
    }

    #[test]
    fn test_roundtrip() {
        let config = AppConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: AppConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(deserialized.series.audio, config.series.audio);
        assert_eq!(deserialized.services.initial_quota, 90);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = AppConfig::default();
        config.general.force_redownload = true;
        std::fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert!(loaded.general.force_redownload);

        std::fs::write(&path, "not = [valid").unwrap();
        assert!(matches!(AppConfig::load_from(&path), Err(CoreError::Config(_))));
    }
}
