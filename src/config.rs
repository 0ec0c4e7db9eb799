use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::policy::ViolationPolicy;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub violation_threshold: u32,
    pub grace_period_secs: u32,
    pub tick_interval_ms: u64,
    pub debounce_ms: u64,
    /// Terminal size at or above which the session counts as full-screen.
    pub min_width: u16,
    pub min_height: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            violation_threshold: ViolationPolicy::DEFAULT_THRESHOLD,
            grace_period_secs: 10,
            tick_interval_ms: 1000,
            debounce_ms: 250,
            min_width: 80,
            min_height: 24,
        }
    }
}

impl Settings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

pub trait SettingsStore {
    fn load(&self) -> Settings;
    fn save(&self, settings: &Settings) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "quizguard") {
            pd.config_dir().join("settings.json")
        } else {
            PathBuf::from("quizguard_settings.json")
        };
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileSettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> Settings {
        if let Ok(bytes) = fs::read(&self.path) {
            match serde_json::from_slice::<Settings>(&bytes) {
                Ok(settings) => return settings,
                Err(e) => debug!(path = %self.path.display(), error = %e, "ignoring unreadable settings"),
            }
        }
        Settings::default()
    }

    fn save(&self, settings: &Settings) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(settings).unwrap_or_default();
        fs::write(&self.path, data)
    }
}
