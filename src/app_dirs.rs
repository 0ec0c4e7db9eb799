use directories::ProjectDirs;
use std::path::PathBuf;

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    pub fn state_dir() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            Some(
                PathBuf::from(home)
                    .join(".local")
                    .join("state")
                    .join("quizguard"),
            )
        } else {
            ProjectDirs::from("", "", "quizguard").map(|pd| pd.data_local_dir().to_path_buf())
        }
    }

    pub fn db_path() -> Option<PathBuf> {
        Self::state_dir().map(|d| d.join("sessions.db"))
    }

    pub fn log_dir() -> Option<PathBuf> {
        Self::state_dir().map(|d| d.join("logs"))
    }
}
