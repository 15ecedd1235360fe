//! On-disk state for the page picker: the last session, the last source
//! directory, and user settings, all under one data directory.

pub mod config;

use directories::ProjectDirs;
use doc_model::{SessionState, Settings};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub use config::{apply_env_overrides, apply_overrides, ConfigError, DATA_DIR_VAR};

const SESSION_FILE: &str = "last_pdf_edit_state.json";
const LAST_DIR_FILE: &str = "last_pdf_dir.txt";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// `PAGE_MERGER_DATA_DIR` if set, otherwise the platform's local data
    /// directory for the application.
    pub fn from_default_project() -> Result<Self, StorageError> {
        if let Some(root) = env::var_os(DATA_DIR_VAR).filter(|value| !value.is_empty()) {
            return Ok(Self::with_root(root));
        }

        let dirs = ProjectDirs::from("dev", "PageMerger", "page-merger")
            .ok_or(StorageError::NoDataDirectory)?;

        Ok(Self { root: dirs.data_local_dir().to_path_buf() })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_path(&self) -> PathBuf {
        self.root.join(SESSION_FILE)
    }

    /// `Ok(None)` when no session has been saved.
    pub fn load_session(&self) -> Result<Option<SessionState>, StorageError> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&path)?;
        let session: SessionState = serde_json::from_slice(&bytes)?;
        tracing::debug!(path = %path.display(), rows = session.pages.len(), "session loaded");
        Ok(Some(session))
    }

    pub fn save_session(&self, session: &SessionState) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;

        let bytes = serde_json::to_vec_pretty(session)?;
        fs::write(self.session_path(), bytes)?;
        tracing::info!(rows = session.pages.len(), excluded = session.excluded.len(), "session saved");
        Ok(())
    }

    /// The last source directory, if it was saved and still exists.
    pub fn load_last_dir(&self) -> Option<PathBuf> {
        let contents = fs::read_to_string(self.root.join(LAST_DIR_FILE)).ok()?;
        let dir = PathBuf::from(contents.trim());
        dir.is_dir().then_some(dir)
    }

    pub fn save_last_dir(&self, dir: &Path) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;
        fs::write(self.root.join(LAST_DIR_FILE), dir.to_string_lossy().as_bytes())?;
        Ok(())
    }

    /// Settings from `settings.json` (defaults when absent) with environment
    /// overrides applied.
    pub fn load_settings(&self) -> Result<Settings, StorageError> {
        let path = self.root.join(SETTINGS_FILE);
        let mut settings = if path.exists() {
            serde_json::from_slice(&fs::read(path)?)?
        } else {
            Settings::default()
        };

        apply_env_overrides(&mut settings)?;
        Ok(settings)
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;

        let bytes = serde_json::to_vec_pretty(settings)?;
        fs::write(self.root.join(SETTINGS_FILE), bytes)?;
        Ok(())
    }
}
