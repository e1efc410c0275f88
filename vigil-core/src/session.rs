//! Restorable session state
//!
//! Only two fields survive a restart: the project being analysed and whether a
//! watch session was active. They are stored as a small JSON document next to
//! the logs, independently of the runtime state, so a client started after a
//! reload can resume watching without issuing a new start-run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Result;
use crate::types::RunState;

/// The restorable subset of a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestorableSession {
    pub project_path: String,
    pub is_watching: bool,
}

impl RestorableSession {
    /// Extract the restorable fields from a state snapshot
    pub fn from_state(state: &RunState) -> Self {
        Self {
            project_path: state.project_path.clone(),
            is_watching: state.is_watching,
        }
    }
}

/// Reads and writes [`RestorableSession`] at a fixed path
#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    /// Session file at the default XDG location
    pub fn default_location() -> Self {
        Self::at(Config::session_path())
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored session.
    ///
    /// A missing file is an empty session. An unreadable or corrupt file is
    /// logged and also treated as empty.
    pub fn load(&self) -> RestorableSession {
        match self.try_load() {
            Ok(Some(session)) => session,
            Ok(None) => RestorableSession::default(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Ignoring unreadable session file");
                RestorableSession::default()
            }
        }
    }

    fn try_load(&self) -> Result<Option<RestorableSession>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Persist the session, creating parent directories as needed.
    pub fn save(&self, session: &RestorableSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(session)?)?;
        std::fs::rename(&tmp, &self.path)?;
        tracing::debug!(
            path = %self.path.display(),
            project_path = %session.project_path,
            is_watching = session.is_watching,
            "Saved session"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty_session() {
        let dir = TempDir::new().unwrap();
        let file = SessionFile::at(dir.path().join("session.json"));
        assert_eq!(file.load(), RestorableSession::default());
    }

    #[test]
    fn test_save_and_restore_verbatim() {
        let dir = TempDir::new().unwrap();
        let file = SessionFile::at(dir.path().join("nested/session.json"));
        let session = RestorableSession {
            project_path: "/home/dev/webapp".to_string(),
            is_watching: true,
        };
        file.save(&session).unwrap();
        assert_eq!(file.load(), session);
    }

    #[test]
    fn test_corrupt_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(SessionFile::at(&path).load(), RestorableSession::default());
    }

    #[test]
    fn test_from_state_ignores_runtime_fields() {
        let state = RunState {
            project_path: "/p".to_string(),
            is_watching: true,
            is_analyzing: true,
            last_system_message: "noise".to_string(),
            ..Default::default()
        };
        assert_eq!(
            RestorableSession::from_state(&state),
            RestorableSession {
                project_path: "/p".to_string(),
                is_watching: true,
            }
        );
    }
}
