//! Durable home for the `{user, token}` record between reloads.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::auth::PersistedSession;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("session storage io failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("stored session is corrupt: {0}")]
    Corrupt(String),
    #[error("session could not be encoded: {0}")]
    Encode(String),
}

pub trait SessionStorage: Send + Sync {
    fn load_session(&self) -> Result<Option<PersistedSession>, StorageError>;
    fn persist_session(&self, session: &PersistedSession) -> Result<(), StorageError>;
    fn clear_session(&self) -> Result<(), StorageError>;
}

/// Keeps the serialized record in memory, the way a cookie jar would.
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    entry: Mutex<Option<String>>,
}

impl MemorySessionStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the raw stored text, corrupt or not.
    #[must_use]
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            entry: Mutex::new(Some(raw.into())),
        }
    }

    #[must_use]
    pub fn raw(&self) -> Option<String> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Option<String>> {
        self.entry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SessionStorage for MemorySessionStorage {
    fn load_session(&self) -> Result<Option<PersistedSession>, StorageError> {
        self.lock().as_deref().map(decode).transpose()
    }

    fn persist_session(&self, session: &PersistedSession) -> Result<(), StorageError> {
        *self.lock() = Some(encode(session)?);
        Ok(())
    }

    fn clear_session(&self) -> Result<(), StorageError> {
        *self.lock() = None;
        Ok(())
    }
}

/// Stores the record as a JSON file.
#[derive(Debug, Clone)]
pub struct FileSessionStorage {
    path: PathBuf,
}

impl FileSessionStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl SessionStorage for FileSessionStorage {
    fn load_session(&self) -> Result<Option<PersistedSession>, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => decode(&raw).map(Some),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(self.io_error(error)),
        }
    }

    fn persist_session(&self, session: &PersistedSession) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|error| self.io_error(error))?;
        }
        let encoded = encode(session)?;
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, encoded).map_err(|error| self.io_error(error))?;
        fs::rename(&staging, &self.path).map_err(|error| self.io_error(error))?;
        debug!(path = %self.path.display(), "session persisted");
        Ok(())
    }

    fn clear_session(&self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(self.io_error(error)),
        }
    }
}

fn encode(session: &PersistedSession) -> Result<String, StorageError> {
    serde_json::to_string(session).map_err(|error| StorageError::Encode(error.to_string()))
}

// `{}` (an erased cookie) fails here for lack of a `user`.
fn decode(raw: &str) -> Result<PersistedSession, StorageError> {
    serde_json::from_str(raw).map_err(|error| StorageError::Corrupt(error.to_string()))
}
