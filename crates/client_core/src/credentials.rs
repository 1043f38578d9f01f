//! Access/refresh token storage.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use shared::protocol::TokenPair;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to access credential file '{}': {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("credential file '{}' is malformed: {source}", path.display())]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
}

pub trait CredentialStore: Send + Sync {
    fn get(&self) -> Result<Option<TokenPair>, CredentialError>;
    fn set(&self, tokens: &TokenPair) -> Result<(), CredentialError>;
    fn clear(&self) -> Result<(), CredentialError>;
}

#[derive(Default)]
pub struct InMemoryCredentialStore {
    tokens: Mutex<Option<TokenPair>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(tokens: TokenPair) -> Self {
        Self {
            tokens: Mutex::new(Some(tokens)),
        }
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn get(&self) -> Result<Option<TokenPair>, CredentialError> {
        Ok(self
            .tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn set(&self, tokens: &TokenPair) -> Result<(), CredentialError> {
        *self.tokens.lock().unwrap_or_else(PoisonError::into_inner) = Some(tokens.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialError> {
        *self.tokens.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Keeps the token pair as a JSON document on disk.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "credentials".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: io::Error) -> CredentialError {
        CredentialError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> Result<Option<TokenPair>, CredentialError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.io_error(err)),
        };

        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| CredentialError::Malformed {
                path: self.path.clone(),
                source,
            })
    }

    fn set(&self, tokens: &TokenPair) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| self.io_error(err))?;
        }

        let raw = serde_json::to_string_pretty(tokens).map_err(|source| {
            CredentialError::Malformed {
                path: self.path.clone(),
                source,
            }
        })?;

        // Readers see either the previous file or the complete new one.
        let staging = self.staging_path();
        write_private(&staging, raw.as_bytes())
            .and_then(|()| fs::rename(&staging, &self.path))
            .map_err(|err| {
                let _ = fs::remove_file(&staging);
                self.io_error(err)
            })?;
        debug!(path = %self.path.display(), "stored credentials");
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(self.io_error(err)),
        }
    }
}

fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    // The mode only applies on create, so a leftover staging file must go first.
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => return Err(err),
        _ => {}
    }
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(test)]
#[path = "tests/credentials_tests.rs"]
mod tests;
