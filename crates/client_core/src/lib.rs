use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use thiserror::Error;

pub mod api;
pub mod credentials;
pub mod session;
mod toggle;

pub use api::SocialApiClient;
pub use credentials::{
    CredentialError, CredentialStore, FileCredentialStore, InMemoryCredentialStore,
};
pub use session::SocialSession;
pub use toggle::{
    OptimisticActionController, SeedOutcome, StoreKey, ToggleEvent, ToggleRecord, ToggleStore,
};

#[derive(Debug, Error)]
pub enum ToggleError {
    /// Another toggle for the same key is still waiting on its confirmation.
    #[error("a toggle for {key} is already in flight")]
    Concurrent { key: String },
    /// The remote confirmation failed; local state has already been reverted.
    #[error("toggle for {key} failed and was rolled back: {source}")]
    Failed { key: String, source: anyhow::Error },
}

impl ToggleError {
    pub fn key(&self) -> &str {
        match self {
            ToggleError::Concurrent { key } | ToggleError::Failed { key, .. } => key,
        }
    }

    /// Whether the user should be told. A concurrent toggle is a double click, not a failure.
    pub fn should_notify(&self) -> bool {
        matches!(self, ToggleError::Failed { .. })
    }
}

/// Remote side of a toggle: sets the server state for `key` to `desired`.
#[async_trait]
pub trait ConfirmationAction<K>: Send + Sync {
    async fn confirm(&self, key: &K, desired: bool) -> Result<()>;
}

#[async_trait]
impl<K, T> ConfirmationAction<K> for Arc<T>
where
    K: Sync + 'static,
    T: ConfirmationAction<K> + ?Sized,
{
    async fn confirm(&self, key: &K, desired: bool) -> Result<()> {
        (**self).confirm(key, desired).await
    }
}

pub struct MissingConfirmation;

#[async_trait]
impl<K> ConfirmationAction<K> for MissingConfirmation
where
    K: std::fmt::Display + Sync + 'static,
{
    async fn confirm(&self, key: &K, _desired: bool) -> Result<()> {
        Err(anyhow!("confirmation backend unavailable for {key}"))
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
