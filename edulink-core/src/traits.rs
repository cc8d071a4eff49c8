//! Core trait definitions

use crate::error::EdulinkResult;
use crate::types::{Credentials, UserProfile};
use async_trait::async_trait;

/// Durable string key/value storage that survives process restarts
///
/// Failures are reported as [`crate::EdulinkError::Storage`]. Implementations
/// give no atomicity across keys: callers writing several keys must treat the
/// group as best-effort.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` when the key was never written or was removed
    async fn get(&self, key: &str) -> EdulinkResult<Option<String>>;

    /// Write a value, replacing any previous one
    async fn set(&self, key: &str, value: &str) -> EdulinkResult<()>;

    /// Delete a key; deleting a missing key succeeds
    async fn remove(&self, key: &str) -> EdulinkResult<()>;
}

/// Remote calls that turn credentials into a signed-in identity
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// Exchange credentials for an opaque bearer token
    async fn authenticate(&self, credentials: &Credentials) -> EdulinkResult<String>;

    /// Fetch the profile of the user owning `token`
    async fn fetch_profile(&self, token: &str) -> EdulinkResult<UserProfile>;
}
