//! Hash/set oriented key-value backend.
//!
//! The cache store only needs a handful of primitives, each atomic on a single
//! key. Nothing here spans keys; multi-key consistency is not offered.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("backing store unavailable: {message}")]
    Unavailable { message: String },
    #[error("key `{key}` holds a {actual} but a {expected} was required")]
    WrongType {
        key: String,
        expected: &'static str,
        actual: &'static str,
    },
}

impl BackendError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    /// Write fields into a hash, overwriting existing values.
    async fn hash_set(&self, key: &str, fields: Vec<(String, String)>) -> Result<(), BackendError>;

    /// Remove fields from a hash. Removing the last field removes the key.
    async fn hash_delete(&self, key: &str, fields: &[String]) -> Result<(), BackendError>;

    /// Read a whole hash; a missing key reads as empty.
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, BackendError>;

    async fn set_add(&self, key: &str, members: &[String]) -> Result<(), BackendError>;

    /// Remove members from a set. Removing the last member removes the key.
    async fn set_remove(&self, key: &str, members: &[String]) -> Result<(), BackendError>;

    /// Read a whole set; a missing key reads as empty.
    async fn set_members(&self, key: &str) -> Result<BTreeSet<String>, BackendError>;

    /// Atomically replace a set's members. An empty slice deletes the key.
    async fn set_replace(&self, key: &str, members: &[String]) -> Result<(), BackendError>;

    /// Delete keys of any structure; unknown keys are ignored.
    async fn delete(&self, keys: &[String]) -> Result<(), BackendError>;
}
