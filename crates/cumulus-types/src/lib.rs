//! Shared value objects for the cumulus inventory cache.
//!
//! These types travel between caching agents, the cache store and the
//! configuration layer. They carry no runtime dependencies so that agent
//! implementations can depend on them without pulling in the service.

mod account;
mod cache_data;
mod cache_result;

use thiserror::Error;

pub use account::{AccountDescriptor, DEFAULT_PROVIDER_VERSION};
pub use cache_data::{AttributeValue, CacheData, Identifier};
pub use cache_result::CacheResult;

/// Validation failures for the shared value objects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("cache data identifier must not be empty")]
    EmptyIdentifier,
    #[error("account field `{field}` must not be blank")]
    BlankAccountField { field: &'static str },
    #[error("account `{account}` has an invalid poll interval: {reason}")]
    InvalidPollInterval { account: String, reason: String },
}
