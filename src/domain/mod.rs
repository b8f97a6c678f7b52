//! Domain layer types and invariants.

pub mod accounts;
pub mod error;

pub use cumulus_types::{
    AccountDescriptor, AttributeValue, CacheData, CacheResult, DEFAULT_PROVIDER_VERSION,
    Identifier, ModelError,
};
