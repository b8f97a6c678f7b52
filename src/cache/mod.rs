//! Cumulus Cache Store
//!
//! Relationship-aware key-value cache written by caching agents and read by
//! request-serving code:
//!
//! - **Store**: [`KeyValueCache`] implements the read/write contract over any
//!   hash/set backend, honoring an I/O deadline on every call
//! - **Composite**: [`CompositeCache`] fans reads out to several sources and
//!   merges whatever answers within a shared deadline
//!
//! ## Key layout
//!
//! ```text
//! prefix:type:members                      set of ids
//! prefix:type:attributes:id                hash field -> JSON value
//! prefix:type:relationships:id             set of relationship names
//! prefix:type:relationships:id:name        set of target ids
//! ```
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! prefix = "cumulus"
//! io_timeout_ms = 2000
//! fan_out_timeout_ms = 5000
//! read_concurrency = 16
//! ```

mod backend;
mod composite;
mod config;
mod contract;
mod error;
mod filter;
mod keys;
mod memory;
mod store;

pub use backend::{BackendError, KeyValueBackend};
pub use composite::{CompositeCache, gather_within};
pub use config::CacheConfig;
pub use contract::{ReadableCache, WriteableCache};
pub use error::CacheError;
pub use filter::{CacheFilter, IdentifierGlob};
pub use keys::CacheKeys;
pub use memory::MemoryBackend;
pub use store::KeyValueCache;
