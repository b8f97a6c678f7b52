//! Cache configuration.
//!
//! Controls key namespacing and I/O deadlines via the `[cache]` section.

use std::num::NonZeroUsize;
use std::time::Duration;

const DEFAULT_PREFIX: &str = "cumulus";
const DEFAULT_IO_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_FAN_OUT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_READ_CONCURRENCY: usize = 16;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Namespace for every key this cache writes.
    pub prefix: String,
    /// Deadline applied to each backing-store call.
    pub io_timeout: Duration,
    /// Shared deadline for composite reads across sources.
    pub fan_out_timeout: Duration,
    /// Maximum concurrent entity reads during `get_all`.
    pub read_concurrency: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            io_timeout: Duration::from_millis(DEFAULT_IO_TIMEOUT_MS),
            fan_out_timeout: Duration::from_millis(DEFAULT_FAN_OUT_TIMEOUT_MS),
            read_concurrency: DEFAULT_READ_CONCURRENCY,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            prefix: settings.prefix.clone(),
            io_timeout: settings.io_timeout,
            fan_out_timeout: settings.fan_out_timeout,
            read_concurrency: settings.read_concurrency.get(),
        }
    }
}

impl CacheConfig {
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Returns the read concurrency, clamping to 1 if zero.
    pub fn read_concurrency_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.read_concurrency).unwrap_or(NonZeroUsize::MIN)
    }
}
