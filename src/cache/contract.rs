//! Read and write contracts shared by agents and request-serving code.

use std::collections::BTreeSet;

use async_trait::async_trait;
use cumulus_types::{CacheData, Identifier};

use super::error::CacheError;
use super::filter::CacheFilter;

/// Read access keyed by `(type, id)`.
///
/// Reads carry no cross-entity snapshot guarantee: an entity may be observed
/// mid-merge, and an id may be listed after a concurrent writer evicted it.
#[async_trait]
pub trait ReadableCache: Send + Sync {
    /// Reads one entity. Missing or empty attributes resolve to `None`.
    async fn get_filtered(
        &self,
        type_name: &str,
        id: &str,
        filter: Option<&CacheFilter>,
    ) -> Result<Option<CacheData>, CacheError>;

    async fn get(&self, type_name: &str, id: &str) -> Result<Option<CacheData>, CacheError> {
        self.get_filtered(type_name, id, None).await
    }

    /// Every present entity of a type. Tombstoned ids are dropped.
    async fn get_all(&self, type_name: &str) -> Result<Vec<CacheData>, CacheError>;

    /// Present entities among `ids`, in request order, without duplicates.
    async fn get_all_of(
        &self,
        type_name: &str,
        ids: &[Identifier],
    ) -> Result<Vec<CacheData>, CacheError> {
        let mut seen = BTreeSet::new();
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if !seen.insert(id.as_str()) {
                continue;
            }
            if let Some(data) = self.get(type_name, id).await? {
                found.push(data);
            }
        }
        Ok(found)
    }

    /// The raw id set of a type, which may still list tombstones.
    async fn get_identifiers(&self, type_name: &str) -> Result<Vec<Identifier>, CacheError>;

    /// Ids of a type matching a glob such as `aws:prod:*`.
    async fn filter_identifiers(
        &self,
        type_name: &str,
        glob: &str,
    ) -> Result<Vec<Identifier>, CacheError>;
}

/// Write access. Each call is independent; nothing spans calls.
#[async_trait]
pub trait WriteableCache: ReadableCache {
    async fn merge(&self, type_name: &str, data: &CacheData) -> Result<(), CacheError>;

    async fn merge_all(&self, type_name: &str, items: &[CacheData]) -> Result<(), CacheError> {
        for item in items {
            self.merge(type_name, item).await?;
        }
        Ok(())
    }

    /// Removes an entity. Unknown ids are a no-op.
    async fn evict(&self, type_name: &str, id: &str) -> Result<(), CacheError>;

    async fn evict_all(&self, type_name: &str, ids: &[Identifier]) -> Result<(), CacheError> {
        for id in ids {
            self.evict(type_name, id).await?;
        }
        Ok(())
    }
}
