//! Cache store over a hash/set backend.
//!
//! Merge and evict are sequences of single-key operations. A failure part way
//! through leaves every touched key individually valid and the caller gets a
//! retryable error; nothing is rolled back.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::time::Instant;

use async_trait::async_trait;
use cumulus_types::{AttributeValue, CacheData, Identifier};
use futures::{StreamExt, TryStreamExt, stream};
use metrics::{counter, histogram};
use tracing::{debug, instrument};

use super::backend::{BackendError, KeyValueBackend};
use super::config::CacheConfig;
use super::contract::{ReadableCache, WriteableCache};
use super::error::CacheError;
use super::filter::{CacheFilter, IdentifierGlob, allows};
use super::keys::CacheKeys;

const METRIC_MERGE_ITEMS: &str = "cumulus_cache_merge_items_total";
const METRIC_MERGE_MS: &str = "cumulus_cache_merge_ms";
const METRIC_EVICT_ITEMS: &str = "cumulus_cache_evict_items_total";
const METRIC_READS: &str = "cumulus_cache_read_total";
const METRIC_READS_ABSENT: &str = "cumulus_cache_read_absent_total";

/// Hash field holding the entity id. Keeps an entity present after all of its
/// producer attributes were deleted.
const ID_FIELD: &str = "id";

/// Relationship-aware cache over any [`KeyValueBackend`].
pub struct KeyValueCache<B> {
    backend: B,
    keys: CacheKeys,
    config: CacheConfig,
}

impl<B: KeyValueBackend> KeyValueCache<B> {
    pub fn new(backend: B, config: CacheConfig) -> Self {
        Self {
            backend,
            keys: CacheKeys::new(config.prefix.clone()),
            config,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn keys(&self) -> &CacheKeys {
        &self.keys
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Run one backend call under the configured I/O deadline.
    async fn call<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T, BackendError>> + Send,
    ) -> Result<T, CacheError> {
        match tokio::time::timeout(self.config.io_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(CacheError::Backend { op, source }),
            Err(_) => Err(CacheError::Timeout {
                op,
                timeout: self.config.io_timeout,
            }),
        }
    }

    async fn read_relationships(
        &self,
        type_name: &str,
        id: &str,
        filter: Option<&CacheFilter>,
    ) -> Result<BTreeMap<String, BTreeSet<Identifier>>, CacheError> {
        let index_key = self.keys.relationship_index(type_name, id);
        let names = self
            .call("set_members", self.backend.set_members(&index_key))
            .await?;

        let mut relationships = BTreeMap::new();
        for name in names {
            if !allows(filter, &name) {
                continue;
            }
            let key = self.keys.relationship(type_name, id, &name);
            let targets = self.call("set_members", self.backend.set_members(&key)).await?;
            relationships.insert(name, targets);
        }
        Ok(relationships)
    }
}

fn split_attributes(
    type_name: &str,
    data: &CacheData,
) -> Result<(Vec<(String, String)>, Vec<String>), CacheError> {
    let mut writes = Vec::new();
    let mut deletes = Vec::new();
    for (key, value) in data.attributes() {
        if key == ID_FIELD {
            debug!(type_name, id = data.id(), "ignoring reserved attribute");
            continue;
        }
        if value.is_null() {
            deletes.push(key.clone());
            continue;
        }
        let encoded = serde_json::to_string(value).map_err(|source| CacheError::Encode {
            type_name: type_name.to_string(),
            id: data.id().to_string(),
            attribute: key.clone(),
            source,
        })?;
        writes.push((key.clone(), encoded));
    }
    if !data.attributes().is_empty() {
        let encoded_id = serde_json::to_string(data.id()).map_err(|source| CacheError::Encode {
            type_name: type_name.to_string(),
            id: data.id().to_string(),
            attribute: ID_FIELD.to_string(),
            source,
        })?;
        writes.push((ID_FIELD.to_string(), encoded_id));
    }
    Ok((writes, deletes))
}

#[async_trait]
impl<B: KeyValueBackend> ReadableCache for KeyValueCache<B> {
    #[instrument(skip(self, filter), fields(prefix = %self.keys.prefix()))]
    async fn get_filtered(
        &self,
        type_name: &str,
        id: &str,
        filter: Option<&CacheFilter>,
    ) -> Result<Option<CacheData>, CacheError> {
        counter!(METRIC_READS, "type" => type_name.to_string()).increment(1);

        let raw = self
            .call(
                "hash_get_all",
                self.backend.hash_get_all(&self.keys.attributes(type_name, id)),
            )
            .await?;
        if raw.is_empty() {
            counter!(METRIC_READS_ABSENT, "type" => type_name.to_string()).increment(1);
            return Ok(None);
        }

        let mut attributes = BTreeMap::new();
        for (attribute, encoded) in raw {
            if attribute == ID_FIELD {
                continue;
            }
            let value: AttributeValue =
                serde_json::from_str(&encoded).map_err(|source| CacheError::Decode {
                    type_name: type_name.to_string(),
                    id: id.to_string(),
                    attribute: attribute.clone(),
                    source,
                })?;
            attributes.insert(attribute, value);
        }

        let relationships = self.read_relationships(type_name, id, filter).await?;

        CacheData::from_parts(id, attributes, relationships)
            .map(Some)
            .map_err(|source| CacheError::Invalid {
                type_name: type_name.to_string(),
                source,
            })
    }

    #[instrument(skip(self), fields(prefix = %self.keys.prefix()))]
    async fn get_all(&self, type_name: &str) -> Result<Vec<CacheData>, CacheError> {
        let ids = self.get_identifiers(type_name).await?;
        let requested = ids.len();

        let found: Vec<CacheData> = stream::iter(ids)
            .map(|id| async move { self.get(type_name, &id).await })
            .buffered(self.config.read_concurrency_non_zero().get())
            .try_filter_map(|item| async move { Ok(item) })
            .try_collect()
            .await?;

        debug!(
            type_name,
            requested,
            found = found.len(),
            "resolved all entities of type"
        );
        Ok(found)
    }

    async fn get_identifiers(&self, type_name: &str) -> Result<Vec<Identifier>, CacheError> {
        let members = self
            .call(
                "set_members",
                self.backend.set_members(&self.keys.members(type_name)),
            )
            .await?;
        Ok(members.into_iter().collect())
    }

    async fn filter_identifiers(
        &self,
        type_name: &str,
        glob: &str,
    ) -> Result<Vec<Identifier>, CacheError> {
        let matcher = IdentifierGlob::new(glob).map_err(|source| CacheError::InvalidPattern {
            pattern: glob.to_string(),
            source,
        })?;
        let ids = self.get_identifiers(type_name).await?;
        Ok(ids.into_iter().filter(|id| matcher.matches(id)).collect())
    }
}

#[async_trait]
impl<B: KeyValueBackend> WriteableCache for KeyValueCache<B> {
    #[instrument(skip(self, data), fields(prefix = %self.keys.prefix(), id = %data.id()))]
    async fn merge(&self, type_name: &str, data: &CacheData) -> Result<(), CacheError> {
        let started_at = Instant::now();
        data.validate().map_err(|source| CacheError::Invalid {
            type_name: type_name.to_string(),
            source,
        })?;

        let id = data.id();
        let (writes, deletes) = split_attributes(type_name, data)?;
        let attributes_key = self.keys.attributes(type_name, id);

        // Write before deleting so the hash never passes through empty.
        if !writes.is_empty() {
            self.call("hash_set", self.backend.hash_set(&attributes_key, writes))
                .await?;
        }
        if !deletes.is_empty() {
            self.call(
                "hash_delete",
                self.backend.hash_delete(&attributes_key, &deletes),
            )
            .await?;
        }

        self.call(
            "set_add",
            self.backend
                .set_add(&self.keys.members(type_name), &[id.to_string()]),
        )
        .await?;

        let relationships = data.relationships();
        if !relationships.is_empty() {
            let names: Vec<String> = relationships.keys().cloned().collect();
            self.call(
                "set_add",
                self.backend
                    .set_add(&self.keys.relationship_index(type_name, id), &names),
            )
            .await?;

            // One atomic replace per relationship name; names are not atomic
            // with respect to each other.
            for (name, targets) in relationships {
                let targets: Vec<String> = targets.iter().cloned().collect();
                self.call(
                    "set_replace",
                    self.backend
                        .set_replace(&self.keys.relationship(type_name, id, name), &targets),
                )
                .await?;
            }
        }

        counter!(METRIC_MERGE_ITEMS, "type" => type_name.to_string()).increment(1);
        histogram!(METRIC_MERGE_MS, "type" => type_name.to_string())
            .record(started_at.elapsed().as_secs_f64() * 1000.0);
        Ok(())
    }

    #[instrument(skip(self), fields(prefix = %self.keys.prefix()))]
    async fn evict(&self, type_name: &str, id: &str) -> Result<(), CacheError> {
        let index_key = self.keys.relationship_index(type_name, id);
        let names = self
            .call("set_members", self.backend.set_members(&index_key))
            .await?;

        let mut doomed = Vec::with_capacity(names.len() + 2);
        doomed.push(self.keys.attributes(type_name, id));
        doomed.extend(
            names
                .iter()
                .map(|name| self.keys.relationship(type_name, id, name)),
        );
        doomed.push(index_key);

        self.call("delete", self.backend.delete(&doomed)).await?;
        self.call(
            "set_remove",
            self.backend
                .set_remove(&self.keys.members(type_name), &[id.to_string()]),
        )
        .await?;

        counter!(METRIC_EVICT_ITEMS, "type" => type_name.to_string()).increment(1);
        Ok(())
    }
}
