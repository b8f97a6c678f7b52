use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use cumulus_types::{CacheResult, Identifier};
use dashmap::DashMap;
use tracing::{debug, instrument, warn};

use super::{AgentError, AgentIdentity, Authority, CachingAgent};
use crate::cache::WriteableCache;

type WrittenIds = BTreeMap<String, BTreeSet<Identifier>>;

/// Counts from applying one poll result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub merged: usize,
    pub evicted: usize,
    /// Ids of authoritative types evicted because the agent stopped
    /// reporting them. Included in `evicted`.
    pub stale_evicted: usize,
    /// Types present in the result that the agent never declared.
    pub skipped_types: Vec<String>,
}

/// Applies agent results to a cache.
///
/// For every authoritative type, the ids an agent identity wrote on its last
/// successful poll are remembered. Ids missing from the next result are
/// evicted even if the agent does not list them, and so are all ids of a type
/// the agent no longer declares. Tracking is keyed by identity, so a rebuilt
/// agent cleans up after its predecessor. The remembered set only advances
/// once the whole result has been written.
pub struct AgentExecution {
    cache: Arc<dyn WriteableCache>,
    written: DashMap<AgentIdentity, WrittenIds>,
}

impl AgentExecution {
    pub fn new(cache: Arc<dyn WriteableCache>) -> Self {
        Self {
            cache,
            written: DashMap::new(),
        }
    }

    pub fn cache(&self) -> &Arc<dyn WriteableCache> {
        &self.cache
    }

    /// Ids of `type_name` last written by `identity`, sorted.
    pub fn written_ids(&self, identity: &AgentIdentity, type_name: &str) -> Vec<Identifier> {
        self.written
            .get(identity)
            .and_then(|types| types.get(type_name).map(|ids| ids.iter().cloned().collect()))
            .unwrap_or_default()
    }

    /// Poll the agent once and write the result.
    #[instrument(skip_all, fields(agent = %agent.identity()))]
    pub async fn execute(&self, agent: &dyn CachingAgent) -> Result<ExecutionReport, AgentError> {
        let result = agent.load_data().await?;
        self.apply(agent, result).await
    }

    /// Merge every upsert, then evict every eviction, type by type.
    pub async fn apply(
        &self,
        agent: &dyn CachingAgent,
        result: CacheResult,
    ) -> Result<ExecutionReport, AgentError> {
        let identity = agent.identity();
        let data_types = agent.provided_data_types();
        let declared: BTreeSet<String> = data_types
            .iter()
            .map(|data_type| data_type.type_name.clone())
            .collect();
        let authoritative: BTreeSet<String> = data_types
            .into_iter()
            .filter(|data_type| data_type.authority == Authority::Authoritative)
            .map(|data_type| data_type.type_name)
            .collect();

        let previous = self
            .written
            .get(&identity)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        let mut current = WrittenIds::new();
        for type_name in &authoritative {
            let ids: BTreeSet<Identifier> = result
                .upserts
                .get(type_name)
                .map(|items| items.iter().map(|data| data.id().to_string()).collect())
                .unwrap_or_default();
            current.insert(type_name.clone(), ids);
        }

        let mut stale: Vec<(String, Vec<Identifier>)> = Vec::new();
        for (type_name, before) in &previous {
            let keep: BTreeSet<&str> = match current.get(type_name) {
                Some(ids) => ids.iter().map(String::as_str).collect(),
                None if declared.contains(type_name) => continue,
                None => BTreeSet::new(),
            };
            let listed: BTreeSet<&str> = result
                .evictions
                .get(type_name)
                .filter(|_| declared.contains(type_name))
                .map(|ids| ids.iter().map(String::as_str).collect())
                .unwrap_or_default();
            let ids: Vec<Identifier> = before
                .iter()
                .filter(|id| !keep.contains(id.as_str()) && !listed.contains(id.as_str()))
                .cloned()
                .collect();
            if !ids.is_empty() {
                stale.push((type_name.clone(), ids));
            }
        }

        let mut report = ExecutionReport::default();
        let skip = |type_name: &str, report: &mut ExecutionReport| {
            if declared.contains(type_name) {
                return false;
            }
            if !report.skipped_types.iter().any(|t| t == type_name) {
                warn!(
                    agent = %identity,
                    type_name,
                    "agent produced data for an undeclared type; skipping"
                );
                report.skipped_types.push(type_name.to_string());
            }
            true
        };

        for (type_name, items) in &result.upserts {
            if skip(type_name, &mut report) {
                continue;
            }
            self.cache.merge_all(type_name, items).await?;
            report.merged += items.len();
        }

        for (type_name, ids) in &result.evictions {
            if skip(type_name, &mut report) {
                continue;
            }
            self.cache.evict_all(type_name, ids).await?;
            report.evicted += ids.len();
        }

        for (type_name, ids) in &stale {
            self.cache.evict_all(type_name, ids).await?;
            report.evicted += ids.len();
            report.stale_evicted += ids.len();
        }

        if current.is_empty() {
            self.written.remove(&identity);
        } else {
            self.written.insert(identity.clone(), current);
        }

        debug!(
            agent = %identity,
            merged = report.merged,
            evicted = report.evicted,
            stale_evicted = report.stale_evicted,
            "applied agent result"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use cumulus_types::CacheData;

    use super::*;
    use crate::agent::AgentDataType;
    use crate::cache::{
        CacheConfig, CacheError, CacheFilter, KeyValueCache, MemoryBackend, ReadableCache,
    };

    struct Fixed {
        data_types: Vec<AgentDataType>,
        result: CacheResult,
    }

    impl Fixed {
        fn servers(data_type: AgentDataType, ids: &[&str]) -> Self {
            let mut result = CacheResult::new();
            for id in ids {
                result.upsert(
                    data_type.type_name.clone(),
                    CacheData::new(*id).unwrap().with_attribute("a", 1),
                );
            }
            Self {
                data_types: vec![data_type],
                result,
            }
        }
    }

    #[async_trait]
    impl CachingAgent for Fixed {
        fn agent_type(&self) -> &str {
            "fixed"
        }

        fn account_name(&self) -> &str {
            "prod"
        }

        fn provider_name(&self) -> &str {
            "test"
        }

        fn provided_data_types(&self) -> Vec<AgentDataType> {
            self.data_types.clone()
        }

        async fn load_data(&self) -> Result<CacheResult, AgentError> {
            Ok(self.result.clone())
        }
    }

    fn memory_cache() -> Arc<KeyValueCache<MemoryBackend>> {
        Arc::new(KeyValueCache::new(MemoryBackend::new(), CacheConfig::default()))
    }

    #[tokio::test]
    async fn applies_declared_types_and_skips_the_rest() {
        let cache = memory_cache();
        cache
            .merge("servers", &CacheData::new("old").unwrap().with_attribute("a", 1))
            .await
            .unwrap();

        let mut result = CacheResult::new();
        result
            .upsert("servers", CacheData::new("s1").unwrap().with_attribute("a", 1))
            .upsert("clusters", CacheData::new("c1").unwrap().with_attribute("a", 1))
            .evict("servers", "old")
            .evict("clusters", "c0");

        let agent = Fixed {
            data_types: vec![AgentDataType::authoritative("servers")],
            result,
        };
        let execution = AgentExecution::new(cache.clone());
        let report = execution.execute(&agent).await.unwrap();

        assert_eq!(report.merged, 1);
        assert_eq!(report.evicted, 1);
        assert_eq!(report.stale_evicted, 0);
        assert_eq!(report.skipped_types, vec!["clusters".to_string()]);
        assert_eq!(cache.get_identifiers("servers").await.unwrap(), vec!["s1"]);
        assert!(cache.get_identifiers("clusters").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rebuilt_agent_evicts_ids_its_predecessor_wrote() {
        let cache = memory_cache();
        let execution = AgentExecution::new(cache.clone());

        let first = Fixed::servers(AgentDataType::authoritative("servers"), &["s1", "s2"]);
        execution.execute(&first).await.unwrap();
        drop(first);

        let rebuilt = Fixed::servers(AgentDataType::authoritative("servers"), &["s1"]);
        let report = execution.execute(&rebuilt).await.unwrap();

        assert_eq!(report.stale_evicted, 1);
        assert_eq!(report.evicted, 1);
        assert_eq!(cache.get_identifiers("servers").await.unwrap(), vec!["s1"]);
        assert_eq!(
            execution.written_ids(&rebuilt.identity(), "servers"),
            vec!["s1"]
        );
    }

    #[tokio::test]
    async fn informative_types_are_only_evicted_on_request() {
        let cache = memory_cache();
        let execution = AgentExecution::new(cache.clone());

        execution
            .execute(&Fixed::servers(AgentDataType::informative("servers"), &["s1", "s2"]))
            .await
            .unwrap();
        let report = execution
            .execute(&Fixed::servers(AgentDataType::informative("servers"), &["s1"]))
            .await
            .unwrap();

        assert_eq!(report.stale_evicted, 0);
        assert_eq!(
            cache.get_identifiers("servers").await.unwrap(),
            vec!["s1", "s2"]
        );
    }

    #[tokio::test]
    async fn type_no_longer_declared_is_cleared() {
        let cache = memory_cache();
        let execution = AgentExecution::new(cache.clone());

        let mut both = Fixed::servers(AgentDataType::authoritative("servers"), &["s1"]);
        both.data_types.push(AgentDataType::authoritative("clusters"));
        both.result
            .upsert("clusters", CacheData::new("c1").unwrap().with_attribute("a", 1));
        execution.execute(&both).await.unwrap();

        let report = execution
            .execute(&Fixed::servers(AgentDataType::authoritative("servers"), &["s1"]))
            .await
            .unwrap();

        assert_eq!(report.stale_evicted, 1);
        assert!(cache.get_identifiers("clusters").await.unwrap().is_empty());
        assert_eq!(cache.get_identifiers("servers").await.unwrap(), vec!["s1"]);
    }

    /// Cache whose evictions fail while `failing` is set.
    struct EvictionOutage {
        inner: Arc<KeyValueCache<MemoryBackend>>,
        failing: AtomicBool,
    }

    #[async_trait]
    impl ReadableCache for EvictionOutage {
        async fn get_filtered(
            &self,
            type_name: &str,
            id: &str,
            filter: Option<&CacheFilter>,
        ) -> Result<Option<CacheData>, CacheError> {
            self.inner.get_filtered(type_name, id, filter).await
        }

        async fn get_all(&self, type_name: &str) -> Result<Vec<CacheData>, CacheError> {
            self.inner.get_all(type_name).await
        }

        async fn get_identifiers(&self, type_name: &str) -> Result<Vec<Identifier>, CacheError> {
            self.inner.get_identifiers(type_name).await
        }

        async fn filter_identifiers(
            &self,
            type_name: &str,
            glob: &str,
        ) -> Result<Vec<Identifier>, CacheError> {
            self.inner.filter_identifiers(type_name, glob).await
        }
    }

    #[async_trait]
    impl WriteableCache for EvictionOutage {
        async fn merge(&self, type_name: &str, data: &CacheData) -> Result<(), CacheError> {
            self.inner.merge(type_name, data).await
        }

        async fn evict(&self, type_name: &str, id: &str) -> Result<(), CacheError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(CacheError::Timeout {
                    op: "delete",
                    timeout: Duration::from_millis(1),
                });
            }
            self.inner.evict(type_name, id).await
        }
    }

    #[tokio::test]
    async fn failed_write_keeps_pending_evictions_for_the_next_poll() {
        let inner = memory_cache();
        let cache = Arc::new(EvictionOutage {
            inner: inner.clone(),
            failing: AtomicBool::new(false),
        });
        let execution = AgentExecution::new(cache.clone());

        execution
            .execute(&Fixed::servers(AgentDataType::authoritative("servers"), &["s1", "s2"]))
            .await
            .unwrap();

        let shrunk = Fixed::servers(AgentDataType::authoritative("servers"), &["s1"]);
        cache.failing.store(true, Ordering::SeqCst);
        let err = execution.execute(&shrunk).await.unwrap_err();
        assert!(matches!(err, AgentError::Cache(CacheError::Timeout { .. })));
        assert_eq!(
            execution.written_ids(&shrunk.identity(), "servers"),
            vec!["s1", "s2"]
        );

        cache.failing.store(false, Ordering::SeqCst);
        let report = execution.execute(&shrunk).await.unwrap();
        assert_eq!(report.stale_evicted, 1);
        assert_eq!(inner.get_identifiers("servers").await.unwrap(), vec!["s1"]);
    }
}
