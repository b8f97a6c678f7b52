//! Agent publishing inventory declared in account configuration.
//!
//! Inventory comes either inline from `properties.inventory` or from a JSON
//! file named by `properties.inventory_path`, which is re-read on every poll.
//! Entries have the shape:
//!
//! ```json
//! { "type": "servers", "id": "s1",
//!   "attributes": { "status": "UP" },
//!   "relationships": { "cluster": ["c1"] } }
//! ```
//!
//! Every published type is authoritative, so ids dropped from the inventory
//! are evicted by [`AgentExecution`](super::AgentExecution) on the next poll,
//! including across agent rebuilds.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cumulus_types::{AttributeValue, CacheData, CacheResult, Identifier};
use serde::Deserialize;
use tracing::debug;

use super::{AgentDataType, AgentError, CachingAgent};
use crate::domain::accounts::AccountCredentials;
use crate::provider::AgentFactory;

pub const STATIC_INVENTORY_AGENT_TYPE: &str = "StaticInventoryAgent";

const INVENTORY_KEY: &str = "inventory";
const INVENTORY_PATH_KEY: &str = "inventory_path";
const TYPES_KEY: &str = "types";

#[derive(Debug, Deserialize)]
struct InventoryEntry {
    #[serde(rename = "type")]
    type_name: String,
    id: Identifier,
    #[serde(default)]
    attributes: BTreeMap<String, AttributeValue>,
    #[serde(default)]
    relationships: BTreeMap<String, BTreeSet<Identifier>>,
}

#[derive(Debug, Clone)]
enum InventorySource {
    Inline(Vec<(String, CacheData)>),
    File(PathBuf),
}

fn parse_entries(value: AttributeValue) -> Result<Vec<(String, CacheData)>, String> {
    let entries: Vec<InventoryEntry> =
        serde_json::from_value(value).map_err(|err| format!("malformed inventory: {err}"))?;

    entries
        .into_iter()
        .map(|entry| {
            CacheData::from_parts(entry.id, entry.attributes, entry.relationships)
                .map(|data| (entry.type_name, data))
                .map_err(|err| format!("invalid inventory entry: {err}"))
        })
        .collect()
}

pub struct StaticInventoryAgent {
    credentials: Arc<AccountCredentials>,
    source: InventorySource,
    data_types: Vec<AgentDataType>,
}

impl StaticInventoryAgent {
    pub fn new(credentials: Arc<AccountCredentials>) -> Result<Self, AgentError> {
        let build_error = |reason: String| AgentError::build(&credentials.name, reason);
        let properties = &credentials.properties;

        let declared_types = match properties.get(TYPES_KEY) {
            Some(value) => Some(
                serde_json::from_value::<Vec<String>>(value.clone())
                    .map_err(|err| build_error(format!("`types` must be a list of strings: {err}")))?,
            ),
            None => None,
        };

        let source = match (properties.get(INVENTORY_KEY), properties.get(INVENTORY_PATH_KEY)) {
            (Some(_), Some(_)) => {
                return Err(build_error(
                    "`inventory` and `inventory_path` are mutually exclusive".to_string(),
                ));
            }
            (_, Some(path)) => {
                let path = path
                    .as_str()
                    .ok_or_else(|| build_error("`inventory_path` must be a string".to_string()))?;
                InventorySource::File(PathBuf::from(path))
            }
            (Some(inline), None) => InventorySource::Inline(parse_entries(inline.clone()).map_err(build_error)?),
            (None, None) => InventorySource::Inline(Vec::new()),
        };

        let type_names: BTreeSet<String> = match (&declared_types, &source) {
            (Some(types), _) => types.iter().cloned().collect(),
            (None, InventorySource::Inline(entries)) => {
                entries.iter().map(|(type_name, _)| type_name.clone()).collect()
            }
            (None, InventorySource::File(_)) => {
                return Err(build_error(
                    "`inventory_path` requires an explicit `types` list".to_string(),
                ));
            }
        };

        Ok(Self {
            data_types: type_names.into_iter().map(AgentDataType::authoritative).collect(),
            credentials,
            source,
        })
    }

    pub fn credentials(&self) -> &Arc<AccountCredentials> {
        &self.credentials
    }

    async fn current_entries(&self) -> Result<Vec<(String, CacheData)>, AgentError> {
        match &self.source {
            InventorySource::Inline(entries) => Ok(entries.clone()),
            InventorySource::File(path) => {
                let raw = tokio::fs::read(path).await.map_err(|err| {
                    AgentError::poll(
                        self.identity(),
                        format!("failed to read {}: {err}", path.display()),
                    )
                })?;
                let value: AttributeValue = serde_json::from_slice(&raw).map_err(|err| {
                    AgentError::poll(
                        self.identity(),
                        format!("failed to parse {}: {err}", path.display()),
                    )
                })?;
                parse_entries(value).map_err(|reason| AgentError::poll(self.identity(), reason))
            }
        }
    }
}

#[async_trait]
impl CachingAgent for StaticInventoryAgent {
    fn agent_type(&self) -> &str {
        STATIC_INVENTORY_AGENT_TYPE
    }

    fn account_name(&self) -> &str {
        &self.credentials.name
    }

    fn provider_name(&self) -> &str {
        &self.credentials.provider
    }

    fn poll_interval(&self) -> Option<Duration> {
        self.credentials.poll_interval
    }

    fn provided_data_types(&self) -> Vec<AgentDataType> {
        self.data_types.clone()
    }

    async fn load_data(&self) -> Result<CacheResult, AgentError> {
        let entries = self.current_entries().await?;

        let mut result = CacheResult::new();
        for (type_name, data) in entries {
            result.upsert(type_name, data);
        }

        debug!(
            agent = %self.identity(),
            environment = self.credentials.environment_or_name(),
            upserts = result.upsert_count(),
            "static inventory loaded"
        );
        Ok(result)
    }
}

/// Builds one [`StaticInventoryAgent`] per account.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticInventoryFactory;

impl AgentFactory for StaticInventoryFactory {
    fn build_agents(
        &self,
        credentials: &Arc<AccountCredentials>,
    ) -> Result<Vec<Arc<dyn CachingAgent>>, AgentError> {
        let agent = StaticInventoryAgent::new(Arc::clone(credentials))?;
        Ok(vec![Arc::new(agent)])
    }
}
