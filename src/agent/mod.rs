//! Caching agents.
//!
//! An agent is a unit of scheduled work bound to one account. Each poll
//! returns a [`CacheResult`] delta; [`AgentExecution`] writes it through the
//! cache. When and how often an agent runs is decided by an
//! [`AgentScheduler`].

mod execution;
mod scheduler;
mod static_inventory;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use cumulus_types::CacheResult;
use thiserror::Error;

use crate::cache::CacheError;

pub use execution::{AgentExecution, ExecutionReport};
pub use scheduler::{AgentScheduler, IntervalScheduler};
pub use static_inventory::{STATIC_INVENTORY_AGENT_TYPE, StaticInventoryAgent, StaticInventoryFactory};

/// Whether an agent owns a type outright or only contributes to it.
///
/// Ids of an authoritative type that an agent stops reporting are evicted by
/// [`AgentExecution`]. Informative types are only evicted when the agent asks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Authority {
    Authoritative,
    Informative,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AgentDataType {
    pub type_name: String,
    pub authority: Authority,
}

impl AgentDataType {
    pub fn authoritative(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            authority: Authority::Authoritative,
        }
    }

    pub fn informative(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            authority: Authority::Informative,
        }
    }
}

/// Stable identity of an agent across rebuilds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentIdentity {
    pub account_name: String,
    pub agent_type: String,
}

impl AgentIdentity {
    pub fn new(account_name: impl Into<String>, agent_type: impl Into<String>) -> Self {
        Self {
            account_name: account_name.into(),
            agent_type: agent_type.into(),
        }
    }
}

impl fmt::Display for AgentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account_name, self.agent_type)
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("failed to build agents for account `{account}`: {reason}")]
    Build { account: String, reason: String },
    #[error("agent `{agent}` failed to load data: {reason}")]
    Poll { agent: AgentIdentity, reason: String },
    #[error("no agent factory registered for provider version `{version}`")]
    UnsupportedVersion { version: String },
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl AgentError {
    pub fn build(account: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Build {
            account: account.into(),
            reason: reason.into(),
        }
    }

    pub fn poll(agent: AgentIdentity, reason: impl Into<String>) -> Self {
        Self::Poll {
            agent,
            reason: reason.into(),
        }
    }
}

/// Contract between an agent and whatever drives it.
///
/// Agents hold no scheduling state of their own; the host decides cadence,
/// retry and isolation.
#[async_trait]
pub trait CachingAgent: Send + Sync {
    fn agent_type(&self) -> &str;

    fn account_name(&self) -> &str;

    fn provider_name(&self) -> &str;

    /// Preferred cadence. `None` defers to the scheduler's default.
    fn poll_interval(&self) -> Option<Duration> {
        None
    }

    fn provided_data_types(&self) -> Vec<AgentDataType>;

    fn identity(&self) -> AgentIdentity {
        AgentIdentity::new(self.account_name(), self.agent_type())
    }

    async fn load_data(&self) -> Result<CacheResult, AgentError>;
}
