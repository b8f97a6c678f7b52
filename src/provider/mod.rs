//! Providers own the live agent collection for one cloud integration and
//! keep it in step with account configuration.

mod credentials;
mod dispatcher;
mod synchronizer;

use std::sync::{Arc, RwLock};

use tracing::info;

use crate::agent::{AgentScheduler, CachingAgent};
use crate::util::lock::{rw_read, rw_write};

pub use credentials::{CredentialsRepository, MemoryCredentialsRepository};
pub use dispatcher::{AgentDispatcher, AgentFactory};
pub use synchronizer::{ProviderSynchronizer, SyncReport};

pub type AgentSet = Arc<Vec<Arc<dyn CachingAgent>>>;

/// One provider integration at one provider version.
///
/// The agent collection is an immutable snapshot swapped whole by the
/// synchronizer. Readers keep whatever snapshot they took.
pub struct Provider {
    name: String,
    version: String,
    agents: RwLock<AgentSet>,
    scheduler: RwLock<Option<Arc<dyn AgentScheduler>>>,
}

impl Provider {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            agents: RwLock::new(Arc::new(Vec::new())),
            scheduler: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Stable snapshot of the live agents.
    pub fn agents(&self) -> AgentSet {
        Arc::clone(&rw_read(&self.agents, "provider", "agents"))
    }

    pub(crate) fn replace_agents(&self, agents: Vec<Arc<dyn CachingAgent>>) {
        *rw_write(&self.agents, "provider", "replace_agents") = Arc::new(agents);
    }

    pub fn scheduler(&self) -> Option<Arc<dyn AgentScheduler>> {
        rw_read(&self.scheduler, "provider", "scheduler").clone()
    }

    /// Hand every current agent to `scheduler` and keep it for later passes.
    ///
    /// Until a scheduler is attached, synchronization only builds agents.
    pub fn attach_scheduler(&self, scheduler: Arc<dyn AgentScheduler>) {
        let agents = self.agents();
        for agent in agents.iter() {
            scheduler.schedule(Arc::clone(agent));
        }
        *rw_write(&self.scheduler, "provider", "attach_scheduler") = Some(scheduler);
        info!(
            provider = %self.name,
            version = %self.version,
            agents = agents.len(),
            "scheduler attached"
        );
    }
}
