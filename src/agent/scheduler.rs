//! In-process agent scheduling.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use metrics::{counter, histogram};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{AgentExecution, AgentIdentity, CachingAgent};

const METRIC_POLL_TOTAL: &str = "cumulus_agent_poll_total";
const METRIC_POLL_MS: &str = "cumulus_agent_poll_ms";

/// Boundary to whatever invokes agents.
pub trait AgentScheduler: Send + Sync {
    fn schedule(&self, agent: Arc<dyn CachingAgent>);

    fn unschedule(&self, identity: &AgentIdentity);
}

/// Runs each agent on its own tokio task at the agent's preferred interval.
///
/// A failed poll is logged and counted; the next tick tries again.
pub struct IntervalScheduler {
    execution: Arc<AgentExecution>,
    default_interval: Duration,
    tasks: DashMap<AgentIdentity, JoinHandle<()>>,
}

impl IntervalScheduler {
    pub fn new(execution: Arc<AgentExecution>, default_interval: Duration) -> Self {
        Self {
            execution,
            default_interval,
            tasks: DashMap::new(),
        }
    }

    pub fn scheduled(&self) -> Vec<AgentIdentity> {
        let mut identities: Vec<_> = self.tasks.iter().map(|entry| entry.key().clone()).collect();
        identities.sort();
        identities
    }

    pub fn is_scheduled(&self, identity: &AgentIdentity) -> bool {
        self.tasks.contains_key(identity)
    }

    /// Abort every running agent task.
    pub fn shutdown(&self) {
        let identities: Vec<_> = self.tasks.iter().map(|entry| entry.key().clone()).collect();
        for identity in identities {
            self.unschedule(&identity);
        }
    }
}

impl AgentScheduler for IntervalScheduler {
    fn schedule(&self, agent: Arc<dyn CachingAgent>) {
        let identity = agent.identity();
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(err) => {
                warn!(agent = %identity, error = %err, "no async runtime; agent not scheduled");
                return;
            }
        };

        let period = agent
            .poll_interval()
            .filter(|period| !period.is_zero())
            .unwrap_or(self.default_interval);
        let execution = Arc::clone(&self.execution);
        let task_identity = identity.clone();

        let task = handle.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let started_at = Instant::now();
                let outcome = match execution.execute(agent.as_ref()).await {
                    Ok(report) => {
                        debug!(
                            agent = %task_identity,
                            merged = report.merged,
                            evicted = report.evicted,
                            "agent poll completed"
                        );
                        "success"
                    }
                    Err(err) => {
                        warn!(agent = %task_identity, error = %err, "agent poll failed");
                        "failure"
                    }
                };
                counter!(
                    METRIC_POLL_TOTAL,
                    "agent_type" => task_identity.agent_type.clone(),
                    "outcome" => outcome
                )
                .increment(1);
                histogram!(METRIC_POLL_MS, "agent_type" => task_identity.agent_type.clone())
                    .record(started_at.elapsed().as_secs_f64() * 1000.0);
            }
        });

        if let Some(previous) = self.tasks.insert(identity.clone(), task) {
            previous.abort();
        }
        info!(agent = %identity, ?period, "agent scheduled");
    }

    fn unschedule(&self, identity: &AgentIdentity) {
        if let Some((_, task)) = self.tasks.remove(identity) {
            task.abort();
            info!(agent = %identity, "agent unscheduled");
        }
    }
}

impl Drop for IntervalScheduler {
    fn drop(&mut self) {
        for entry in self.tasks.iter() {
            entry.value().abort();
        }
    }
}
