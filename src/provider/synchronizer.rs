//! Reconciles configured accounts with registered credentials and the
//! provider's live agents.
//!
//! A pass classifies every account of this provider version as added,
//! changed, unchanged or deleted. Only added and changed accounts get new
//! agents; agents of unchanged accounts are carried over by reference so any
//! warm state they hold survives. Nothing happens at all when no account was
//! added, changed or deleted.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use cumulus_types::AccountDescriptor;
use metrics::{counter, histogram};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{AgentDispatcher, CredentialsRepository, Provider};
use crate::agent::CachingAgent;
use crate::domain::accounts::AccountCredentials;

const METRIC_ACCOUNTS: &str = "cumulus_sync_accounts_total";
const METRIC_BUILD_FAILURES: &str = "cumulus_sync_agent_build_failures_total";
const METRIC_PASS_MS: &str = "cumulus_sync_pass_ms";

/// Outcome of one synchronization pass.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub pass_id: Uuid,
    pub started_at: OffsetDateTime,
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub unchanged: Vec<String>,
    pub deleted: Vec<String>,
    /// Accounts whose configuration was invalid or whose agents failed to
    /// build. Their previous state is kept.
    pub failed: Vec<String>,
    pub agents_built: usize,
    pub agents_retired: usize,
    pub agents_scheduled: usize,
    pub agents_unscheduled: usize,
}

impl SyncReport {
    fn start() -> Self {
        Self {
            pass_id: Uuid::new_v4(),
            started_at: OffsetDateTime::now_utc(),
            added: Vec::new(),
            changed: Vec::new(),
            unchanged: Vec::new(),
            deleted: Vec::new(),
            failed: Vec::new(),
            agents_built: 0,
            agents_retired: 0,
            agents_scheduled: 0,
            agents_unscheduled: 0,
        }
    }

    /// True when the pass left agents untouched.
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.deleted.is_empty()
    }
}

pub struct ProviderSynchronizer {
    provider: Arc<Provider>,
    credentials: Arc<dyn CredentialsRepository>,
    dispatcher: AgentDispatcher,
    pass: Mutex<()>,
}

impl ProviderSynchronizer {
    pub fn new(
        provider: Arc<Provider>,
        credentials: Arc<dyn CredentialsRepository>,
        dispatcher: AgentDispatcher,
    ) -> Self {
        Self {
            provider,
            credentials,
            dispatcher,
            pass: Mutex::new(()),
        }
    }

    pub fn provider(&self) -> &Arc<Provider> {
        &self.provider
    }

    fn owns(&self, credentials: &AccountCredentials) -> bool {
        credentials.provider == self.provider.name()
            && credentials.provider_version == self.provider.version()
    }

    /// Run one pass over `accounts`. Passes for the same synchronizer never
    /// overlap; a second caller waits for the first to finish.
    #[instrument(
        skip_all,
        fields(provider = %self.provider.name(), version = %self.provider.version())
    )]
    pub async fn synchronize(&self, accounts: &[AccountDescriptor]) -> SyncReport {
        let _pass = self.pass.lock().await;
        let started_at = Instant::now();
        let mut report = SyncReport::start();

        let (desired, invalid) = self.desired_accounts(accounts, &mut report);

        let existing: BTreeMap<String, Arc<AccountCredentials>> = self
            .credentials
            .get_all()
            .into_iter()
            .filter(|record| self.owns(record))
            .map(|record| (record.name.clone(), record))
            .collect();

        let deleted: Vec<String> = existing
            .keys()
            .filter(|name| !desired.contains_key(*name) && !invalid.contains(*name))
            .cloned()
            .collect();

        let mut previous: BTreeMap<String, Arc<AccountCredentials>> = BTreeMap::new();
        for (name, record) in &desired {
            match existing.get(name) {
                None => report.added.push(name.clone()),
                Some(old) if old.as_ref() != record.as_ref() => {
                    report.changed.push(name.clone());
                    previous.insert(name.clone(), Arc::clone(old));
                }
                Some(_) => report.unchanged.push(name.clone()),
            }
            self.credentials.save(Arc::clone(record));
        }
        report.deleted = deleted;

        self.record_classification(&report);

        if report.is_noop() {
            debug!(
                pass_id = %report.pass_id,
                unchanged = report.unchanged.len(),
                "account configuration unchanged"
            );
            histogram!(METRIC_PASS_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
            return report;
        }

        let to_build: Vec<String> = report
            .added
            .iter()
            .chain(&report.changed)
            .cloned()
            .collect();
        let mut rebuilt: BTreeMap<String, Vec<Arc<dyn CachingAgent>>> = BTreeMap::new();
        for name in &to_build {
            let Some(record) = desired.get(name) else {
                continue;
            };
            match self.dispatcher.build_agents(record) {
                Ok(agents) => {
                    report.agents_built += agents.len();
                    rebuilt.insert(name.clone(), agents);
                }
                Err(err) => {
                    warn!(account = %name, error = %err, "failed to build caching agents");
                    counter!(METRIC_BUILD_FAILURES, "provider" => self.provider.name().to_string())
                        .increment(1);
                    report.failed.push(name.clone());
                    // Roll the record back so the next pass classifies the
                    // account the same way and retries the build.
                    match previous.get(name) {
                        Some(old) => self.credentials.save(Arc::clone(old)),
                        None => self.credentials.delete(name),
                    }
                }
            }
        }

        let retired: BTreeSet<String> = report
            .deleted
            .iter()
            .chain(rebuilt.keys())
            .cloned()
            .collect();

        let scheduler = self.provider.scheduler();
        let current = self.provider.agents();
        let mut next: Vec<Arc<dyn CachingAgent>> = Vec::with_capacity(current.len());
        for agent in current.iter() {
            if retired.contains(agent.account_name()) {
                report.agents_retired += 1;
                if let Some(scheduler) = &scheduler {
                    scheduler.unschedule(&agent.identity());
                    report.agents_unscheduled += 1;
                }
            } else {
                next.push(Arc::clone(agent));
            }
        }

        for name in &report.deleted {
            // Another provider version may have claimed the name in the
            // meantime; leave its record alone.
            if self
                .credentials
                .get_one(name)
                .is_some_and(|record| self.owns(&record))
            {
                self.credentials.delete(name);
            }
        }

        for agents in rebuilt.into_values() {
            for agent in agents {
                if let Some(scheduler) = &scheduler {
                    scheduler.schedule(Arc::clone(&agent));
                    report.agents_scheduled += 1;
                }
                next.push(agent);
            }
        }

        self.provider.replace_agents(next);

        histogram!(METRIC_PASS_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        info!(
            pass_id = %report.pass_id,
            added = ?report.added,
            changed = ?report.changed,
            deleted = ?report.deleted,
            failed = ?report.failed,
            agents = self.provider.agents().len(),
            "provider synchronized"
        );
        report
    }

    /// Descriptors for this provider version, converted to credentials.
    /// Returns the valid records by name and the names that failed
    /// validation.
    fn desired_accounts(
        &self,
        accounts: &[AccountDescriptor],
        report: &mut SyncReport,
    ) -> (BTreeMap<String, Arc<AccountCredentials>>, BTreeSet<String>) {
        let mut desired = BTreeMap::new();
        let mut invalid = BTreeSet::new();

        for descriptor in accounts {
            if descriptor.provider.trim() != self.provider.name()
                || descriptor.provider_version.trim() != self.provider.version()
            {
                continue;
            }
            let name = descriptor.name.trim().to_string();
            if desired.contains_key(&name) || invalid.contains(&name) {
                warn!(account = %name, "duplicate account name; keeping the first entry");
                continue;
            }
            match AccountCredentials::from_descriptor(descriptor) {
                Ok(record) => {
                    desired.insert(name, Arc::new(record));
                }
                Err(err) => {
                    warn!(account = %name, error = %err, "invalid account configuration");
                    report.failed.push(name.clone());
                    invalid.insert(name);
                }
            }
        }

        (desired, invalid)
    }

    fn record_classification(&self, report: &SyncReport) {
        let provider = self.provider.name().to_string();
        for (classification, count) in [
            ("added", report.added.len()),
            ("changed", report.changed.len()),
            ("unchanged", report.unchanged.len()),
            ("deleted", report.deleted.len()),
        ] {
            counter!(
                METRIC_ACCOUNTS,
                "provider" => provider.clone(),
                "classification" => classification
            )
            .increment(count as u64);
        }
    }
}
