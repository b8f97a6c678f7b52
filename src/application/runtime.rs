//! Serve runtime: one synchronizer per compiled-in provider version, an
//! in-process scheduler, and a reload loop that re-reads configuration on a
//! fixed cadence.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use cumulus_types::{AccountDescriptor, DEFAULT_PROVIDER_VERSION};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::agent::{
    AgentExecution, AgentScheduler, CachingAgent, IntervalScheduler, StaticInventoryFactory,
};
use crate::cache::{
    CacheConfig, CompositeCache, KeyValueCache, MemoryBackend, ReadableCache, WriteableCache,
};
use crate::config::{self, CliArgs, Settings};
use crate::infra::error::InfraError;
use crate::provider::{
    AgentDispatcher, CredentialsRepository, MemoryCredentialsRepository, Provider,
    ProviderSynchronizer, SyncReport,
};

use super::error::AppError;

pub const STATIC_PROVIDER: &str = "static";

/// Provider integrations built into the binary.
pub fn provider_catalog() -> Vec<(&'static str, AgentDispatcher)> {
    vec![(
        STATIC_PROVIDER,
        AgentDispatcher::new().with_factory(DEFAULT_PROVIDER_VERSION, Arc::new(StaticInventoryFactory)),
    )]
}

/// Account names configured under more than one `provider/version`, with
/// every label that uses them. Credentials are keyed by name alone, so such
/// accounts would overwrite each other.
pub fn shared_account_names(
    accounts: &[AccountDescriptor],
) -> BTreeMap<String, BTreeSet<String>> {
    let mut owners: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for account in accounts {
        owners
            .entry(account.name.trim().to_string())
            .or_default()
            .insert(format!(
                "{}/{}",
                account.provider.trim(),
                account.provider_version.trim()
            ));
    }
    owners.retain(|_, labels| labels.len() > 1);
    owners
}

pub struct Service {
    cache: Arc<KeyValueCache<MemoryBackend>>,
    reader: CompositeCache,
    scheduler: Arc<IntervalScheduler>,
    synchronizers: Vec<ProviderSynchronizer>,
}

impl Service {
    pub fn new(settings: &Settings) -> Self {
        let config = CacheConfig::from(&settings.cache);
        let cache = Arc::new(KeyValueCache::new(MemoryBackend::new(), config.clone()));
        let writer: Arc<dyn WriteableCache> = cache.clone();
        let reader: Arc<dyn ReadableCache> = cache.clone();

        let execution = Arc::new(AgentExecution::new(writer));
        let scheduler = Arc::new(IntervalScheduler::new(
            execution,
            settings.scheduler.default_poll_interval,
        ));

        let credentials: Arc<dyn CredentialsRepository> = Arc::new(MemoryCredentialsRepository::new());
        let mut synchronizers = Vec::new();
        for (name, dispatcher) in provider_catalog() {
            let versions: Vec<String> = dispatcher.versions().map(str::to_string).collect();
            for version in versions {
                synchronizers.push(ProviderSynchronizer::new(
                    Arc::new(Provider::new(name, version)),
                    Arc::clone(&credentials),
                    dispatcher.clone(),
                ));
            }
        }

        Self {
            cache,
            reader: CompositeCache::from_config(&config).with_source("local", reader),
            scheduler,
            synchronizers,
        }
    }

    pub fn cache(&self) -> &Arc<KeyValueCache<MemoryBackend>> {
        &self.cache
    }

    pub fn scheduler(&self) -> &Arc<IntervalScheduler> {
        &self.scheduler
    }

    /// Live agents across every provider.
    pub fn agents(&self) -> Vec<Arc<dyn CachingAgent>> {
        self.synchronizers
            .iter()
            .flat_map(|sync| sync.provider().agents().iter().cloned().collect::<Vec<_>>())
            .collect()
    }

    /// First boot: build every agent, then hand them all to the scheduler.
    pub async fn start(&self, accounts: &[AccountDescriptor]) -> Vec<SyncReport> {
        let reports = self.synchronize(accounts).await;
        let scheduler: Arc<dyn AgentScheduler> = self.scheduler.clone();
        for sync in &self.synchronizers {
            sync.provider().attach_scheduler(Arc::clone(&scheduler));
        }
        reports
    }

    pub async fn synchronize(&self, accounts: &[AccountDescriptor]) -> Vec<SyncReport> {
        self.warn_unclaimed(accounts);
        let mut reports = Vec::with_capacity(self.synchronizers.len());
        for sync in &self.synchronizers {
            reports.push(sync.synchronize(accounts).await);
        }
        reports
    }

    /// Identifier counts for every type some live agent provides.
    pub async fn inventory_summary(&self) -> BTreeMap<String, usize> {
        let mut summary = BTreeMap::new();
        for agent in self.agents() {
            for data_type in agent.provided_data_types() {
                if summary.contains_key(&data_type.type_name) {
                    continue;
                }
                match self.reader.get_identifiers(&data_type.type_name).await {
                    Ok(ids) => {
                        summary.insert(data_type.type_name, ids.len());
                    }
                    Err(err) => {
                        warn!(type_name = %data_type.type_name, error = %err, "inventory summary read failed");
                    }
                }
            }
        }
        summary
    }

    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    fn warn_unclaimed(&self, accounts: &[AccountDescriptor]) {
        for account in accounts {
            let claimed = self.synchronizers.iter().any(|sync| {
                sync.provider().name() == account.provider.trim()
                    && sync.provider().version() == account.provider_version.trim()
            });
            if !claimed {
                warn!(
                    account = %account.name,
                    provider = %account.provider,
                    version = %account.provider_version,
                    "no provider integration for account; ignoring"
                );
            }
        }
        for (name, labels) in shared_account_names(accounts) {
            warn!(
                account = %name,
                providers = ?labels,
                "account name configured under several providers; their records will conflict"
            );
        }
    }

    async fn reload(&self, cli: &CliArgs) {
        match config::load(cli) {
            Ok(settings) => {
                let reports = self.synchronize(&settings.accounts).await;
                log_reports(&reports);
                debug!(inventory = ?self.inventory_summary().await, "inventory after reload");
            }
            Err(err) => {
                warn!(error = %err, "configuration reload failed; keeping current accounts");
            }
        }
    }
}

fn log_reports(reports: &[SyncReport]) {
    for report in reports.iter().filter(|report| !report.is_noop() || !report.failed.is_empty()) {
        info!(
            pass_id = %report.pass_id,
            added = report.added.len(),
            changed = report.changed.len(),
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            agents_scheduled = report.agents_scheduled,
            agents_unscheduled = report.agents_unscheduled,
            "synchronization pass applied"
        );
    }
}

/// Run until interrupted, re-synchronizing every `sync_cadence`.
pub async fn serve(cli: &CliArgs, settings: Settings) -> Result<(), AppError> {
    let service = Service::new(&settings);
    let reports = service.start(&settings.accounts).await;
    log_reports(&reports);
    info!(
        agents = service.agents().len(),
        cadence = ?settings.scheduler.sync_cadence,
        prefix = %service.cache().keys().prefix(),
        "cumulus started"
    );

    let mut ticker = tokio::time::interval(settings.scheduler.sync_cadence);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let result = loop {
        tokio::select! {
            _ = ticker.tick() => service.reload(cli).await,
            signal = &mut shutdown => {
                break match signal {
                    Ok(()) => {
                        info!("Shutdown signal received");
                        Ok(())
                    }
                    Err(err) => Err(AppError::from(InfraError::from(err))),
                };
            }
        }
    };

    service.shutdown();
    result
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;
    use std::time::Duration;

    use serde_json::json;
    use tracing::level_filters::LevelFilter;

    use super::*;
    use crate::config::{CacheSettings, LogFormat, LoggingSettings, SchedulerSettings};

    fn settings() -> Settings {
        Settings {
            logging: LoggingSettings {
                level: LevelFilter::INFO,
                format: LogFormat::Compact,
            },
            cache: CacheSettings {
                prefix: "test".to_string(),
                io_timeout: Duration::from_secs(1),
                fan_out_timeout: Duration::from_secs(1),
                read_concurrency: NonZeroUsize::MIN,
            },
            scheduler: SchedulerSettings {
                sync_cadence: Duration::from_secs(60),
                default_poll_interval: Duration::from_secs(5),
            },
            accounts: Vec::new(),
        }
    }

    fn static_account(name: &str, servers: &[&str]) -> AccountDescriptor {
        let inventory: Vec<_> = servers
            .iter()
            .map(|id| json!({ "type": "servers", "id": id, "attributes": { "status": "UP" } }))
            .collect();
        AccountDescriptor::new(name, STATIC_PROVIDER).with_property("inventory", json!(inventory))
    }

    #[test]
    fn shared_names_are_reported_across_providers() {
        let accounts = vec![
            AccountDescriptor::new("prod", "static"),
            AccountDescriptor::new("prod", "static").with_provider_version("v2"),
            AccountDescriptor::new("prod", "aws"),
            AccountDescriptor::new("test", "static"),
            AccountDescriptor::new("test", "static"),
        ];

        let shared = shared_account_names(&accounts);
        assert_eq!(shared.len(), 1);
        let labels: Vec<_> = shared["prod"].iter().map(String::as_str).collect();
        assert_eq!(labels, vec!["aws/v1", "static/v1", "static/v2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn started_agents_populate_the_cache() {
        let service = Service::new(&settings());
        let reports = service
            .start(&[static_account("prod", &["s1", "s2"]), AccountDescriptor::new("x", "unknown")])
            .await;

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].added, vec!["prod"]);
        assert_eq!(service.scheduler().scheduled().len(), 1);

        tokio::time::sleep(Duration::from_millis(10)).await;
        let summary = service.inventory_summary().await;
        assert_eq!(summary.get("servers"), Some(&2));
        service.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn resynchronizing_reschedules_changed_accounts() {
        let service = Service::new(&settings());
        service
            .start(&[static_account("prod", &["s1"]), static_account("test", &["t1"])])
            .await;
        let before = service.agents();

        let reports = service
            .synchronize(&[static_account("prod", &["s1", "s3"]), static_account("test", &["t1"])])
            .await;
        assert_eq!(reports[0].changed, vec!["prod"]);
        assert_eq!(reports[0].agents_scheduled, 1);
        assert_eq!(reports[0].agents_unscheduled, 1);

        let after = service.agents();
        let unchanged = |agents: &[Arc<dyn CachingAgent>]| {
            agents
                .iter()
                .find(|agent| agent.account_name() == "test")
                .cloned()
                .expect("test agent")
        };
        assert!(Arc::ptr_eq(&unchanged(&before), &unchanged(&after)));
        assert_eq!(service.scheduler().scheduled().len(), 2);
        service.shutdown();
    }
}
