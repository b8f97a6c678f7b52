use std::collections::BTreeMap;
use std::sync::Arc;

use crate::agent::{AgentError, CachingAgent};
use crate::domain::accounts::AccountCredentials;

/// Builds the agents for one account at one provider version.
pub trait AgentFactory: Send + Sync {
    fn build_agents(
        &self,
        credentials: &Arc<AccountCredentials>,
    ) -> Result<Vec<Arc<dyn CachingAgent>>, AgentError>;
}

/// Routes agent construction to the factory registered for an account's
/// provider version.
#[derive(Default, Clone)]
pub struct AgentDispatcher {
    factories: BTreeMap<String, Arc<dyn AgentFactory>>,
}

impl AgentDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_factory(mut self, version: impl Into<String>, factory: Arc<dyn AgentFactory>) -> Self {
        self.factories.insert(version.into(), factory);
        self
    }

    pub fn versions(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn build_agents(
        &self,
        credentials: &Arc<AccountCredentials>,
    ) -> Result<Vec<Arc<dyn CachingAgent>>, AgentError> {
        let factory = self
            .factories
            .get(&credentials.provider_version)
            .ok_or_else(|| AgentError::UnsupportedVersion {
                version: credentials.provider_version.clone(),
            })?;
        factory.build_agents(credentials)
    }
}

#[cfg(test)]
mod tests {
    use cumulus_types::AccountDescriptor;

    use super::*;
    use crate::agent::StaticInventoryFactory;

    #[test]
    fn dispatches_by_provider_version() {
        let dispatcher = AgentDispatcher::new().with_factory("v1", Arc::new(StaticInventoryFactory));

        let v1 = Arc::new(
            AccountCredentials::from_descriptor(&AccountDescriptor::new("prod", "static")).unwrap(),
        );
        assert_eq!(dispatcher.build_agents(&v1).unwrap().len(), 1);

        let v2 = Arc::new(
            AccountCredentials::from_descriptor(
                &AccountDescriptor::new("prod", "static").with_provider_version("v2"),
            )
            .unwrap(),
        );
        assert!(matches!(
            dispatcher.build_agents(&v2),
            Err(AgentError::UnsupportedVersion { version }) if version == "v2"
        ));
        assert_eq!(dispatcher.versions().collect::<Vec<_>>(), vec!["v1"]);
    }
}
