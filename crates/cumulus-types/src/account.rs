use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ModelError;

pub const DEFAULT_PROVIDER_VERSION: &str = "v1";

fn default_provider_version() -> String {
    DEFAULT_PROVIDER_VERSION.to_string()
}

/// One configured cloud account as it appears in configuration.
///
/// Descriptors are converted into credentials records during
/// synchronization; the descriptor itself carries no behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountDescriptor {
    pub name: String,
    pub provider: String,
    #[serde(default = "default_provider_version")]
    pub provider_version: String,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub account_type: Option<String>,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub namespaces: Vec<String>,
    #[serde(default)]
    pub poll_interval_seconds: Option<u64>,
    /// Provider-specific settings, passed through to agent factories.
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl AccountDescriptor {
    pub fn new(name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            provider_version: default_provider_version(),
            environment: None,
            account_type: None,
            regions: Vec::new(),
            namespaces: Vec::new(),
            poll_interval_seconds: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_provider_version(mut self, version: impl Into<String>) -> Self {
        self.provider_version = version.into();
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.name.trim().is_empty() {
            return Err(ModelError::BlankAccountField { field: "name" });
        }
        if self.provider.trim().is_empty() {
            return Err(ModelError::BlankAccountField { field: "provider" });
        }
        if self.provider_version.trim().is_empty() {
            return Err(ModelError::BlankAccountField {
                field: "provider_version",
            });
        }
        if self.poll_interval_seconds == Some(0) {
            return Err(ModelError::InvalidPollInterval {
                account: self.name.clone(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn provider_version_defaults_when_missing() {
        let descriptor: AccountDescriptor =
            serde_json::from_value(json!({ "name": "prod", "provider": "static" })).unwrap();
        assert_eq!(descriptor.provider_version, DEFAULT_PROVIDER_VERSION);
        assert!(descriptor.validate().is_ok());
    }

    #[test]
    fn blank_name_fails_validation() {
        let descriptor = AccountDescriptor::new("  ", "static");
        assert_eq!(
            descriptor.validate(),
            Err(ModelError::BlankAccountField { field: "name" })
        );
    }

    #[test]
    fn zero_poll_interval_fails_validation() {
        let mut descriptor = AccountDescriptor::new("prod", "static");
        descriptor.poll_interval_seconds = Some(0);
        assert!(matches!(
            descriptor.validate(),
            Err(ModelError::InvalidPollInterval { .. })
        ));
    }
}
