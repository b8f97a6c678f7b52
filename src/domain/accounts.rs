//! Account credentials derived from configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use cumulus_types::{AccountDescriptor, AttributeValue};

use super::error::DomainError;

/// Credentials record for one configured account.
///
/// Equality covers every field agents may close over, so any difference
/// between two records built for the same name means the account's agents
/// must be rebuilt.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountCredentials {
    pub name: String,
    pub provider: String,
    pub provider_version: String,
    pub environment: Option<String>,
    pub account_type: Option<String>,
    /// Sorted and de-duplicated.
    pub regions: Vec<String>,
    /// Sorted and de-duplicated.
    pub namespaces: Vec<String>,
    pub poll_interval: Option<Duration>,
    pub properties: BTreeMap<String, AttributeValue>,
}

impl AccountCredentials {
    pub fn from_descriptor(descriptor: &AccountDescriptor) -> Result<Self, DomainError> {
        descriptor.validate()?;

        Ok(Self {
            name: descriptor.name.trim().to_string(),
            provider: descriptor.provider.trim().to_string(),
            provider_version: descriptor.provider_version.trim().to_string(),
            environment: descriptor.environment.clone(),
            account_type: descriptor.account_type.clone(),
            regions: normalized("regions", &descriptor.regions)?,
            namespaces: normalized("namespaces", &descriptor.namespaces)?,
            poll_interval: descriptor.poll_interval_seconds.map(Duration::from_secs),
            properties: descriptor.properties.clone(),
        })
    }

    /// Environment, falling back to the account name.
    pub fn environment_or_name(&self) -> &str {
        self.environment.as_deref().unwrap_or(&self.name)
    }
}

fn normalized(field: &str, values: &[String]) -> Result<Vec<String>, DomainError> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        let value = value.trim();
        if value.is_empty() {
            return Err(DomainError::validation(format!(
                "`{field}` must not contain blank entries"
            )));
        }
        out.push(value.to_string());
    }
    out.sort();
    out.dedup();
    Ok(out)
}
