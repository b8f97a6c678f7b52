//! `cumulus check`: validate configured accounts without starting any agents.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use cumulus_types::AccountDescriptor;
use serde::Serialize;

use crate::config::{CheckArgs, Settings};
use crate::domain::accounts::AccountCredentials;
use crate::infra::error::InfraError;

use super::error::AppError;
use super::runtime::{provider_catalog, shared_account_names};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderSummary {
    pub provider: String,
    pub version: String,
    pub supported: bool,
    pub accounts: Vec<String>,
    pub invalid: Vec<InvalidAccount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidAccount {
    pub name: String,
    pub reason: String,
}

impl ProviderSummary {
    fn is_healthy(&self) -> bool {
        self.invalid.is_empty() && (self.supported || self.accounts.is_empty())
    }
}

/// Group accounts by provider and version, flagging anything the serve loop
/// would skip.
pub fn summarize(accounts: &[AccountDescriptor]) -> Vec<ProviderSummary> {
    let supported: BTreeSet<(String, String)> = provider_catalog()
        .into_iter()
        .flat_map(|(name, dispatcher)| {
            dispatcher
                .versions()
                .map(|version| (name.to_string(), version.to_string()))
                .collect::<Vec<_>>()
        })
        .collect();

    let shared = shared_account_names(accounts);
    let mut groups: BTreeMap<(String, String), ProviderSummary> = BTreeMap::new();
    let mut seen: BTreeSet<(String, String, String)> = BTreeSet::new();

    for account in accounts {
        let key = (
            account.provider.trim().to_string(),
            account.provider_version.trim().to_string(),
        );
        let summary = groups.entry(key.clone()).or_insert_with(|| ProviderSummary {
            provider: key.0.clone(),
            version: key.1.clone(),
            supported: supported.contains(&key),
            accounts: Vec::new(),
            invalid: Vec::new(),
        });

        let name = account.name.trim().to_string();
        if let Err(err) = AccountCredentials::from_descriptor(account) {
            summary.invalid.push(InvalidAccount {
                name,
                reason: err.to_string(),
            });
            continue;
        }
        if let Some(labels) = shared.get(&name) {
            let owner = format!("{}/{}", key.0, key.1);
            let others: Vec<&str> = labels
                .iter()
                .map(String::as_str)
                .filter(|label| *label != owner)
                .collect();
            summary.invalid.push(InvalidAccount {
                name,
                reason: format!("account name also configured under {}", others.join(", ")),
            });
            continue;
        }
        if !seen.insert((key.0.clone(), key.1.clone(), name.clone())) {
            summary.invalid.push(InvalidAccount {
                name,
                reason: "duplicate account name; only the first entry is used".to_string(),
            });
            continue;
        }
        summary.accounts.push(name);
    }

    groups.into_values().collect()
}

pub fn run_check(settings: &Settings, args: &CheckArgs) -> Result<(), AppError> {
    let summaries = summarize(&settings.accounts);
    let mut stdout = std::io::stdout().lock();

    if args.json {
        let body = serde_json::to_string_pretty(&summaries)
            .map_err(|err| AppError::unexpected(format!("failed to encode summary: {err}")))?;
        writeln!(stdout, "{body}").map_err(InfraError::from)?;
    } else {
        write_text(&mut stdout, &summaries).map_err(InfraError::from)?;
    }

    let problems: usize = summaries
        .iter()
        .filter(|summary| !summary.is_healthy())
        .map(|summary| {
            if summary.supported {
                summary.invalid.len()
            } else {
                summary.accounts.len() + summary.invalid.len()
            }
        })
        .sum();

    if problems > 0 {
        return Err(AppError::validation(format!(
            "{problems} account(s) cannot be served"
        )));
    }
    Ok(())
}

fn write_text(out: &mut impl Write, summaries: &[ProviderSummary]) -> std::io::Result<()> {
    if summaries.is_empty() {
        return writeln!(out, "no accounts configured");
    }
    for summary in summaries {
        let status = if summary.supported { "" } else { " (unsupported)" };
        writeln!(
            out,
            "{}/{}{}: {} account(s)",
            summary.provider,
            summary.version,
            status,
            summary.accounts.len()
        )?;
        for name in &summary.accounts {
            writeln!(out, "  {name}")?;
        }
        for invalid in &summary.invalid {
            writeln!(out, "  {} [invalid: {}]", invalid.name, invalid.reason)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_accounts_by_provider_version() {
        let accounts = vec![
            AccountDescriptor::new("prod", "static"),
            AccountDescriptor::new("test", "static"),
            AccountDescriptor::new("legacy", "static").with_provider_version("v0"),
        ];
        let summaries = summarize(&accounts);

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].version, "v0");
        assert!(!summaries[0].supported);
        assert_eq!(summaries[1].accounts, vec!["prod", "test"]);
        assert!(summaries[1].supported);
        assert!(summaries[1].is_healthy());
        assert!(!summaries[0].is_healthy());
    }

    #[test]
    fn flags_invalid_and_duplicate_accounts() {
        let mut blank_region = AccountDescriptor::new("regional", "static");
        blank_region.regions = vec![" ".to_string()];
        let accounts = vec![
            AccountDescriptor::new("prod", "static"),
            AccountDescriptor::new("prod", "static"),
            blank_region,
        ];

        let summaries = summarize(&accounts);
        assert_eq!(summaries.len(), 1);
        let summary = &summaries[0];
        assert_eq!(summary.accounts, vec!["prod"]);
        let invalid: Vec<_> = summary.invalid.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(invalid, vec!["prod", "regional"]);
        assert!(summary.invalid[0].reason.contains("duplicate"));
    }

    #[test]
    fn rejects_names_shared_across_providers() {
        let accounts = vec![
            AccountDescriptor::new("prod", "static"),
            AccountDescriptor::new("prod", "aws"),
            AccountDescriptor::new("test", "static"),
        ];

        let summaries = summarize(&accounts);
        let aws = &summaries[0];
        let local = &summaries[1];
        assert_eq!(aws.provider, "aws");
        assert!(aws.accounts.is_empty());
        assert_eq!(aws.invalid[0].reason, "account name also configured under static/v1");
        assert_eq!(local.accounts, vec!["test"]);
        assert_eq!(local.invalid[0].name, "prod");
        assert_eq!(local.invalid[0].reason, "account name also configured under aws/v1");
        assert!(!local.is_healthy());
    }

    #[test]
    fn text_output_lists_every_account() {
        let summaries = summarize(&[AccountDescriptor::new("prod", "static")]);
        let mut out = Vec::new();
        write_text(&mut out, &summaries).expect("write");
        let text = String::from_utf8(out).expect("utf8");
        assert_eq!(text, "static/v1: 1 account(s)\n  prod\n");
    }
}
