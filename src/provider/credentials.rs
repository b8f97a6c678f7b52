use std::sync::Arc;

use dashmap::DashMap;

use crate::domain::accounts::AccountCredentials;

/// Registry of credentials records keyed by account name.
pub trait CredentialsRepository: Send + Sync {
    /// Insert or overwrite the record stored under `credentials.name`.
    fn save(&self, credentials: Arc<AccountCredentials>);

    fn get_one(&self, name: &str) -> Option<Arc<AccountCredentials>>;

    /// Every record, ordered by name.
    fn get_all(&self) -> Vec<Arc<AccountCredentials>>;

    fn delete(&self, name: &str);
}

#[derive(Debug, Default)]
pub struct MemoryCredentialsRepository {
    records: DashMap<String, Arc<AccountCredentials>>,
}

impl MemoryCredentialsRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialsRepository for MemoryCredentialsRepository {
    fn save(&self, credentials: Arc<AccountCredentials>) {
        self.records.insert(credentials.name.clone(), credentials);
    }

    fn get_one(&self, name: &str) -> Option<Arc<AccountCredentials>> {
        self.records.get(name).map(|entry| Arc::clone(entry.value()))
    }

    fn get_all(&self) -> Vec<Arc<AccountCredentials>> {
        let mut all: Vec<_> = self
            .records
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    fn delete(&self, name: &str) {
        self.records.remove(name);
    }
}
