use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{CacheData, Identifier};

/// Delta produced by one caching agent poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheResult {
    #[serde(default)]
    pub upserts: BTreeMap<String, Vec<CacheData>>,
    #[serde(default)]
    pub evictions: BTreeMap<String, Vec<Identifier>>,
}

impl CacheResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, type_name: impl Into<String>, data: CacheData) -> &mut Self {
        self.upserts.entry(type_name.into()).or_default().push(data);
        self
    }

    pub fn evict(&mut self, type_name: impl Into<String>, id: impl Into<Identifier>) -> &mut Self {
        self.evictions
            .entry(type_name.into())
            .or_default()
            .push(id.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.upsert_count() == 0 && self.eviction_count() == 0
    }

    pub fn upsert_count(&self) -> usize {
        self.upserts.values().map(Vec::len).sum()
    }

    pub fn eviction_count(&self) -> usize {
        self.evictions.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_span_all_types() {
        let mut result = CacheResult::new();
        result
            .upsert("servers", CacheData::new("s1").unwrap())
            .upsert("servers", CacheData::new("s2").unwrap())
            .upsert("clusters", CacheData::new("c1").unwrap())
            .evict("servers", "s0");

        assert_eq!(result.upsert_count(), 3);
        assert_eq!(result.eviction_count(), 1);
        assert!(!result.is_empty());
    }

    #[test]
    fn empty_type_buckets_count_as_empty() {
        let mut result = CacheResult::new();
        result.upserts.insert("servers".to_string(), Vec::new());
        assert!(result.is_empty());
    }
}
