//! In-process backend over a concurrent map.
//!
//! Each operation touches exactly one map entry, which gives the same per-key
//! atomicity a networked hash/set store provides and nothing more.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::backend::{BackendError, KeyValueBackend};

#[derive(Debug, Clone)]
enum Slot {
    Hash(HashMap<String, String>),
    Set(BTreeSet<String>),
}

impl Slot {
    fn kind(&self) -> &'static str {
        match self {
            Slot::Hash(_) => "hash",
            Slot::Set(_) => "set",
        }
    }
}

fn wrong_type(key: &str, expected: &'static str, slot: &Slot) -> BackendError {
    BackendError::WrongType {
        key: key.to_string(),
        expected,
        actual: slot.kind(),
    }
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    slots: DashMap<String, Slot>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys starting with `prefix`, sorted. Mirrors a key-prefix scan.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .slots
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[async_trait]
impl KeyValueBackend for MemoryBackend {
    async fn hash_set(&self, key: &str, fields: Vec<(String, String)>) -> Result<(), BackendError> {
        if fields.is_empty() {
            return Ok(());
        }
        match self.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => match occupied.get_mut() {
                Slot::Hash(hash) => {
                    hash.extend(fields);
                    Ok(())
                }
                other => Err(wrong_type(key, "hash", other)),
            },
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::Hash(fields.into_iter().collect()));
                Ok(())
            }
        }
    }

    async fn hash_delete(&self, key: &str, fields: &[String]) -> Result<(), BackendError> {
        let Entry::Occupied(mut occupied) = self.slots.entry(key.to_string()) else {
            return Ok(());
        };
        let now_empty = match occupied.get_mut() {
            Slot::Hash(hash) => {
                for field in fields {
                    hash.remove(field);
                }
                hash.is_empty()
            }
            other => return Err(wrong_type(key, "hash", other)),
        };
        if now_empty {
            occupied.remove();
        }
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, BackendError> {
        match self.slots.get(key) {
            None => Ok(HashMap::new()),
            Some(slot) => match slot.value() {
                Slot::Hash(hash) => Ok(hash.clone()),
                other => Err(wrong_type(key, "hash", other)),
            },
        }
    }

    async fn set_add(&self, key: &str, members: &[String]) -> Result<(), BackendError> {
        if members.is_empty() {
            return Ok(());
        }
        match self.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => match occupied.get_mut() {
                Slot::Set(set) => {
                    set.extend(members.iter().cloned());
                    Ok(())
                }
                other => Err(wrong_type(key, "set", other)),
            },
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::Set(members.iter().cloned().collect()));
                Ok(())
            }
        }
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> Result<(), BackendError> {
        let Entry::Occupied(mut occupied) = self.slots.entry(key.to_string()) else {
            return Ok(());
        };
        let now_empty = match occupied.get_mut() {
            Slot::Set(set) => {
                for member in members {
                    set.remove(member);
                }
                set.is_empty()
            }
            other => return Err(wrong_type(key, "set", other)),
        };
        if now_empty {
            occupied.remove();
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<BTreeSet<String>, BackendError> {
        match self.slots.get(key) {
            None => Ok(BTreeSet::new()),
            Some(slot) => match slot.value() {
                Slot::Set(set) => Ok(set.clone()),
                other => Err(wrong_type(key, "set", other)),
            },
        }
    }

    async fn set_replace(&self, key: &str, members: &[String]) -> Result<(), BackendError> {
        match self.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if let Slot::Hash(_) = occupied.get() {
                    return Err(wrong_type(key, "set", occupied.get()));
                }
                if members.is_empty() {
                    occupied.remove();
                } else {
                    occupied.insert(Slot::Set(members.iter().cloned().collect()));
                }
                Ok(())
            }
            Entry::Vacant(vacant) => {
                if !members.is_empty() {
                    vacant.insert(Slot::Set(members.iter().cloned().collect()));
                }
                Ok(())
            }
        }
    }

    async fn delete(&self, keys: &[String]) -> Result<(), BackendError> {
        for key in keys {
            self.slots.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[tokio::test]
    async fn hash_fields_overwrite_and_delete() {
        let backend = MemoryBackend::new();
        backend
            .hash_set("h", vec![("a".into(), "1".into()), ("b".into(), "2".into())])
            .await
            .unwrap();
        backend
            .hash_set("h", vec![("a".into(), "3".into())])
            .await
            .unwrap();
        backend.hash_delete("h", &strings(&["b"])).await.unwrap();

        let hash = backend.hash_get_all("h").await.unwrap();
        assert_eq!(hash.len(), 1);
        assert_eq!(hash.get("a").map(String::as_str), Some("3"));
    }

    #[tokio::test]
    async fn removing_last_field_or_member_drops_the_key() {
        let backend = MemoryBackend::new();
        backend
            .hash_set("h", vec![("a".into(), "1".into())])
            .await
            .unwrap();
        backend.set_add("s", &strings(&["x"])).await.unwrap();

        backend.hash_delete("h", &strings(&["a"])).await.unwrap();
        backend.set_remove("s", &strings(&["x"])).await.unwrap();

        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn set_replace_discards_previous_members() {
        let backend = MemoryBackend::new();
        backend.set_add("s", &strings(&["a", "b"])).await.unwrap();
        backend.set_replace("s", &strings(&["c"])).await.unwrap();

        let members: Vec<String> = backend.set_members("s").await.unwrap().into_iter().collect();
        assert_eq!(members, strings(&["c"]));

        backend.set_replace("s", &[]).await.unwrap();
        assert!(backend.set_members("s").await.unwrap().is_empty());
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn wrong_type_access_is_reported() {
        let backend = MemoryBackend::new();
        backend.set_add("s", &strings(&["a"])).await.unwrap();

        let err = backend.hash_get_all("s").await.unwrap_err();
        assert!(matches!(
            err,
            BackendError::WrongType {
                expected: "hash",
                actual: "set",
                ..
            }
        ));
        assert!(
            backend
                .hash_set("s", vec![("f".into(), "v".into())])
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn missing_keys_read_as_empty() {
        let backend = MemoryBackend::new();
        assert!(backend.hash_get_all("nope").await.unwrap().is_empty());
        assert!(backend.set_members("nope").await.unwrap().is_empty());
        backend.delete(&strings(&["nope"])).await.unwrap();
        backend.set_remove("nope", &strings(&["x"])).await.unwrap();
    }

    #[tokio::test]
    async fn prefix_scan_lists_sorted_keys() {
        let backend = MemoryBackend::new();
        backend.set_add("p:b", &strings(&["1"])).await.unwrap();
        backend.set_add("p:a", &strings(&["1"])).await.unwrap();
        backend.set_add("q:a", &strings(&["1"])).await.unwrap();

        assert_eq!(backend.keys_with_prefix("p:"), strings(&["p:a", "p:b"]));
    }
}
