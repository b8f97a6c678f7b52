//! Backing-store key scheme.
//!
//! Every key is namespaced `prefix:type:...` so several logical caches can
//! share one store. Other components scan these keys directly, so the layout
//! is a compatibility contract:
//!
//! | purpose                   | key                                         | structure |
//! |---------------------------|---------------------------------------------|-----------|
//! | all ids of a type         | `prefix:type:members`                       | set       |
//! | entity attributes         | `prefix:type:attributes:id`                 | hash      |
//! | relationship-name index   | `prefix:type:relationships:id`              | set       |
//! | one relationship's targets| `prefix:type:relationships:id:relationship` | set       |

const MEMBERS: &str = "members";
const ATTRIBUTES: &str = "attributes";
const RELATIONSHIPS: &str = "relationships";

/// Builds keys for one cache prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKeys {
    prefix: String,
}

impl CacheKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn members(&self, type_name: &str) -> String {
        format!("{}:{type_name}:{MEMBERS}", self.prefix)
    }

    pub fn attributes(&self, type_name: &str, id: &str) -> String {
        format!("{}:{type_name}:{ATTRIBUTES}:{id}", self.prefix)
    }

    pub fn relationship_index(&self, type_name: &str, id: &str) -> String {
        format!("{}:{type_name}:{RELATIONSHIPS}:{id}", self.prefix)
    }

    pub fn relationship(&self, type_name: &str, id: &str, relationship: &str) -> String {
        format!(
            "{}:{type_name}:{RELATIONSHIPS}:{id}:{relationship}",
            self.prefix
        )
    }

    /// Prefix shared by every attribute key of a type, for key-prefix scans.
    pub fn attributes_scan_prefix(&self, type_name: &str) -> String {
        format!("{}:{type_name}:{ATTRIBUTES}:", self.prefix)
    }
}
