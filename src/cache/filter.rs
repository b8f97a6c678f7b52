//! Read-side filters: relationship-name filtering and identifier globs.

use globset::{Glob, GlobMatcher};

/// Restricts which relationships a read assembles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheFilter {
    /// Keep relationships whose name starts with any of the prefixes.
    Relationships(Vec<String>),
}

impl CacheFilter {
    pub fn relationships<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Relationships(prefixes.into_iter().map(Into::into).collect())
    }

    pub fn allows_relationship(&self, name: &str) -> bool {
        match self {
            CacheFilter::Relationships(prefixes) => {
                prefixes.iter().any(|prefix| name.starts_with(prefix.as_str()))
            }
        }
    }
}

pub(crate) fn allows(filter: Option<&CacheFilter>, relationship: &str) -> bool {
    filter.is_none_or(|filter| filter.allows_relationship(relationship))
}

/// Redis-style glob over identifiers (`*`, `?`, `[...]`).
#[derive(Debug, Clone)]
pub struct IdentifierGlob {
    matcher: GlobMatcher,
}

impl IdentifierGlob {
    pub fn new(pattern: &str) -> Result<Self, globset::Error> {
        let matcher = Glob::new(pattern)?.compile_matcher();
        Ok(Self { matcher })
    }

    pub fn matches(&self, id: &str) -> bool {
        self.matcher.is_match(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relationship_filter_matches_prefixes() {
        let filter = CacheFilter::relationships(["load", "inst"]);
        assert!(filter.allows_relationship("loadBalancers"));
        assert!(filter.allows_relationship("instances"));
        assert!(!filter.allows_relationship("clusters"));
    }

    #[test]
    fn missing_filter_allows_everything() {
        assert!(allows(None, "anything"));
        let empty = CacheFilter::relationships(Vec::<String>::new());
        assert!(!allows(Some(&empty), "anything"));
    }

    #[test]
    fn glob_matches_composite_identifiers() {
        let glob = IdentifierGlob::new("aws:prod:*:i-?23").expect("valid glob");
        assert!(glob.matches("aws:prod:us-east-1:i-123"));
        assert!(glob.matches("aws:prod:eu/west:i-923"));
        assert!(!glob.matches("aws:test:us-east-1:i-123"));
    }

    #[test]
    fn invalid_glob_is_rejected() {
        assert!(IdentifierGlob::new("servers[").is_err());
    }
}
