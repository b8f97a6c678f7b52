//! Bounded-wait reads across several cache sources.
//!
//! Every read goes to all sources at once and waits for one shared deadline.
//! Whatever answered in time is merged; a source that errors or stalls only
//! shrinks the result.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cumulus_types::{CacheData, Identifier};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use metrics::counter;
use tracing::warn;

use super::config::CacheConfig;
use super::contract::ReadableCache;
use super::error::CacheError;
use super::filter::{CacheFilter, IdentifierGlob};

const METRIC_DEGRADED: &str = "cumulus_cache_fan_out_degraded_total";

/// Drive labelled futures concurrently until all finish or `deadline` passes.
///
/// Returns the successful outputs in input order. Failures and stragglers are
/// logged under their label and dropped.
pub async fn gather_within<I, L, F, T, E>(deadline: Duration, futures: I) -> Vec<T>
where
    I: IntoIterator<Item = (L, F)>,
    L: Into<String>,
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut labels = Vec::new();
    let mut pending = FuturesUnordered::new();
    for (index, (label, future)) in futures.into_iter().enumerate() {
        labels.push(label.into());
        pending.push(async move { (index, future.await) });
    }

    let mut slots: Vec<Option<T>> = labels.iter().map(|_| None).collect();
    let mut finished = vec![false; labels.len()];

    let timer = tokio::time::sleep(deadline);
    tokio::pin!(timer);

    loop {
        tokio::select! {
            next = pending.next() => match next {
                Some((index, Ok(value))) => {
                    finished[index] = true;
                    slots[index] = Some(value);
                }
                Some((index, Err(err))) => {
                    finished[index] = true;
                    warn!(source = %labels[index], error = %err, "cache source failed; continuing without it");
                    counter!(METRIC_DEGRADED, "source" => labels[index].clone(), "reason" => "error")
                        .increment(1);
                }
                None => break,
            },
            _ = &mut timer => {
                for (label, _) in labels.iter().zip(&finished).filter(|(_, done)| !**done) {
                    warn!(source = %label, ?deadline, "cache source missed the read deadline");
                    counter!(METRIC_DEGRADED, "source" => label.clone(), "reason" => "timeout")
                        .increment(1);
                }
                break;
            }
        }
    }

    slots.into_iter().flatten().collect()
}

struct Source {
    name: String,
    cache: Arc<dyn ReadableCache>,
}

/// Read-only view merging several named sources.
///
/// Attributes are unioned with later sources winning on the same key.
/// Relationship sets of the same name and identifier sets are unioned.
pub struct CompositeCache {
    sources: Vec<Source>,
    deadline: Duration,
}

impl CompositeCache {
    pub fn new(deadline: Duration) -> Self {
        Self {
            sources: Vec::new(),
            deadline,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.fan_out_timeout)
    }

    pub fn with_source(mut self, name: impl Into<String>, cache: Arc<dyn ReadableCache>) -> Self {
        self.sources.push(Source {
            name: name.into(),
            cache,
        });
        self
    }

    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|source| source.name.as_str())
    }

    async fn identifier_union<'a, F, Fut>(&'a self, read: F) -> Vec<Identifier>
    where
        F: Fn(&'a dyn ReadableCache) -> Fut,
        Fut: Future<Output = Result<Vec<Identifier>, CacheError>>,
    {
        let answers = gather_within(
            self.deadline,
            self.sources
                .iter()
                .map(|source| (source.name.as_str(), read(source.cache.as_ref()))),
        )
        .await;

        answers
            .into_iter()
            .flatten()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

fn merge_views(type_name: &str, views: Vec<CacheData>) -> Result<Option<CacheData>, CacheError> {
    let mut views = views.into_iter();
    let Some(first) = views.next() else {
        return Ok(None);
    };

    let id = first.id().to_string();
    let mut attributes = first.attributes().clone();
    let mut relationships = first.relationships().clone();
    for view in views {
        attributes.extend(
            view.attributes()
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        for (name, targets) in view.relationships() {
            relationships
                .entry(name.clone())
                .or_insert_with(BTreeSet::new)
                .extend(targets.iter().cloned());
        }
    }

    CacheData::from_parts(id, attributes, relationships)
        .map(Some)
        .map_err(|source| CacheError::Invalid {
            type_name: type_name.to_string(),
            source,
        })
}

#[async_trait]
impl ReadableCache for CompositeCache {
    async fn get_filtered(
        &self,
        type_name: &str,
        id: &str,
        filter: Option<&CacheFilter>,
    ) -> Result<Option<CacheData>, CacheError> {
        let answers = gather_within(
            self.deadline,
            self.sources.iter().map(|source| {
                (
                    source.name.as_str(),
                    source.cache.get_filtered(type_name, id, filter),
                )
            }),
        )
        .await;

        merge_views(type_name, answers.into_iter().flatten().collect())
    }

    async fn get_all(&self, type_name: &str) -> Result<Vec<CacheData>, CacheError> {
        let answers = gather_within(
            self.deadline,
            self.sources
                .iter()
                .map(|source| (source.name.as_str(), source.cache.get_all(type_name))),
        )
        .await;

        let mut by_id: BTreeMap<String, Vec<CacheData>> = BTreeMap::new();
        for data in answers.into_iter().flatten() {
            by_id.entry(data.id().to_string()).or_default().push(data);
        }

        let mut merged = Vec::with_capacity(by_id.len());
        for views in by_id.into_values() {
            if let Some(data) = merge_views(type_name, views)? {
                merged.push(data);
            }
        }
        Ok(merged)
    }

    async fn get_identifiers(&self, type_name: &str) -> Result<Vec<Identifier>, CacheError> {
        Ok(self
            .identifier_union(|cache| cache.get_identifiers(type_name))
            .await)
    }

    async fn filter_identifiers(
        &self,
        type_name: &str,
        glob: &str,
    ) -> Result<Vec<Identifier>, CacheError> {
        IdentifierGlob::new(glob).map_err(|source| CacheError::InvalidPattern {
            pattern: glob.to_string(),
            source,
        })?;
        Ok(self
            .identifier_union(|cache| cache.filter_identifiers(type_name, glob))
            .await)
    }
}
