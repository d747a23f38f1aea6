//! Node resolution and caching
//!
//! [`DefaultNetNodeManager`] turns a `(type, id)` pair into a shared
//! [`NetNodeAction`]. Pods go through the endpoint locator, then the
//! collector, then the network plugin. Nodes skip the locator. Any other
//! type is handed to the parent manager, or becomes a bare generic node
//! when there is none.
//!
//! Successful results are cached for the lifetime of the manager and never
//! invalidated. Failures are not cached, so a later request retries.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::collector::Collector;
use crate::k8s::EndpointLocator;
use crate::metrics::{ResolveOutcome, ResolverMetrics};
use crate::model::{GenericNode, NetNodeAction, NetNodeType};
use crate::plugin::NetworkPlugin;
use crate::{Result, SkoopError};

#[async_trait]
pub trait NetNodeManager: Send + Sync {
    async fn get_net_node_from_id(
        &self,
        node_type: NetNodeType,
        id: &str,
    ) -> Result<Arc<NetNodeAction>>;
}

pub struct DefaultNetNodeManager {
    parent: Option<Arc<dyn NetNodeManager>>,
    locator: Arc<dyn EndpointLocator>,
    collector: Arc<dyn Collector>,
    plugin: Arc<dyn NetworkPlugin>,
    cache: DashMap<String, Arc<NetNodeAction>>,
    metrics: Option<ResolverMetrics>,
}

impl DefaultNetNodeManager {
    pub fn new(
        locator: Arc<dyn EndpointLocator>,
        collector: Arc<dyn Collector>,
        plugin: Arc<dyn NetworkPlugin>,
    ) -> Self {
        Self {
            parent: None,
            locator,
            collector,
            plugin,
            cache: DashMap::new(),
            metrics: None,
        }
    }

    /// Delegate unrecognized node types to `parent`.
    pub fn with_parent(mut self, parent: Arc<dyn NetNodeManager>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_metrics(mut self, metrics: ResolverMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn cache_key(node_type: NetNodeType, id: &str) -> String {
        format!("{}---{}", node_type, id)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn contains(&self, node_type: NetNodeType, id: &str) -> bool {
        self.cache.contains_key(&Self::cache_key(node_type, id))
    }

    fn record(&self, outcome: ResolveOutcome) {
        if let Some(metrics) = &self.metrics {
            metrics.record(outcome);
        }
    }

    /// Store `node` unless another caller got there first; either way return
    /// the stored instance.
    fn store(&self, key: String, node: Arc<NetNodeAction>) -> Arc<NetNodeAction> {
        let stored = self.cache.entry(key).or_insert(node).clone();
        if let Some(metrics) = &self.metrics {
            metrics.set_cache_entries(self.cache.len());
        }
        stored
    }

    async fn build_pod(&self, id: &str) -> Result<NetNodeAction> {
        let pod = self
            .locator
            .lookup_pod_by_address(id)
            .await?
            .ok_or_else(|| SkoopError::NotFound {
                node_type: NetNodeType::Pod,
                id: id.to_string(),
            })?;

        let snapshot = self
            .collector
            .collect_pod(&pod.namespace, &pod.name)
            .await
            .map_err(|e| SkoopError::CollectionFailed {
                node_type: NetNodeType::Pod,
                id: id.to_string(),
                source: Box::new(e),
            })?;

        self.plugin
            .create_pod(&snapshot)
            .map_err(|e| SkoopError::ConstructionFailed {
                node_type: NetNodeType::Pod,
                id: id.to_string(),
                source: Box::new(e),
            })
    }

    async fn build_node(&self, id: &str) -> Result<NetNodeAction> {
        let snapshot =
            self.collector
                .collect_node(id)
                .await
                .map_err(|e| SkoopError::CollectionFailed {
                    node_type: NetNodeType::Node,
                    id: id.to_string(),
                    source: Box::new(e),
                })?;

        self.plugin
            .create_node(&snapshot)
            .map_err(|e| SkoopError::ConstructionFailed {
                node_type: NetNodeType::Node,
                id: id.to_string(),
                source: Box::new(e),
            })
    }

    async fn resolve_uncached(
        &self,
        node_type: NetNodeType,
        id: &str,
    ) -> Result<(Arc<NetNodeAction>, ResolveOutcome)> {
        match node_type {
            NetNodeType::Pod => Ok((Arc::new(self.build_pod(id).await?), ResolveOutcome::Miss)),
            NetNodeType::Node => Ok((Arc::new(self.build_node(id).await?), ResolveOutcome::Miss)),
            _ => match &self.parent {
                Some(parent) => Ok((
                    parent.get_net_node_from_id(node_type, id).await?,
                    ResolveOutcome::Delegated,
                )),
                None => Ok((
                    Arc::new(NetNodeAction::Generic(GenericNode::new(id))),
                    ResolveOutcome::Synthesized,
                )),
            },
        }
    }
}

#[async_trait]
impl NetNodeManager for DefaultNetNodeManager {
    async fn get_net_node_from_id(
        &self,
        node_type: NetNodeType,
        id: &str,
    ) -> Result<Arc<NetNodeAction>> {
        let key = Self::cache_key(node_type, id);
        if let Some(node) = self.cache.get(&key).map(|entry| entry.value().clone()) {
            debug!(%key, "Resolver cache hit");
            self.record(ResolveOutcome::Hit);
            return Ok(node);
        }

        match self.resolve_uncached(node_type, id).await {
            Ok((node, outcome)) => {
                debug!(%key, outcome = outcome.as_str(), "Resolved {}", node);
                self.record(outcome);
                Ok(self.store(key, node))
            }
            Err(e) => {
                debug!(%key, error = %e, "Resolution failed");
                self.record(ResolveOutcome::Error);
                Err(e)
            }
        }
    }
}
