//! Collector backed by a topology file captured ahead of time
//!
//! ```yaml
//! pods:
//!   - pod: { namespace: default, name: client, node_name: worker-1, ips: [10.244.1.5] }
//!     routes:
//!       - next_hop: { type: node, id: worker-1 }
//!         interface: eth0
//!         link_type: veth
//! nodes:
//!   - name: worker-1
//!     addresses: [192.168.0.11]
//!     routes:
//!       - destination: 10.244.1.5/32
//!         next_hop: { type: pod, id: 10.244.1.5 }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use tracing::{debug, info};

use super::{Collector, NodeSnapshot, PodSnapshot};
use crate::k8s::IpCache;
use crate::{Result, SkoopError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    #[serde(default)]
    pub pods: Vec<PodSnapshot>,
    #[serde(default)]
    pub nodes: Vec<NodeSnapshot>,
}

pub struct SnapshotCollector {
    topology: Topology,
}

impl SnapshotCollector {
    pub fn new(topology: Topology) -> Self {
        Self { topology }
    }

    pub fn parse(content: &str) -> Result<Self> {
        let topology: Topology = serde_yaml::from_str(content)?;
        Ok(Self::new(topology))
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            SkoopError::CollectorError(format!(
                "Failed to read snapshot {}: {}",
                path.display(),
                e
            ))
        })?;
        let collector = Self::parse(&content)?;
        info!(
            "Loaded snapshot {} ({} pods, {} nodes)",
            path.display(),
            collector.topology.pods.len(),
            collector.topology.nodes.len()
        );
        Ok(collector)
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// IP cache seeded with every pod in the snapshot
    pub fn ip_cache(&self) -> IpCache {
        let cache = IpCache::new();
        cache.reset(self.topology.pods.iter().map(|p| &p.pod));
        cache
    }

    /// Name of the node that owns `ip`, if any
    pub fn node_for_address(&self, ip: &IpAddr) -> Option<&str> {
        self.topology
            .nodes
            .iter()
            .find(|node| node.addresses.contains(ip))
            .map(|node| node.name.as_str())
    }
}

#[async_trait]
impl Collector for SnapshotCollector {
    async fn collect_pod(&self, namespace: &str, name: &str) -> Result<PodSnapshot> {
        debug!(namespace, name, "Collecting pod from snapshot");
        self.topology
            .pods
            .iter()
            .find(|p| p.pod.namespace == namespace && p.pod.name == name)
            .cloned()
            .ok_or_else(|| {
                SkoopError::CollectorError(format!(
                    "pod {}/{} not present in snapshot",
                    namespace, name
                ))
            })
    }

    async fn collect_node(&self, name: &str) -> Result<NodeSnapshot> {
        debug!(name, "Collecting node from snapshot");
        self.topology
            .nodes
            .iter()
            .find(|n| n.name == name)
            .cloned()
            .ok_or_else(|| {
                SkoopError::CollectorError(format!("node {} not present in snapshot", name))
            })
    }
}
