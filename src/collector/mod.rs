//! Live-state collection seam
//!
//! A [`Collector`] returns what a pod or node looks like on the wire: its
//! addresses, interfaces, routes and filter rules. How it gets there
//! (namespaces, netlink, iptables) is up to the implementation.

pub mod snapshot;

pub use snapshot::{SnapshotCollector, Topology};

use async_trait::async_trait;
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::k8s::PodRef;
use crate::model::{LinkType, NodeRef};
use crate::Result;

#[async_trait]
pub trait Collector: Send + Sync {
    async fn collect_pod(&self, namespace: &str, name: &str) -> Result<PodSnapshot>;

    async fn collect_node(&self, name: &str) -> Result<NodeSnapshot>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    #[serde(default)]
    pub addresses: Vec<IpNetwork>,
    #[serde(default)]
    pub mtu: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    /// `None` is the default route
    #[serde(default)]
    pub destination: Option<IpNetwork>,
    #[serde(default)]
    pub interface: Option<String>,
    pub next_hop: NodeRef,
    #[serde(default = "default_route_link")]
    pub link_type: LinkType,
    /// Rewrite the source to the node's primary address
    #[serde(default)]
    pub masquerade: bool,
}

fn default_route_link() -> LinkType {
    LinkType::Route
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Drop,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRule {
    #[serde(default)]
    pub destination: Option<IpNetwork>,
    #[serde(default)]
    pub dport: Option<u16>,
    pub verdict: Verdict,
    #[serde(default)]
    pub comment: String,
}

/// DNAT rule, e.g. a ClusterIP service port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRule {
    pub vip: IpAddr,
    pub port: u16,
    pub backend: IpAddr,
    pub backend_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSnapshot {
    pub pod: PodRef,
    #[serde(default)]
    pub netns: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<Interface>,
    #[serde(default)]
    pub routes: Vec<RouteEntry>,
    #[serde(default)]
    pub filters: Vec<FilterRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub name: String,
    #[serde(default)]
    pub addresses: Vec<IpAddr>,
    #[serde(default)]
    pub interfaces: Vec<Interface>,
    #[serde(default)]
    pub routes: Vec<RouteEntry>,
    #[serde(default)]
    pub filters: Vec<FilterRule>,
    #[serde(default)]
    pub services: Vec<ServiceRule>,
}

impl NodeSnapshot {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            addresses: Vec::new(),
            interfaces: Vec::new(),
            routes: Vec::new(),
            filters: Vec::new(),
            services: Vec::new(),
        }
    }
}

impl PodSnapshot {
    pub fn new(pod: PodRef) -> Self {
        Self {
            pod,
            netns: None,
            interfaces: Vec::new(),
            routes: Vec::new(),
            filters: Vec::new(),
        }
    }
}
