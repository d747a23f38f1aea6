//! Address -> pod index fed by the pod watcher
//!
//! Host-network pods are skipped: their address belongs to the node.

use async_trait::async_trait;
use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

use super::{EndpointLocator, PodRef};
use crate::Result;

#[derive(Clone, Default)]
pub struct IpCache {
    inner: Arc<DashMap<IpAddr, PodRef>>,
}

impl IpCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every address of `pod`, replacing stale owners.
    pub fn upsert(&self, pod: &PodRef) {
        if pod.host_network {
            return;
        }
        for ip in &pod.ips {
            self.inner.insert(*ip, pod.clone());
        }
    }

    /// Forget the addresses still owned by `pod`.
    pub fn remove(&self, pod: &PodRef) {
        for ip in &pod.ips {
            self.inner
                .remove_if(ip, |_, owner| owner.namespace == pod.namespace && owner.name == pod.name);
        }
    }

    /// Replace the whole index, used after a watch restart.
    pub fn reset<'a>(&self, pods: impl IntoIterator<Item = &'a PodRef>) {
        self.inner.clear();
        for pod in pods {
            self.upsert(pod);
        }
    }

    pub fn get_pod_from_ip(&self, ip: &IpAddr) -> Option<PodRef> {
        self.inner.get(ip).map(|r| r.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl EndpointLocator for IpCache {
    async fn lookup_pod_by_address(&self, ip: &str) -> Result<Option<PodRef>> {
        let Ok(addr) = ip.parse::<IpAddr>() else {
            debug!(ip, "Not an IP address, no pod owns it");
            return Ok(None);
        };
        Ok(self.get_pod_from_ip(&addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod(name: &str, ip: &str) -> PodRef {
        PodRef::new("default", name).with_ip(ip.parse().unwrap())
    }

    #[tokio::test]
    async fn test_lookup_by_address() {
        let cache = IpCache::new();
        cache.upsert(&pod("nginx", "10.244.1.5"));

        let found = cache.lookup_pod_by_address("10.244.1.5").await.unwrap();
        assert_eq!(found.map(|p| p.name), Some("nginx".to_string()));
        assert!(cache.lookup_pod_by_address("10.244.1.6").await.unwrap().is_none());
        assert!(cache.lookup_pod_by_address("worker-1").await.unwrap().is_none());
    }

    #[test]
    fn test_remove_keeps_new_owner() {
        let cache = IpCache::new();
        let old = pod("old", "10.244.1.5");
        cache.upsert(&old);
        cache.upsert(&pod("new", "10.244.1.5"));

        cache.remove(&old);
        let owner = cache.get_pod_from_ip(&"10.244.1.5".parse().unwrap());
        assert_eq!(owner.map(|p| p.name), Some("new".to_string()));
    }

    #[test]
    fn test_host_network_pods_are_skipped() {
        let cache = IpCache::new();
        let mut host = pod("kube-proxy", "192.168.0.11");
        host.host_network = true;
        cache.upsert(&host);
        assert!(cache.is_empty());

        cache.reset([&pod("a", "10.244.1.2"), &pod("b", "10.244.1.3")]);
        assert_eq!(cache.len(), 2);
    }
}
