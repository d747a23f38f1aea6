//! Packet path walk over resolved nodes
//!
//! Starting at a source node, [`PathWalker`] repeatedly picks the most
//! specific matching link, applies its action and resolves the link's
//! destination through a [`NetNodeManager`] until a terminal state.

pub mod diagnosis;

pub use diagnosis::{Diagnosis, Hop, Outcome};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::DiagnoseConfig;
use crate::model::{Action, NetNodeAction, NetNodeType, NodeRef, Packet};
use crate::nodemanager::NetNodeManager;
use crate::SkoopError;

pub struct PathWalker {
    manager: Arc<dyn NetNodeManager>,
    max_hops: usize,
    resolve_timeout: Duration,
}

impl PathWalker {
    pub fn new(manager: Arc<dyn NetNodeManager>, config: &DiagnoseConfig) -> Self {
        Self {
            manager,
            max_hops: config.max_hops,
            resolve_timeout: config.resolve_timeout(),
        }
    }

    async fn resolve(&self, target: &NodeRef) -> Result<Arc<NetNodeAction>, SkoopError> {
        let lookup = self
            .manager
            .get_net_node_from_id(target.node_type, &target.id);
        match tokio::time::timeout(self.resolve_timeout, lookup).await {
            Ok(result) => result,
            Err(_) => Err(SkoopError::Timeout {
                node_type: target.node_type,
                id: target.id.clone(),
                secs: self.resolve_timeout.as_secs(),
            }),
        }
    }

    pub async fn walk(&self, source: NodeRef, packet: Packet) -> Diagnosis {
        info!("Walking {} from {}", packet, source);
        let start = packet;
        let mut packet = packet;
        let mut target = source;
        let mut hops = Vec::new();
        let mut visited: HashSet<(NodeRef, Packet)> = HashSet::new();

        let outcome = loop {
            if hops.len() >= self.max_hops {
                break Outcome::HopLimitExceeded {
                    limit: self.max_hops,
                };
            }

            let node = match self.resolve(&target).await {
                Ok(node) => node,
                Err(e) => {
                    break Outcome::Failed {
                        hop: target,
                        cause: e.to_string(),
                    }
                }
            };
            let here = node.net_node().node_ref();

            if !visited.insert((here.clone(), packet)) {
                break Outcome::Looped { at: here };
            }

            if node.node_type() == NetNodeType::Generic {
                if node.id() == packet.dst.to_string() {
                    hops.push(arrival(here.clone(), packet));
                    break Outcome::Delivered { at: here };
                }
                if node.actions().is_empty() {
                    hops.push(arrival(here.clone(), packet));
                    break Outcome::Exited { via: here };
                }
            }

            let Some((link, action)) = node.next_hop(&packet) else {
                hops.push(arrival(here.clone(), packet));
                break Outcome::Dropped {
                    at: here,
                    reason: "no matching link".to_string(),
                };
            };

            let next = action.apply(&packet);
            debug!("{} -> {} ({})", here, link.destination, action);
            hops.push(Hop {
                node: here.clone(),
                link: Some(link.clone()),
                action: Some(action.clone()),
                packet: next,
            });

            match action {
                Action::Deliver => break Outcome::Delivered { at: here },
                Action::Drop { reason } => {
                    break Outcome::Dropped {
                        at: here,
                        reason: reason.clone(),
                    }
                }
                Action::Reject { reason } => {
                    break Outcome::Rejected {
                        at: here,
                        reason: reason.clone(),
                    }
                }
                Action::Forward | Action::Translate { .. } => {
                    packet = next;
                    target = link.destination.clone();
                }
            }
        };

        info!("Walk finished: {}", outcome);
        Diagnosis {
            packet: start,
            hops,
            outcome,
        }
    }
}

fn arrival(node: NodeRef, packet: Packet) -> Hop {
    Hop {
        node,
        link: None,
        action: None,
        packet,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::SnapshotCollector;
    use crate::model::Protocol;
    use crate::nodemanager::DefaultNetNodeManager;
    use crate::plugin::RoutePlugin;
    use crate::Result;
    use async_trait::async_trait;

    const TOPOLOGY: &str = r#"
pods:
  - pod: { namespace: default, name: client, node_name: worker-1, ips: [10.244.1.5] }
    routes:
      - next_hop: { type: node, id: worker-1 }
        interface: eth0
        link_type: veth
  - pod: { namespace: default, name: server, node_name: worker-2, ips: [10.244.2.7] }
    routes:
      - next_hop: { type: node, id: worker-2 }
        interface: eth0
        link_type: veth
nodes:
  - name: worker-1
    addresses: [192.168.0.11]
    routes:
      - destination: 10.244.1.5/32
        next_hop: { type: pod, id: 10.244.1.5 }
        link_type: veth
      - destination: 10.244.2.0/24
        next_hop: { type: node, id: worker-2 }
      - destination: 10.244.3.0/24
        next_hop: { type: node, id: worker-3 }
      - destination: 10.250.0.0/16
        next_hop: { type: node, id: worker-2 }
      - destination: 192.168.0.0/24
        next_hop: { type: generic, id: 192.168.0.99 }
      - next_hop: { type: external, id: internet }
        link_type: external
        masquerade: true
    services:
      - { vip: 10.96.0.10, port: 80, backend: 10.244.2.7, backend_port: 8080 }
    filters:
      - { destination: 10.244.2.0/24, dport: 6379, verdict: drop, comment: deny redis }
      - { destination: 10.244.2.0/24, dport: 22, verdict: reject, comment: no ssh }
  - name: worker-2
    addresses: [192.168.0.12]
    routes:
      - destination: 10.244.2.7/32
        next_hop: { type: pod, id: 10.244.2.7 }
        link_type: veth
      - destination: 10.244.1.0/24
        next_hop: { type: node, id: worker-1 }
      - destination: 10.250.0.0/16
        next_hop: { type: node, id: worker-1 }
"#;

    fn walker_with(config: DiagnoseConfig) -> PathWalker {
        let collector = SnapshotCollector::parse(TOPOLOGY).unwrap();
        let locator = Arc::new(collector.ip_cache());
        let manager = DefaultNetNodeManager::new(
            locator,
            Arc::new(collector),
            Arc::new(RoutePlugin::new()),
        );
        PathWalker::new(Arc::new(manager), &config)
    }

    fn walker() -> PathWalker {
        walker_with(DiagnoseConfig::default())
    }

    fn client() -> NodeRef {
        NodeRef::new(NetNodeType::Pod, "10.244.1.5")
    }

    fn tcp(src: &str, dst: &str, dport: u16) -> Packet {
        Packet {
            src: src.parse().unwrap(),
            dst: dst.parse().unwrap(),
            dport,
            protocol: Protocol::Tcp,
        }
    }

    fn path(diagnosis: &Diagnosis) -> Vec<String> {
        diagnosis.hops.iter().map(|h| h.node.to_string()).collect()
    }

    #[tokio::test]
    async fn test_pod_to_pod_across_nodes() {
        let diagnosis = walker()
            .walk(client(), tcp("10.244.1.5", "10.244.2.7", 80))
            .await;

        assert_eq!(
            path(&diagnosis),
            vec![
                "pod/10.244.1.5",
                "node/worker-1",
                "node/worker-2",
                "pod/10.244.2.7"
            ]
        );
        assert_eq!(
            diagnosis.outcome,
            Outcome::Delivered {
                at: NodeRef::new(NetNodeType::Pod, "10.244.2.7")
            }
        );
        assert!(diagnosis.outcome.is_delivered());
    }

    #[tokio::test]
    async fn test_filter_drop_and_reject() {
        let dropped = walker()
            .walk(client(), tcp("10.244.1.5", "10.244.2.7", 6379))
            .await;
        assert_eq!(
            dropped.outcome,
            Outcome::Dropped {
                at: NodeRef::new(NetNodeType::Node, "worker-1"),
                reason: "deny redis".to_string()
            }
        );

        let rejected = walker()
            .walk(client(), tcp("10.244.1.5", "10.244.2.7", 22))
            .await;
        assert!(matches!(rejected.outcome, Outcome::Rejected { ref reason, .. } if reason == "no ssh"));
        assert_eq!(rejected.hops.len(), 2);
    }

    #[tokio::test]
    async fn test_portless_filter_drops_before_routing() {
        let topology = format!(
            "{}    filters:\n      - {{ destination: 10.244.1.0/24, verdict: drop, comment: isolate worker-1 pods }}\n",
            TOPOLOGY
        );
        let collector = SnapshotCollector::parse(&topology).unwrap();
        let manager = DefaultNetNodeManager::new(
            Arc::new(collector.ip_cache()),
            Arc::new(collector),
            Arc::new(RoutePlugin::new()),
        );
        let walker = PathWalker::new(Arc::new(manager), &DiagnoseConfig::default());

        let diagnosis = walker
            .walk(
                NodeRef::new(NetNodeType::Pod, "10.244.2.7"),
                tcp("10.244.2.7", "10.244.1.5", 80),
            )
            .await;
        assert_eq!(
            diagnosis.outcome,
            Outcome::Dropped {
                at: NodeRef::new(NetNodeType::Node, "worker-2"),
                reason: "isolate worker-1 pods".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_no_matching_link_is_implicit_drop() {
        let diagnosis = walker()
            .walk(
                NodeRef::new(NetNodeType::Pod, "10.244.2.7"),
                tcp("10.244.2.7", "8.8.8.8", 443),
            )
            .await;
        assert_eq!(
            diagnosis.outcome,
            Outcome::Dropped {
                at: NodeRef::new(NetNodeType::Node, "worker-2"),
                reason: "no matching link".to_string()
            }
        );
        assert!(diagnosis.hops.last().unwrap().link.is_none());
    }

    #[tokio::test]
    async fn test_service_translation() {
        let diagnosis = walker()
            .walk(client(), tcp("10.244.1.5", "10.96.0.10", 80))
            .await;

        assert!(diagnosis.outcome.is_delivered());
        assert_eq!(
            path(&diagnosis),
            vec![
                "pod/10.244.1.5",
                "node/worker-1",
                "node/worker-1",
                "node/worker-2",
                "pod/10.244.2.7"
            ]
        );
        let last = diagnosis.hops.last().unwrap();
        assert_eq!(last.packet.dst, "10.244.2.7".parse::<std::net::IpAddr>().unwrap());
        assert_eq!(last.packet.dport, 8080);
        assert_eq!(diagnosis.packet.dport, 80);
    }

    #[tokio::test]
    async fn test_exit_through_external_with_masquerade() {
        let diagnosis = walker()
            .walk(client(), tcp("10.244.1.5", "8.8.8.8", 53))
            .await;

        assert_eq!(
            diagnosis.outcome,
            Outcome::Exited {
                via: NodeRef::new(NetNodeType::Generic, "internet")
            }
        );
        let last = diagnosis.hops.last().unwrap();
        assert_eq!(last.packet.src, "192.168.0.11".parse::<std::net::IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_delivered_to_generic_destination() {
        let diagnosis = walker()
            .walk(client(), tcp("10.244.1.5", "192.168.0.99", 9100))
            .await;
        assert_eq!(
            diagnosis.outcome,
            Outcome::Delivered {
                at: NodeRef::new(NetNodeType::Generic, "192.168.0.99")
            }
        );
    }

    #[tokio::test]
    async fn test_forwarding_loop() {
        let diagnosis = walker()
            .walk(client(), tcp("10.244.1.5", "10.250.0.1", 80))
            .await;
        assert_eq!(
            diagnosis.outcome,
            Outcome::Looped {
                at: NodeRef::new(NetNodeType::Node, "worker-1")
            }
        );
        assert_eq!(diagnosis.hops.len(), 3);
    }

    #[tokio::test]
    async fn test_hop_limit() {
        let walker = walker_with(DiagnoseConfig {
            max_hops: 2,
            ..DiagnoseConfig::default()
        });
        let diagnosis = walker
            .walk(client(), tcp("10.244.1.5", "10.244.2.7", 80))
            .await;
        assert_eq!(diagnosis.outcome, Outcome::HopLimitExceeded { limit: 2 });
        assert_eq!(diagnosis.hops.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_hop_is_reported() {
        let diagnosis = walker()
            .walk(client(), tcp("10.244.1.5", "10.244.3.3", 80))
            .await;
        match &diagnosis.outcome {
            Outcome::Failed { hop, cause } => {
                assert_eq!(hop, &NodeRef::new(NetNodeType::Node, "worker-3"));
                assert!(cause.starts_with("error run collector for node worker-3"));
            }
            other => panic!("unexpected outcome: {}", other),
        }
        assert_eq!(diagnosis.hops.len(), 2);

        let unknown = walker()
            .walk(
                NodeRef::new(NetNodeType::Pod, "10.244.9.9"),
                tcp("10.244.9.9", "10.244.2.7", 80),
            )
            .await;
        assert!(matches!(unknown.outcome, Outcome::Failed { .. }));
        assert!(unknown.hops.is_empty());
    }

    struct StalledManager;

    #[async_trait]
    impl NetNodeManager for StalledManager {
        async fn get_net_node_from_id(
            &self,
            _node_type: NetNodeType,
            _id: &str,
        ) -> Result<Arc<NetNodeAction>> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_resolution_timeout() {
        let walker = PathWalker::new(
            Arc::new(StalledManager),
            &DiagnoseConfig {
                max_hops: 4,
                resolve_timeout_secs: 1,
            },
        );
        let diagnosis = walker
            .walk(client(), tcp("10.244.1.5", "10.244.2.7", 80))
            .await;
        assert_eq!(
            diagnosis.outcome,
            Outcome::Failed {
                hop: client(),
                cause: "Timed out resolving pod 10.244.1.5 after 1s".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_json_output() {
        let diagnosis = walker()
            .walk(client(), tcp("10.244.1.5", "10.244.2.7", 6379))
            .await;
        let json = serde_json::to_value(&diagnosis).unwrap();
        assert_eq!(json["outcome"]["outcome"], "dropped");
        assert_eq!(json["hops"][0]["node"]["type"], "pod");
        assert_eq!(json["hops"][1]["action"]["action"], "drop");
        assert!(diagnosis.to_string().ends_with("Result: dropped at node/worker-1: deny redis"));
    }
}
