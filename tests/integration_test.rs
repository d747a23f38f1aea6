use skoop::cli::commands::{classify_source, diagnose, resolve};
use skoop::cli::{DiagnoseArgs, ResolveArgs};
use skoop::collector::SnapshotCollector;
use skoop::config::SkoopConfig;
use skoop::error::SkoopError;
use skoop::metrics::{ResolveOutcome, ResolverMetrics};
use skoop::model::{NetNodeType, NodeRef, Protocol};
use skoop::simulate::Outcome;
use std::io::Write;
use tempfile::NamedTempFile;

const SNAPSHOT: &str = r#"
pods:
  - pod: { namespace: shop, name: frontend, node_name: node-a, ips: [10.244.0.10] }
    routes:
      - { next_hop: { type: node, id: node-a }, interface: eth0, link_type: veth }
  - pod: { namespace: shop, name: cart, node_name: node-b, ips: [10.244.1.20] }
    routes:
      - { next_hop: { type: node, id: node-b }, interface: eth0, link_type: veth }
nodes:
  - name: node-a
    addresses: [172.16.0.1]
    routes:
      - { destination: 10.244.0.10/32, next_hop: { type: pod, id: 10.244.0.10 }, link_type: veth }
      - { destination: 10.244.1.0/24, next_hop: { type: node, id: node-b }, interface: flannel.1 }
    services:
      - { vip: 10.96.12.1, port: 80, backend: 10.244.1.20, backend_port: 8080 }
  - name: node-b
    addresses: [172.16.0.2]
    routes:
      - { destination: 10.244.1.20/32, next_hop: { type: pod, id: 10.244.1.20 }, link_type: veth }
      - { destination: 10.244.0.0/24, next_hop: { type: node, id: node-a }, interface: flannel.1 }
    filters:
      - { destination: 10.244.1.20/32, dport: 9090, verdict: drop, comment: metrics port closed }
"#;

fn snapshot_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(SNAPSHOT.as_bytes()).unwrap();
    file
}

fn diagnose_args(file: &NamedTempFile, src: &str, dst: &str, dport: u16) -> DiagnoseArgs {
    DiagnoseArgs {
        snapshot: file.path().to_path_buf(),
        src: src.parse().unwrap(),
        dst: dst.parse().unwrap(),
        dport,
        protocol: Protocol::Tcp,
        json: false,
        kube: false,
        metrics: false,
    }
}

#[tokio::test]
async fn test_diagnose_service_request_is_delivered() {
    let file = snapshot_file();
    let metrics = ResolverMetrics::new().unwrap();
    let diagnosis = diagnose(
        &diagnose_args(&file, "10.244.0.10", "10.96.12.1", 80),
        &SkoopConfig::default(),
        Some(metrics.clone()),
    )
    .await
    .unwrap();

    assert_eq!(
        diagnosis.outcome,
        Outcome::Delivered {
            at: NodeRef::new(NetNodeType::Pod, "10.244.1.20")
        }
    );
    assert_eq!(diagnosis.hops.last().unwrap().packet.dport, 8080);
    // node-a is visited twice but resolved once
    assert_eq!(metrics.requests(ResolveOutcome::Miss), 4);
    assert_eq!(metrics.requests(ResolveOutcome::Hit), 1);
}

#[tokio::test]
async fn test_diagnose_reports_filter_drop() {
    let file = snapshot_file();
    let diagnosis = diagnose(
        &diagnose_args(&file, "10.244.0.10", "10.244.1.20", 9090),
        &SkoopConfig::default(),
        None,
    )
    .await
    .unwrap();

    assert_eq!(
        diagnosis.outcome,
        Outcome::Dropped {
            at: NodeRef::new(NetNodeType::Node, "node-b"),
            reason: "metrics port closed".to_string()
        }
    );
}

#[tokio::test]
async fn test_diagnose_from_node_address() {
    let file = snapshot_file();
    let diagnosis = diagnose(
        &diagnose_args(&file, "172.16.0.1", "10.244.1.20", 8080),
        &SkoopConfig::default(),
        None,
    )
    .await
    .unwrap();

    assert_eq!(diagnosis.hops[0].node, NodeRef::new(NetNodeType::Node, "node-a"));
    assert!(diagnosis.outcome.is_delivered());
}

#[tokio::test]
async fn test_diagnose_missing_snapshot() {
    let args = DiagnoseArgs {
        snapshot: "/nonexistent/topology.yaml".into(),
        ..diagnose_args(&snapshot_file(), "10.244.0.10", "10.244.1.20", 80)
    };
    let err = diagnose(&args, &SkoopConfig::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SkoopError::CollectorError(_)));
}

#[tokio::test]
async fn test_resolve_node_and_unknown_pod() {
    let file = snapshot_file();
    let node = resolve(&ResolveArgs {
        snapshot: file.path().to_path_buf(),
        node_type: NetNodeType::Node,
        id: "node-b".to_string(),
    })
    .await
    .unwrap();
    assert_eq!(node.to_string(), "node node-b");
    // local address, two routes and one filter
    assert_eq!(node.actions().len(), 4);

    let err = resolve(&ResolveArgs {
        snapshot: file.path().to_path_buf(),
        node_type: NetNodeType::Pod,
        id: "10.244.7.7".to_string(),
    })
    .await
    .unwrap_err();
    assert_eq!(err.to_string(), "k8s pod not found from ip 10.244.7.7");
}

#[test]
fn test_classify_source() {
    let collector = SnapshotCollector::parse(SNAPSHOT).unwrap();
    let cache = collector.ip_cache();

    assert_eq!(
        classify_source(&cache, &collector, "10.244.0.10".parse().unwrap()),
        NodeRef::new(NetNodeType::Pod, "10.244.0.10")
    );
    assert_eq!(
        classify_source(&cache, &collector, "172.16.0.2".parse().unwrap()),
        NodeRef::new(NetNodeType::Node, "node-b")
    );
    assert_eq!(
        classify_source(&cache, &collector, "203.0.113.9".parse().unwrap()),
        NodeRef::new(NetNodeType::Generic, "203.0.113.9")
    );
}

#[test]
fn test_error_messages() {
    let err = SkoopError::ConstructionFailed {
        node_type: NetNodeType::Pod,
        id: "10.244.0.10".to_string(),
        source: Box::new(SkoopError::PluginError("no routes".to_string())),
    };
    assert_eq!(
        err.to_string(),
        "error create pod 10.244.0.10: Network plugin error: no routes"
    );
}

#[test]
fn test_version_const() {
    assert!(!skoop::VERSION.is_empty());
}
