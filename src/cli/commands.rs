use std::net::IpAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cli::{Commands, DiagnoseArgs, ResolveArgs};
use crate::collector::SnapshotCollector;
use crate::config::SkoopConfig;
use crate::k8s::{IpCache, K8sClient, PodWatcher};
use crate::metrics::ResolverMetrics;
use crate::model::{NetNodeAction, NetNodeType, NodeRef, Packet};
use crate::nodemanager::{DefaultNetNodeManager, NetNodeManager};
use crate::plugin::RoutePlugin;
use crate::simulate::{Diagnosis, PathWalker};
use crate::Result;

/// Exit status for a diagnosis that did not reach its destination
pub const EXIT_UNREACHABLE: i32 = 2;

/// Runs `command` and returns the process exit status.
pub async fn handle_command(command: Commands, config: &SkoopConfig) -> Result<i32> {
    match command {
        Commands::Diagnose(args) => handle_diagnose(args, config).await,
        Commands::Resolve(args) => handle_resolve(args).await,
    }
}

async fn handle_diagnose(args: DiagnoseArgs, config: &SkoopConfig) -> Result<i32> {
    let metrics = ResolverMetrics::new()?;
    let diagnosis = diagnose(&args, config, Some(metrics.clone())).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&diagnosis)?);
    } else {
        println!("{}", diagnosis);
    }
    if args.metrics {
        print!("{}", metrics.gather_text()?);
    }

    Ok(if diagnosis.outcome.is_delivered() {
        0
    } else {
        EXIT_UNREACHABLE
    })
}

async fn handle_resolve(args: ResolveArgs) -> Result<i32> {
    let node = resolve(&args).await?;
    println!("{}", node);

    let mut links: Vec<String> = node
        .actions()
        .iter()
        .map(|(link, action)| format!("  {}  =>  {}", link, action))
        .collect();
    links.sort();
    for line in links {
        println!("{}", line);
    }
    Ok(0)
}

/// Walk the packet described by `args` through the snapshot's topology.
pub async fn diagnose(
    args: &DiagnoseArgs,
    config: &SkoopConfig,
    metrics: Option<ResolverMetrics>,
) -> Result<Diagnosis> {
    let collector = Arc::new(SnapshotCollector::from_file(&args.snapshot).await?);

    let (ip_cache, watch) = if args.kube {
        let (cache, handle) = live_ip_cache().await?;
        (cache, Some(handle))
    } else {
        (collector.ip_cache(), None)
    };

    let source = classify_source(&ip_cache, &collector, args.src);
    let packet = Packet {
        src: args.src,
        dst: args.dst,
        dport: args.dport,
        protocol: args.protocol,
    };

    let mut manager =
        DefaultNetNodeManager::new(Arc::new(ip_cache), collector, Arc::new(RoutePlugin::new()));
    if let Some(metrics) = metrics {
        manager = manager.with_metrics(metrics);
    }

    let walker = PathWalker::new(Arc::new(manager), &config.diagnose);
    let diagnosis = walker.walk(source, packet).await;

    if let Some(handle) = watch {
        handle.abort();
    }
    Ok(diagnosis)
}

/// Resolve the single node named by `args` from the snapshot.
pub async fn resolve(args: &ResolveArgs) -> Result<Arc<NetNodeAction>> {
    let collector = Arc::new(SnapshotCollector::from_file(&args.snapshot).await?);
    let manager = DefaultNetNodeManager::new(
        Arc::new(collector.ip_cache()),
        collector,
        Arc::new(RoutePlugin::new()),
    );
    manager.get_net_node_from_id(args.node_type, &args.id).await
}

/// Pod addresses start at the pod, node addresses at the node, anything
/// else at a generic placeholder.
pub fn classify_source(ip_cache: &IpCache, collector: &SnapshotCollector, ip: IpAddr) -> NodeRef {
    if ip_cache.get_pod_from_ip(&ip).is_some() {
        return NodeRef::new(NetNodeType::Pod, ip.to_string());
    }
    match collector.node_for_address(&ip) {
        Some(name) => NodeRef::new(NetNodeType::Node, name),
        None => NodeRef::new(NetNodeType::Generic, ip.to_string()),
    }
}

async fn live_ip_cache() -> Result<(IpCache, JoinHandle<()>)> {
    let client = K8sClient::try_default().await?;
    let cache = IpCache::new();
    let pods = client.list_pod_refs().await?;
    cache.reset(&pods);
    info!("Indexed {} pod addresses from the cluster", cache.len());

    let watcher = PodWatcher::new(client.pods_all(), cache.clone());
    let handle = tokio::spawn(async move {
        if let Err(e) = watcher.run().await {
            warn!("Pod watcher stopped: {}", e);
        }
    });
    Ok((cache, handle))
}
