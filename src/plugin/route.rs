use ipnetwork::IpNetwork;
use std::net::IpAddr;
use tracing::debug;

use super::NetworkPlugin;
use crate::collector::{FilterRule, NodeSnapshot, PodSnapshot, RouteEntry, ServiceRule, Verdict};
use crate::model::{
    Action, HostNode, Link, LinkType, NetNode, NetNodeAction, NetNodeType, PodNode,
};
use crate::{Result, SkoopError};

/// Builds nodes directly from the routes, filters and service rules in a snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoutePlugin;

impl RoutePlugin {
    pub fn new() -> Self {
        Self
    }
}

impl NetworkPlugin for RoutePlugin {
    fn name(&self) -> &str {
        "route"
    }

    fn create_pod(&self, pod: &PodSnapshot) -> Result<NetNodeAction> {
        let ip = pod.pod.primary_ip().ok_or_else(|| {
            SkoopError::PluginError(format!(
                "pod {}/{} has no address",
                pod.pod.namespace, pod.pod.name
            ))
        })?;

        let mut node = NetNode::new(NetNodeType::Pod, ip.to_string());
        let locals = pod
            .pod
            .ips
            .iter()
            .copied()
            .chain(pod.interfaces.iter().flat_map(|i| i.addresses.iter().map(|a| a.ip())));
        add_locals(&mut node, locals);
        add_routes(&mut node, &pod.routes, Some(ip));
        add_filters(&mut node, &pod.filters);

        debug!(
            "Built pod {}/{} with {} links",
            pod.pod.namespace,
            pod.pod.name,
            node.actions.len()
        );

        Ok(NetNodeAction::Pod(PodNode {
            namespace: pod.pod.namespace.clone(),
            name: pod.pod.name.clone(),
            node_name: pod.pod.node_name.clone(),
            net_node: node,
        }))
    }

    fn create_node(&self, host: &NodeSnapshot) -> Result<NetNodeAction> {
        let mut node = NetNode::new(NetNodeType::Node, host.name.clone());
        add_locals(&mut node, host.addresses.iter().copied());
        add_routes(&mut node, &host.routes, host.addresses.first().copied());
        add_services(&mut node, &host.services);
        add_filters(&mut node, &host.filters);

        debug!("Built node {} with {} links", host.name, node.actions.len());

        Ok(NetNodeAction::Host(HostNode {
            name: host.name.clone(),
            net_node: node,
        }))
    }
}

fn add_locals(node: &mut NetNode, addresses: impl Iterator<Item = IpAddr>) {
    let me = node.node_ref();
    for ip in addresses {
        let link = Link::new(LinkType::Local, me.clone()).with_cidr(IpNetwork::from(ip));
        node.actions.insert(link, Action::Deliver);
    }
}

fn add_routes(node: &mut NetNode, routes: &[RouteEntry], snat_source: Option<IpAddr>) {
    for route in routes {
        let mut link = Link::new(route.link_type, route.next_hop.clone());
        link.dst_cidr = route.destination;
        link.interface = route.interface.clone();

        let action = match (route.masquerade, snat_source) {
            (true, Some(src)) => Action::Translate {
                src: Some(src),
                dst: None,
                dport: None,
            },
            _ => Action::Forward,
        };
        node.actions.insert(link, action);
    }
}

fn add_services(node: &mut NetNode, services: &[ServiceRule]) {
    let me = node.node_ref();
    for service in services {
        let link = Link::new(LinkType::Service, me.clone())
            .with_cidr(IpNetwork::from(service.vip))
            .with_dport(service.port);
        node.actions.insert(
            link,
            Action::Translate {
                src: None,
                dst: Some(service.backend),
                dport: Some(service.backend_port),
            },
        );
    }
}

fn add_filters(node: &mut NetNode, filters: &[FilterRule]) {
    let me = node.node_ref();
    for filter in filters {
        let mut link = Link::new(LinkType::Filter, me.clone());
        link.dst_cidr = filter.destination;
        link.dport = filter.dport;

        let reason = if filter.comment.is_empty() {
            format!("filtered on {}", node.id)
        } else {
            filter.comment.clone()
        };
        let action = match filter.verdict {
            Verdict::Drop => Action::Drop { reason },
            Verdict::Reject => Action::Reject { reason },
        };
        node.actions.insert(link, action);
    }
}
