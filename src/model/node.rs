use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

use super::{NetNodeType, NodeRef, Packet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    Veth,
    Route,
    Local,
    Filter,
    Service,
    External,
}

/// Directed edge from a node toward a possible next hop
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Link {
    pub link_type: LinkType,
    pub destination: NodeRef,
    /// Destinations this link carries; `None` is a default route
    pub dst_cidr: Option<IpNetwork>,
    pub dport: Option<u16>,
    pub interface: Option<String>,
}

impl Link {
    pub fn new(link_type: LinkType, destination: NodeRef) -> Self {
        Self {
            link_type,
            destination,
            dst_cidr: None,
            dport: None,
            interface: None,
        }
    }

    pub fn with_cidr(mut self, cidr: IpNetwork) -> Self {
        self.dst_cidr = Some(cidr);
        self
    }

    pub fn with_dport(mut self, dport: u16) -> Self {
        self.dport = Some(dport);
        self
    }

    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    pub fn matches(&self, packet: &Packet) -> bool {
        let cidr_ok = self
            .dst_cidr
            .map_or(true, |cidr| cidr.contains(packet.dst));
        let port_ok = self.dport.map_or(true, |port| port == packet.dport);
        cidr_ok && port_ok
    }

    /// Filter rules are evaluated before any forwarding decision. Within a
    /// kind, port-specific links beat port-agnostic ones, then longest prefix
    /// wins.
    fn specificity(&self) -> (bool, bool, u8) {
        (
            self.link_type == LinkType::Filter,
            self.dport.is_some(),
            self.dst_cidr.map_or(0, |cidr| cidr.prefix()),
        )
    }

    /// Total order over every field, used to break specificity ties.
    fn sort_key(&self) -> impl Ord + '_ {
        (
            self.link_type,
            self.destination.node_type.as_str(),
            self.destination.id.as_str(),
            self.dst_cidr.map(|cidr| (cidr.ip(), cidr.prefix())),
            self.dport,
            self.interface.as_deref(),
        )
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} -> {}", self.link_type, self.destination)?;
        if let Some(cidr) = self.dst_cidr {
            write!(f, " dst={}", cidr)?;
        }
        if let Some(port) = self.dport {
            write!(f, " dport={}", port)?;
        }
        if let Some(iface) = &self.interface {
            write!(f, " dev={}", iface)?;
        }
        Ok(())
    }
}

/// Packet-processing effect of traversing a link
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Action {
    Forward,
    Translate {
        src: Option<IpAddr>,
        dst: Option<IpAddr>,
        dport: Option<u16>,
    },
    Drop {
        reason: String,
    },
    Reject {
        reason: String,
    },
    Deliver,
}

impl Action {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Action::Drop { .. } | Action::Reject { .. } | Action::Deliver
        )
    }

    /// Apply address/port rewriting to `packet`.
    pub fn apply(&self, packet: &Packet) -> Packet {
        let mut out = *packet;
        if let Action::Translate { src, dst, dport } = self {
            if let Some(src) = src {
                out.src = *src;
            }
            if let Some(dst) = dst {
                out.dst = *dst;
            }
            if let Some(dport) = dport {
                out.dport = *dport;
            }
        }
        out
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Forward => write!(f, "forward"),
            Action::Translate { src, dst, dport } => {
                write!(f, "translate")?;
                if let Some(src) = src {
                    write!(f, " src={}", src)?;
                }
                if let Some(dst) = dst {
                    write!(f, " dst={}", dst)?;
                }
                if let Some(dport) = dport {
                    write!(f, " dport={}", dport)?;
                }
                Ok(())
            }
            Action::Drop { reason } => write!(f, "drop ({})", reason),
            Action::Reject { reason } => write!(f, "reject ({})", reason),
            Action::Deliver => write!(f, "deliver"),
        }
    }
}

/// Identity of a topology entity plus its outgoing links
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetNode {
    pub node_type: NetNodeType,
    pub id: String,
    pub actions: HashMap<Link, Action>,
}

impl NetNode {
    pub fn new(node_type: NetNodeType, id: impl Into<String>) -> Self {
        Self {
            node_type,
            id: id.into(),
            actions: HashMap::new(),
        }
    }

    pub fn node_ref(&self) -> NodeRef {
        NodeRef::new(self.node_type, self.id.clone())
    }

    /// Most specific link matching `packet`, with its action.
    ///
    /// Equally specific links are ordered on the whole link so the choice
    /// does not depend on map iteration order.
    pub fn next_hop(&self, packet: &Packet) -> Option<(&Link, &Action)> {
        self.actions
            .iter()
            .filter(|(link, _)| link.matches(packet))
            .max_by(|(a, _), (b, _)| {
                a.specificity()
                    .cmp(&b.specificity())
                    .then_with(|| b.sort_key().cmp(&a.sort_key()))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodNode {
    pub namespace: String,
    pub name: String,
    pub node_name: Option<String>,
    pub net_node: NetNode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostNode {
    pub name: String,
    pub net_node: NetNode,
}

/// Pass-through placeholder for addresses outside the modeled cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericNode {
    pub net_node: NetNode,
}

impl GenericNode {
    /// Generic node with no outgoing links
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            net_node: NetNode::new(NetNodeType::Generic, id),
        }
    }
}

/// A resolved hop. The set of kinds is fixed, so dispatch is by tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetNodeAction {
    Pod(PodNode),
    Host(HostNode),
    Generic(GenericNode),
}

impl NetNodeAction {
    pub fn net_node(&self) -> &NetNode {
        match self {
            NetNodeAction::Pod(pod) => &pod.net_node,
            NetNodeAction::Host(host) => &host.net_node,
            NetNodeAction::Generic(generic) => &generic.net_node,
        }
    }

    pub fn node_type(&self) -> NetNodeType {
        self.net_node().node_type
    }

    pub fn id(&self) -> &str {
        &self.net_node().id
    }

    pub fn actions(&self) -> &HashMap<Link, Action> {
        &self.net_node().actions
    }

    pub fn next_hop(&self, packet: &Packet) -> Option<(&Link, &Action)> {
        self.net_node().next_hop(packet)
    }
}

impl fmt::Display for NetNodeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetNodeAction::Pod(pod) => write!(
                f,
                "pod {}/{} ({})",
                pod.namespace, pod.name, pod.net_node.id
            ),
            NetNodeAction::Host(host) => write!(f, "node {}", host.name),
            NetNodeAction::Generic(generic) => write!(f, "generic {}", generic.net_node.id),
        }
    }
}
