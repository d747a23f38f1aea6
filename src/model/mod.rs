//! Diagnostic graph model
//!
//! A [`NetNodeAction`] is one resolved hop: its identity plus the
//! [`Link`] -> [`Action`] map the network plugin built for it.

pub mod node;
pub mod packet;

pub use node::{Action, GenericNode, HostNode, Link, LinkType, NetNode, NetNodeAction, PodNode};
pub use packet::{Packet, Protocol};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetNodeType {
    Pod,
    Node,
    Generic,
    External,
}

impl NetNodeType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            NetNodeType::Pod => "pod",
            NetNodeType::Node => "node",
            NetNodeType::Generic => "generic",
            NetNodeType::External => "external",
        }
    }
}

impl fmt::Display for NetNodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for NetNodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pod" => Ok(NetNodeType::Pod),
            "node" | "host" => Ok(NetNodeType::Node),
            "generic" => Ok(NetNodeType::Generic),
            "external" => Ok(NetNodeType::External),
            other => Err(format!("unknown node type: {}", other)),
        }
    }
}

/// Names a node without holding it; resolved lazily through a node manager
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    #[serde(rename = "type")]
    pub node_type: NetNodeType,
    pub id: String,
}

impl NodeRef {
    pub fn new(node_type: NetNodeType, id: impl Into<String>) -> Self {
        Self {
            node_type,
            id: id.into(),
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.node_type, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_round_trip_names() {
        for node_type in [
            NetNodeType::Pod,
            NetNodeType::Node,
            NetNodeType::Generic,
            NetNodeType::External,
        ] {
            assert_eq!(node_type.as_str().parse::<NetNodeType>(), Ok(node_type));
        }
        assert_eq!("Host".parse::<NetNodeType>(), Ok(NetNodeType::Node));
        assert!("switch".parse::<NetNodeType>().is_err());
    }
}
