use serde::Serialize;
use std::fmt;

use crate::model::{Action, Link, NodeRef, Packet};

/// One node visited by the walk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hop {
    pub node: NodeRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<Link>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    /// Packet as it leaves this node
    pub packet: Packet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Delivered { at: NodeRef },
    Dropped { at: NodeRef, reason: String },
    Rejected { at: NodeRef, reason: String },
    /// The packet left the modeled topology through a placeholder node
    Exited { via: NodeRef },
    Looped { at: NodeRef },
    HopLimitExceeded { limit: usize },
    Failed { hop: NodeRef, cause: String },
}

impl Outcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Outcome::Delivered { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Delivered { at } => write!(f, "delivered at {}", at),
            Outcome::Dropped { at, reason } => write!(f, "dropped at {}: {}", at, reason),
            Outcome::Rejected { at, reason } => write!(f, "rejected at {}: {}", at, reason),
            Outcome::Exited { via } => write!(f, "left the cluster via {}", via),
            Outcome::Looped { at } => write!(f, "forwarding loop at {}", at),
            Outcome::HopLimitExceeded { limit } => write!(f, "gave up after {} hops", limit),
            Outcome::Failed { hop, cause } => write!(f, "failed to resolve {}: {}", hop, cause),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnosis {
    pub packet: Packet,
    pub hops: Vec<Hop>,
    pub outcome: Outcome,
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.packet)?;
        for (i, hop) in self.hops.iter().enumerate() {
            write!(f, "{:>3}. {}", i + 1, hop.node)?;
            if let Some(action) = &hop.action {
                write!(f, "  {}", action)?;
            }
            if let Some(link) = &hop.link {
                write!(f, "  via {}", link)?;
            }
            writeln!(f)?;
        }
        write!(f, "Result: {}", self.outcome)
    }
}
