//! Network plugin seam
//!
//! A plugin turns collected state into node behavior. Each CNI has its own;
//! [`RoutePlugin`] reads routes, filters and service rules straight from
//! the snapshot.

pub mod route;

pub use route::RoutePlugin;

use crate::collector::{NodeSnapshot, PodSnapshot};
use crate::model::NetNodeAction;
use crate::Result;

pub trait NetworkPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn create_pod(&self, pod: &PodSnapshot) -> Result<NetNodeAction>;

    fn create_node(&self, node: &NodeSnapshot) -> Result<NetNodeAction>;
}
