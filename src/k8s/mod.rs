pub mod client;
pub mod ipcache;
pub mod types;
pub mod watcher;

pub use client::K8sClient;
pub use ipcache::IpCache;
pub use types::PodRef;
pub use watcher::PodWatcher;

use crate::Result;
use async_trait::async_trait;

/// Maps an observed address to the pod that owns it
#[async_trait]
pub trait EndpointLocator: Send + Sync {
    async fn lookup_pod_by_address(&self, ip: &str) -> Result<Option<PodRef>>;
}
