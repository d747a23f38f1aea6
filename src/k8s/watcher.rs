use crate::{Result, SkoopError};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::watcher::{self, Event};
use kube::Api;
use tracing::{debug, info};

use super::{IpCache, PodRef};

/// Keeps an [`IpCache`] in sync with the cluster's pods
pub struct PodWatcher {
    api: Api<Pod>,
    cache: IpCache,
}

impl PodWatcher {
    pub fn new(api: Api<Pod>, cache: IpCache) -> Self {
        Self { api, cache }
    }

    /// Runs until the watch stream ends; spawn it as a task.
    pub async fn run(&self) -> Result<()> {
        info!("Starting pod watcher");

        let mut stream = watcher::watcher(self.api.clone(), watcher::Config::default()).boxed();

        while let Some(event) = stream.next().await {
            match event {
                Ok(event) => apply_event(&self.cache, event),
                Err(e) => {
                    debug!("Watcher error: {}", e);
                }
            }
        }

        Err(SkoopError::KubernetesError(
            "pod watch stream ended".to_string(),
        ))
    }
}

fn apply_event(cache: &IpCache, event: Event<Pod>) {
    match event {
        Event::Applied(pod) => cache.upsert(&PodRef::from_k8s_pod(&pod)),
        Event::Deleted(pod) => cache.remove(&PodRef::from_k8s_pod(&pod)),
        Event::Restarted(pods) => {
            let refs: Vec<PodRef> = pods.iter().map(PodRef::from_k8s_pod).collect();
            cache.reset(&refs);
            debug!("Pod watch restarted with {} pods", refs.len());
        }
    }
}
