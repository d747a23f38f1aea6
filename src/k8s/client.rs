use crate::{Result, SkoopError};
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client};
use tracing::{debug, info};

use super::PodRef;

pub struct K8sClient {
    client: Client,
}

impl K8sClient {
    pub async fn try_default() -> Result<Self> {
        debug!("Initializing Kubernetes client");

        let client = Client::try_default().await.map_err(|e| {
            SkoopError::KubernetesError(format!("Failed to create K8s client: {}", e))
        })?;

        info!("Connected to Kubernetes cluster");

        Ok(Self { client })
    }

    pub fn pods_all(&self) -> Api<Pod> {
        Api::all(self.client.clone())
    }

    /// Every pod in the cluster, reduced to what the endpoint locator needs
    pub async fn list_pod_refs(&self) -> Result<Vec<PodRef>> {
        let pod_list = self
            .pods_all()
            .list(&Default::default())
            .await
            .map_err(|e| SkoopError::KubernetesError(format!("Failed to list pods: {}", e)))?;

        Ok(pod_list.items.iter().map(PodRef::from_k8s_pod).collect())
    }
}
