use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Pod that owns an address, as known to the endpoint locator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodRef {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub node_name: Option<String>,
    #[serde(default)]
    pub ips: Vec<IpAddr>,
    #[serde(default)]
    pub host_network: bool,
}

impl PodRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            uid: String::new(),
            node_name: None,
            ips: Vec::new(),
            host_network: false,
        }
    }

    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ips.push(ip);
        self
    }

    pub fn primary_ip(&self) -> Option<IpAddr> {
        self.ips.first().copied()
    }

    pub fn from_k8s_pod(pod: &k8s_openapi::api::core::v1::Pod) -> Self {
        let metadata = &pod.metadata;
        let spec = pod.spec.as_ref();
        let status = pod.status.as_ref();

        let mut ips: Vec<IpAddr> = status
            .and_then(|s| s.pod_ips.as_ref())
            .map(|list| list.iter().filter_map(|p| p.ip.as_deref()?.parse().ok()).collect())
            .unwrap_or_default();

        if let Some(ip) = status
            .and_then(|s| s.pod_ip.as_deref())
            .and_then(|ip| ip.parse::<IpAddr>().ok())
        {
            if !ips.contains(&ip) {
                ips.insert(0, ip);
            }
        }

        Self {
            namespace: metadata.namespace.clone().unwrap_or_default(),
            name: metadata.name.clone().unwrap_or_default(),
            uid: metadata.uid.clone().unwrap_or_default(),
            node_name: spec.and_then(|s| s.node_name.clone()),
            ips,
            host_network: spec.and_then(|s| s.host_network).unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Pod, PodIP, PodSpec, PodStatus};
    use kube::api::ObjectMeta;

    #[test]
    fn test_from_k8s_pod_collects_ips() {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("nginx".to_string()),
                namespace: Some("default".to_string()),
                uid: Some("uid-1".to_string()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: Some("worker-1".to_string()),
                ..Default::default()
            }),
            status: Some(PodStatus {
                pod_ip: Some("10.244.1.5".to_string()),
                pod_ips: Some(vec![
                    PodIP {
                        ip: Some("10.244.1.5".to_string()),
                    },
                    PodIP {
                        ip: Some("fd00::5".to_string()),
                    },
                ]),
                ..Default::default()
            }),
        };

        let pod_ref = PodRef::from_k8s_pod(&pod);
        assert_eq!(pod_ref.name, "nginx");
        assert_eq!(pod_ref.node_name.as_deref(), Some("worker-1"));
        assert_eq!(pod_ref.ips.len(), 2);
        assert_eq!(pod_ref.primary_ip(), Some("10.244.1.5".parse().unwrap()));
        assert!(!pod_ref.host_network);
    }
}
