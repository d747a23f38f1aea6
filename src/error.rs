use crate::model::NetNodeType;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SkoopError {
    #[error("k8s pod not found from ip {id}")]
    NotFound { node_type: NetNodeType, id: String },

    #[error("error run collector for {node_type} {id}: {source}")]
    CollectionFailed {
        node_type: NetNodeType,
        id: String,
        #[source]
        source: Box<SkoopError>,
    },

    #[error("error create {node_type} {id}: {source}")]
    ConstructionFailed {
        node_type: NetNodeType,
        id: String,
        #[source]
        source: Box<SkoopError>,
    },

    #[error("Kubernetes error: {0}")]
    KubernetesError(String),

    #[error("Collector error: {0}")]
    CollectorError(String),

    #[error("Network plugin error: {0}")]
    PluginError(String),

    #[error("Timed out resolving {node_type} {id} after {secs}s")]
    Timeout {
        node_type: NetNodeType,
        id: String,
        secs: u64,
    },

    #[error("Metrics error: {0}")]
    MetricsError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SkoopError>;
