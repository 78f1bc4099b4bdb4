use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KubeError {
    #[error("provider {0} not found")]
    ProviderNotFound(String),

    #[error("invalid provider config: {0}")]
    Config(String),

    #[error("Kubernetes API error: {0}")]
    Kubernetes(#[from] kube::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),

    #[error("discovery error: {0}")]
    Discovery(String),

    #[error("no API resource found for kind {0}")]
    UnknownKind(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("store error: {0:#}")]
    Store(anyhow::Error),
}

pub type Result<T> = std::result::Result<T, KubeError>;
