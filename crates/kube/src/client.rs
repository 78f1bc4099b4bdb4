use std::{collections::HashMap, sync::Arc};

use base64::{engine::general_purpose::STANDARD, Engine};
use kube::{client::ClientBuilder, config::AuthInfo};
use kubecd_common::ProviderConfig;
use parking_lot::Mutex;
use secrecy::ExposeSecret;

use crate::{
    discovery::{CachedDiscoveryClient, DiscoveryCache, DiscoveryInterface, LiveDiscovery},
    error::{KubeError, Result},
    lister::KindLister,
    transport_cache::{TransportCacheLayer, TransportCacheStore},
};

/// Everything a reconciliation pass needs from one cluster.
pub struct ClusterHandle<D, L> {
    pub discovery: CachedDiscoveryClient<D>,
    pub lister: Arc<L>,
    /// Set when the account is limited to one namespace.
    pub namespace: Option<String>,
}

/// Builds cluster clients for configured providers.
pub trait ClusterConnector: Send + Sync + 'static {
    type Discovery: DiscoveryInterface + 'static;
    type Lister: KindLister + 'static;

    fn connect(
        &self,
        provider: &ProviderConfig,
    ) -> Result<ClusterHandle<Self::Discovery, Self::Lister>>;
}

/// Builds kube clients wired to the shared discovery cache and to one
/// transport cache per cluster host.
pub struct ClusterClientFactory {
    discovery_cache: Arc<DiscoveryCache>,
    transport_caches: Mutex<HashMap<String, TransportCacheStore>>,
}

impl ClusterClientFactory {
    pub fn new(discovery_cache: Arc<DiscoveryCache>) -> Self {
        Self {
            discovery_cache,
            transport_caches: Mutex::new(HashMap::new()),
        }
    }

    fn transport_cache(&self, host: &str) -> TransportCacheStore {
        self.transport_caches
            .lock()
            .entry(host.to_string())
            .or_default()
            .clone()
    }

    pub fn kube_client(&self, provider: &ProviderConfig) -> Result<kube::Client> {
        let config = kube_config(provider)?;
        let layer = TransportCacheLayer::new(self.transport_cache(&provider.host));
        let client = ClientBuilder::try_from(config)?.with_layer(&layer).build();
        Ok(client)
    }
}

impl ClusterConnector for ClusterClientFactory {
    type Discovery = LiveDiscovery;
    type Lister = kube::Client;

    fn connect(&self, provider: &ProviderConfig) -> Result<ClusterHandle<LiveDiscovery, kube::Client>> {
        let client = self.kube_client(provider)?;
        let discovery = self
            .discovery_cache
            .client(&provider.host, LiveDiscovery::new(client.clone()));
        Ok(ClusterHandle {
            discovery,
            lister: Arc::new(client),
            namespace: provider.namespace.clone().filter(|ns| !ns.is_empty()),
        })
    }
}

/// The kube client config for a provider: its host, the CA bundle when
/// one is configured, and the bearer token.
pub fn kube_config(provider: &ProviderConfig) -> Result<kube::Config> {
    let cluster_url = provider.host.parse().map_err(|e| {
        KubeError::Config(format!(
            "invalid host {} for provider {}: {e}",
            provider.host, provider.name
        ))
    })?;
    let mut config = kube::Config::new(cluster_url);

    if !provider.ca_data.is_empty() {
        let pem_data = STANDARD.decode(provider.ca_data.trim()).map_err(|e| {
            KubeError::Config(format!(
                "CA data of provider {} is not valid base64: {e}",
                provider.name
            ))
        })?;
        let certs: Vec<Vec<u8>> = pem::parse_many(&pem_data)
            .map_err(|e| {
                KubeError::Config(format!(
                    "CA data of provider {} is not valid PEM: {e}",
                    provider.name
                ))
            })?
            .into_iter()
            .filter(|p| p.tag() == "CERTIFICATE")
            .map(|p| p.into_contents())
            .collect();
        if certs.is_empty() {
            return Err(KubeError::Config(format!(
                "CA data of provider {} contains no certificate",
                provider.name
            )));
        }
        config.root_cert = Some(certs);
    }

    if !provider.bearer_token.expose_secret().is_empty() {
        config.auth_info = AuthInfo {
            token: Some(provider.bearer_token.clone()),
            ..Default::default()
        };
    }
    config.default_namespace = provider
        .namespace
        .clone()
        .filter(|ns| !ns.is_empty())
        .unwrap_or_else(|| "default".to_string());

    Ok(config)
}
