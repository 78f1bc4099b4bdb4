pub mod client;
pub mod discovery;
pub mod error;
pub mod lister;
pub mod names;
pub mod reconciler;
pub mod transport_cache;
pub mod views;

#[cfg(test)]
mod testing;

pub use client::{ClusterClientFactory, ClusterConnector, ClusterHandle};
pub use discovery::{CachedDiscoveryClient, DiscoveryCache, DiscoveryInterface, ServerResources};
pub use error::KubeError;
pub use reconciler::{ReconcileOptions, ResourceReconciler};
