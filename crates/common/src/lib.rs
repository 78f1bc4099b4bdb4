pub mod kube;
pub mod store;

pub use kube::{InfraKind, ProviderConfig, Resource};
pub use store::ResourceStore;
