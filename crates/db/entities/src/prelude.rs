pub use super::kubernetes_provider::Entity as KubernetesProvider;
pub use super::kubernetes_resource::Entity as KubernetesResource;
