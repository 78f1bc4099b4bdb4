pub mod prelude;

pub mod kubernetes_provider;
pub mod kubernetes_resource;
