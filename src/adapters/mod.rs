// Adapters layer: concrete implementations of the domain ports.

pub mod registry;
pub mod storage;

pub use registry::{AresGateway, RegistrySettings};
pub use storage::LocalStorage;
