pub mod aggregator;
pub mod classifier;
pub mod engine;
pub mod pipeline;
pub mod resolver;
pub mod share_parser;

pub use crate::domain::ports::{ConfigProvider, Pipeline, RegistryGateway, Storage};
pub use crate::utils::error::Result;
