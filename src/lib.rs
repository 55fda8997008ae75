pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::CaseConfig;

pub use adapters::{AresGateway, LocalStorage, RegistrySettings};
pub use crate::core::{
    classifier::{classify, merge_persons, AdjustmentState, UboResult},
    engine::UboEngine,
    pipeline::{Assessment, UboPipeline},
    resolver::resolve,
};
pub use domain::tree::{OwnershipTree, Resolution};
pub use utils::error::{Result, UboError};
