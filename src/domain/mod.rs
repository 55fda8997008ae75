// Domain layer: models, the ownership tree, manual overrides and ports.

pub mod model;
pub mod overrides;
pub mod ports;
pub mod tree;
