// Domain layer: forecast models and ports (interfaces) shared by adapters and the engine.

pub mod model;
pub mod ports;
