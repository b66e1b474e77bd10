pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::dmi::DmiClient;
pub use config::{local::LocalStorage, s3::S3Storage, IngestConfig};
pub use core::{etl::EtlEngine, pipeline::ForecastPipeline};
pub use utils::error::{IngestError, Result};
