pub mod etl;
pub mod pipeline;
pub mod reproject;

pub use crate::domain::model::{ForecastCube, ForecastSlice, TransformResult};
pub use crate::domain::ports::{ConfigProvider, Pipeline, Storage};
pub use crate::utils::error::Result;
