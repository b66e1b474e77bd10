use crate::domain::model::{BoundingBox, Collection, Payload, TransformResult};
use crate::utils::error::Result;
use async_trait::async_trait;

/// Destination for forecast slices and manifests. Paths are relative keys
/// such as `data/dmi/forecasts/dkss_if/sea-mean-deviation/forecasts.json`.
pub trait Storage: Send + Sync {
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Removes everything below `prefix`. Returns the number of deleted objects;
    /// a prefix that does not exist is not an error.
    fn delete_prefix(&self, prefix: &str)
        -> impl std::future::Future<Output = Result<usize>> + Send;

    fn public_url(&self, path: &str) -> String;
}

pub trait ConfigProvider: Send + Sync {
    fn collection(&self) -> &Collection;
    fn bbox(&self) -> &BoundingBox;
    fn parameters(&self) -> &[String];
    fn base_path(&self) -> &str;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self, parameter: &str) -> Result<Payload>;
    async fn transform(&self, parameter: &str, payload: Payload) -> Result<TransformResult>;
    async fn load(&self, result: TransformResult) -> Result<String>;
}

