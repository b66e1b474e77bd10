use crate::adapters::dmi::DmiClient;
use crate::adapters::geotiff::encode_geotiff;
use crate::adapters::netcdf_parser::decode_cube;
use crate::core::reproject::Regridder;
use crate::core::{ConfigProvider, Pipeline, Storage};
use crate::domain::model::{
    time_key, ForecastManifest, ForecastSlice, GridCrs, Payload, TransformResult,
};
use crate::utils::error::{IngestError, Result};

pub const MANIFEST_FILE: &str = "forecasts.json";
const PROGRESS_EVERY: usize = 10;

/// Key prefix that holds every slice of one parameter.
pub fn object_prefix(base_path: &str, collection: &str, parameter: &str) -> String {
    [base_path, collection, parameter]
        .iter()
        .map(|part| part.trim_matches('/'))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Decodes a NetCDF payload, regrids it and encodes one GeoTIFF per forecast time.
pub fn build_slices(payload: &[u8], parameter: &str, crs: GridCrs) -> Result<Vec<ForecastSlice>> {
    let cube = decode_cube(payload, parameter, crs)?;
    if cube.times.is_empty() {
        return Err(IngestError::invalid_data(format!(
            "Payload for {} holds no forecast times",
            parameter
        )));
    }
    tracing::debug!(
        "Decoded {} forecast times on a {}x{} {:?} grid",
        cube.times.len(),
        cube.width(),
        cube.height(),
        cube.crs
    );

    let regridder = Regridder::for_cube(&cube)?;
    cube.times
        .iter()
        .enumerate()
        .map(|(index, time)| {
            let raster = regridder.apply(cube.slice(index));
            Ok(ForecastSlice {
                time_key: time_key(time),
                data: encode_geotiff(&raster)?,
            })
        })
        .collect()
}

pub struct ForecastPipeline<S: Storage, C: ConfigProvider> {
    storage: S,
    config: C,
    client: DmiClient,
}

impl<S: Storage, C: ConfigProvider> ForecastPipeline<S, C> {
    pub fn new(storage: S, config: C, client: DmiClient) -> Self {
        Self {
            storage,
            config,
            client,
        }
    }

    fn prefix(&self, parameter: &str) -> String {
        object_prefix(
            self.config.base_path(),
            self.config.collection().id(),
            parameter,
        )
    }
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider> Pipeline for ForecastPipeline<S, C> {
    async fn extract(&self, parameter: &str) -> Result<Payload> {
        tracing::info!(
            "Request data from DMI API for '{}' / '{}'",
            self.config.collection(),
            parameter
        );
        self.client
            .fetch_cube(self.config.collection(), parameter, self.config.bbox())
            .await
    }

    async fn transform(&self, parameter: &str, payload: Payload) -> Result<TransformResult> {
        let crs = if self.config.collection().is_lambert() {
            GridCrs::DmiLambert
        } else {
            GridCrs::Geographic
        };
        tracing::info!("Transform NetCDF ({} bytes) into GeoTIFF slices", payload.len());

        // 解碼與編碼皆為 CPU 密集工作
        let name = parameter.to_string();
        let slices =
            tokio::task::spawn_blocking(move || build_slices(&payload, &name, crs)).await??;

        Ok(TransformResult {
            parameter: parameter.to_string(),
            slices,
        })
    }

    async fn load(&self, result: TransformResult) -> Result<String> {
        let prefix = self.prefix(&result.parameter);

        let deleted = self.storage.delete_prefix(&prefix).await?;
        tracing::debug!("Deleted {} outdated objects under {}", deleted, prefix);

        let total = result.slices.len();
        let mut manifest = ForecastManifest::default();
        for (index, slice) in result.slices.iter().enumerate() {
            let path = format!("{}/{}", prefix, slice.file_name());
            self.storage.write_file(&path, &slice.data).await?;
            manifest
                .forecasts
                .insert(slice.time_key.clone(), self.storage.public_url(&path));

            if index % PROGRESS_EVERY == 0 {
                tracing::info!("Uploaded {} of {} files.", index + 1, total);
            }
        }

        let manifest_path = format!("{}/{}", prefix, MANIFEST_FILE);
        let manifest_json = serde_json::to_vec_pretty(&manifest)?;
        self.storage
            .write_file(&manifest_path, &manifest_json)
            .await?;

        Ok(self.storage.public_url(&manifest_path))
    }
}
