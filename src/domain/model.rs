use crate::utils::error::{IngestError, Result};
use crate::utils::validation::validate_path_segment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Raw NetCDF bytes as returned by the DMI API.
pub type Payload = Vec<u8>;

/// DMI 資料集 (例如 `dkss_if` 海平面、`harmonie_dini_sf` 降水)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection(String);

impl Collection {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn id(&self) -> &str {
        &self.0
    }

    /// HARMONIE collections are served on the DMI Lambert conformal conic grid.
    pub fn is_lambert(&self) -> bool {
        self.0.starts_with("harmonie")
    }

    pub fn request_crs(&self) -> RequestCrs {
        if self.is_lambert() {
            RequestCrs::Native
        } else {
            RequestCrs::Crs84
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Collection {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        validate_path_segment("collection", s)?;
        Ok(Self::new(s.trim()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestCrs {
    Native,
    Crs84,
}

impl RequestCrs {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestCrs::Native => "native",
            RequestCrs::Crs84 => "crs84",
        }
    }
}

/// `min_x,min_y,max_x,max_y`，單位依 collection 的投影而定
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl FromStr for BoundingBox {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| IngestError::InvalidConfigValueError {
            field: "bbox".to_string(),
            value: s.to_string(),
            reason: reason.to_string(),
        };

        let values = s
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| invalid("Bounds must be numbers"))?;

        let [min_x, min_y, max_x, max_y] = values[..] else {
            return Err(invalid("Expected four comma-separated bounds"));
        };

        if values.iter().any(|v| !v.is_finite()) {
            return Err(invalid("Bounds must be finite"));
        }
        if min_x >= max_x || min_y >= max_y {
            return Err(invalid("Minimum bounds must be below maximum bounds"));
        }

        Ok(Self {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.min_x, self.min_y, self.max_x, self.max_y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridCrs {
    /// Longitude/latitude in degrees.
    Geographic,
    /// DMI HARMONIE DINI Lambert conformal conic, axes in metres.
    DmiLambert,
}

/// A decoded forecast: one 2-D field per forecast time.
#[derive(Debug, Clone)]
pub struct ForecastCube {
    pub parameter: String,
    pub times: Vec<DateTime<Utc>>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub crs: GridCrs,
    /// Values ordered `time`, `y`, `x`; missing data is NaN.
    pub values: Vec<f32>,
}

impl ForecastCube {
    pub fn width(&self) -> usize {
        self.x.len()
    }

    pub fn height(&self) -> usize {
        self.y.len()
    }

    pub fn slice(&self, index: usize) -> &[f32] {
        let size = self.width() * self.height();
        &self.values[index * size..(index + 1) * size]
    }

    pub fn check_shape(&self) -> Result<()> {
        let expected = self.times.len() * self.width() * self.height();
        if self.values.len() != expected {
            return Err(IngestError::invalid_data(format!(
                "{} values for {} times on a {}x{} grid",
                self.values.len(),
                self.times.len(),
                self.width(),
                self.height()
            )));
        }
        Ok(())
    }
}

/// A north-up EPSG:4326 raster.
#[derive(Debug, Clone)]
pub struct GeoRaster {
    pub width: usize,
    pub height: usize,
    /// Western edge of the first column, degrees.
    pub west: f64,
    /// Northern edge of the first row, degrees.
    pub north: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
    pub values: Vec<f32>,
}

/// One encoded time step ready for upload.
#[derive(Debug, Clone)]
pub struct ForecastSlice {
    pub time_key: String,
    pub data: Vec<u8>,
}

impl ForecastSlice {
    pub fn file_name(&self) -> String {
        format!("{}.tif", self.time_key)
    }
}

pub fn time_key(time: &DateTime<Utc>) -> String {
    time.format("%Y%m%dT%H%M%S").to_string()
}

#[derive(Debug, Clone)]
pub struct TransformResult {
    pub parameter: String,
    pub slices: Vec<ForecastSlice>,
}

/// `forecasts.json`: time key -> public URL of the slice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ForecastManifest {
    pub forecasts: BTreeMap<String, String>,
}
