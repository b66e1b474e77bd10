//! Regridding of forecast cubes onto north-up EPSG:4326 rasters.
//!
//! HARMONIE collections come on the DMI DINI Lambert conformal conic grid
//! (spherical earth, tangent cone at 55.5°N, central meridian 8°W). Those are
//! resampled nearest-neighbour onto a regular lat/lon grid with the same
//! number of rows and columns. Geographic cubes only get their rows flipped
//! when latitudes ascend.

use crate::domain::model::{ForecastCube, GeoRaster, GridCrs};
use crate::utils::error::{IngestError, Result};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

/// Lambert conformal conic on a sphere, projected coordinates in metres.
#[derive(Debug, Clone)]
pub struct LambertConformal {
    earth_radius: f64,
    lon0: f64,
    n: f64,
    f: f64,
    rho0: f64,
}

impl LambertConformal {
    pub fn new(
        lat0_deg: f64,
        lon0_deg: f64,
        latin1_deg: f64,
        latin2_deg: f64,
        earth_radius: f64,
    ) -> Self {
        let lat0 = lat0_deg.to_radians();
        let latin1 = latin1_deg.to_radians();
        let latin2 = latin2_deg.to_radians();

        let n = if (latin1 - latin2).abs() < 1e-10 {
            latin1.sin()
        } else {
            (latin1.cos() / latin2.cos()).ln()
                / ((FRAC_PI_4 + latin2 / 2.0).tan() / (FRAC_PI_4 + latin1 / 2.0).tan()).ln()
        };
        let f = latin1.cos() * (FRAC_PI_4 + latin1 / 2.0).tan().powf(n) / n;
        let rho0 = earth_radius * f / (FRAC_PI_4 + lat0 / 2.0).tan().powf(n);

        Self {
            earth_radius,
            lon0: lon0_deg.to_radians(),
            n,
            f,
            rho0,
        }
    }

    /// DMI HARMONIE DINI grid definition.
    pub fn dmi_dini() -> Self {
        Self::new(55.5, -8.0, 55.5, 55.5, 6_371_229.0)
    }

    /// Geographic (degrees) to projected (metres).
    pub fn forward(&self, lat_deg: f64, lon_deg: f64) -> (f64, f64) {
        let lat = lat_deg.to_radians();
        let mut dlon = lon_deg.to_radians() - self.lon0;
        while dlon > PI {
            dlon -= 2.0 * PI;
        }
        while dlon < -PI {
            dlon += 2.0 * PI;
        }

        let rho = self.earth_radius * self.f / (FRAC_PI_4 + lat / 2.0).tan().powf(self.n);
        let theta = self.n * dlon;
        (rho * theta.sin(), self.rho0 - rho * theta.cos())
    }

    /// Projected (metres) to geographic (degrees), returned as `(lat, lon)`.
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let dy = self.rho0 - y;
        let sign = self.n.signum();
        let rho = sign * x.hypot(dy);
        let theta = (sign * x).atan2(sign * dy);

        let lat = 2.0 * (self.earth_radius * self.f / rho).powf(1.0 / self.n).atan() - FRAC_PI_2;
        let lon = self.lon0 + theta / self.n;
        (lat.to_degrees(), lon.to_degrees())
    }
}

/// Precomputed mapping from output raster pixels to source cell indices.
/// The same plan applies to every time step of a cube.
#[derive(Debug, Clone)]
pub struct Regridder {
    width: usize,
    height: usize,
    west: f64,
    north: f64,
    pixel_width: f64,
    pixel_height: f64,
    lookup: Vec<Option<usize>>,
}

fn axis_spacing(name: &str, axis: &[f64]) -> Result<Option<f64>> {
    if axis.iter().any(|v| !v.is_finite()) {
        return Err(IngestError::invalid_data(format!(
            "{} axis holds non-finite coordinates",
            name
        )));
    }
    match axis {
        [] => Err(IngestError::invalid_data(format!("{} axis is empty", name))),
        [_] => Ok(None),
        [first, .., last] => {
            let step = (last - first) / (axis.len() - 1) as f64;
            if step == 0.0 {
                return Err(IngestError::invalid_data(format!(
                    "{} axis has zero spacing",
                    name
                )));
            }
            Ok(Some(step))
        }
    }
}

impl Regridder {
    pub fn for_cube(cube: &ForecastCube) -> Result<Self> {
        match cube.crs {
            GridCrs::Geographic => Self::geographic(&cube.x, &cube.y),
            GridCrs::DmiLambert => Self::lambert(&cube.x, &cube.y, &LambertConformal::dmi_dini()),
        }
    }

    pub fn geographic(lon: &[f64], lat: &[f64]) -> Result<Self> {
        let dx = axis_spacing("longitude", lon)?;
        let dy = axis_spacing("latitude", lat)?;
        // 單點軸沿用另一軸的解析度
        let (dx, dy) = match (dx, dy) {
            (Some(dx), Some(dy)) => (dx, dy),
            (Some(dx), None) => (dx, dx.abs()),
            (None, Some(dy)) => (dy.abs(), dy),
            (None, None) => {
                return Err(IngestError::invalid_data(
                    "Cannot infer resolution of a single-cell grid",
                ))
            }
        };

        let (nx, ny) = (lon.len(), lat.len());
        let pixel_width = dx.abs();
        let pixel_height = dy.abs();
        let west = lon.iter().copied().fold(f64::INFINITY, f64::min) - pixel_width / 2.0;
        let north = lat.iter().copied().fold(f64::NEG_INFINITY, f64::max) + pixel_height / 2.0;

        let mut lookup = Vec::with_capacity(nx * ny);
        for row in 0..ny {
            let src_row = if dy > 0.0 { ny - 1 - row } else { row };
            for col in 0..nx {
                let src_col = if dx > 0.0 { col } else { nx - 1 - col };
                lookup.push(Some(src_row * nx + src_col));
            }
        }

        Ok(Self {
            width: nx,
            height: ny,
            west,
            north,
            pixel_width,
            pixel_height,
            lookup,
        })
    }

    pub fn lambert(x: &[f64], y: &[f64], projection: &LambertConformal) -> Result<Self> {
        let (Some(dx), Some(dy)) = (axis_spacing("x", x)?, axis_spacing("y", y)?) else {
            return Err(IngestError::invalid_data(
                "Lambert grids need at least two cells per axis",
            ));
        };
        let (nx, ny) = (x.len(), y.len());

        // 沿外緣 (格心 ± 半格) 取樣求出地理範圍
        let edge_x = |i: usize| x[0] - dx / 2.0 + i as f64 * dx;
        let edge_y = |j: usize| y[0] - dy / 2.0 + j as f64 * dy;
        let mut min_lat = f64::INFINITY;
        let mut max_lat = f64::NEG_INFINITY;
        let mut min_lon = f64::INFINITY;
        let mut max_lon = f64::NEG_INFINITY;
        let edges = (0..=nx)
            .flat_map(|i| [(i, 0), (i, ny)])
            .chain((0..=ny).flat_map(|j| [(0, j), (nx, j)]));
        for (i, j) in edges {
            let (lat, lon) = projection.inverse(edge_x(i), edge_y(j));
            min_lat = min_lat.min(lat);
            max_lat = max_lat.max(lat);
            min_lon = min_lon.min(lon);
            max_lon = max_lon.max(lon);
        }

        let pixel_width = (max_lon - min_lon) / nx as f64;
        let pixel_height = (max_lat - min_lat) / ny as f64;
        let (x0, y0) = (x[0], y[0]);

        let mut lookup = Vec::with_capacity(nx * ny);
        for row in 0..ny {
            let lat = max_lat - (row as f64 + 0.5) * pixel_height;
            for col in 0..nx {
                let lon = min_lon + (col as f64 + 0.5) * pixel_width;
                let (px, py) = projection.forward(lat, lon);
                let i = ((px - x0) / dx).round();
                let j = ((py - y0) / dy).round();
                let inside = i >= 0.0 && j >= 0.0 && i < nx as f64 && j < ny as f64;
                lookup.push(inside.then(|| j as usize * nx + i as usize));
            }
        }

        Ok(Self {
            width: nx,
            height: ny,
            west: min_lon,
            north: max_lat,
            pixel_width,
            pixel_height,
            lookup,
        })
    }

    pub fn apply(&self, slice: &[f32]) -> GeoRaster {
        let values = self
            .lookup
            .iter()
            .map(|index| index.and_then(|i| slice.get(i).copied()).unwrap_or(f32::NAN))
            .collect();

        GeoRaster {
            width: self.width,
            height: self.height,
            west: self.west,
            north: self.north,
            pixel_width: self.pixel_width,
            pixel_height: self.pixel_height,
            values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dmi_origin_maps_to_zero() {
        let proj = LambertConformal::dmi_dini();
        let (x, y) = proj.forward(55.5, -8.0);
        assert!(x.abs() < 1e-6, "x should be ~0, got {}", x);
        assert!(y.abs() < 1e-6, "y should be ~0, got {}", y);
    }

    #[test]
    fn test_dmi_roundtrip() {
        let proj = LambertConformal::dmi_dini();
        for (lat, lon) in [(55.7, 12.6), (40.0, -20.0), (70.0, 25.0)] {
            let (x, y) = proj.forward(lat, lon);
            let (lat2, lon2) = proj.inverse(x, y);
            assert!((lat - lat2).abs() < 1e-8, "lat roundtrip {} vs {}", lat, lat2);
            assert!((lon - lon2).abs() < 1e-8, "lon roundtrip {} vs {}", lon, lon2);
        }
    }

    #[test]
    fn test_copenhagen_is_east_of_origin() {
        let proj = LambertConformal::dmi_dini();
        let (x, y) = proj.forward(55.68, 12.57);
        // ~1290 km east of the central meridian on a 6371 km sphere
        assert!(x > 1_200_000.0 && x < 1_400_000.0, "x = {}", x);
        assert!(y > 0.0, "y = {}", y);
    }

    #[test]
    fn test_geographic_ascending_latitudes_are_flipped() {
        let lon = [10.0, 11.0, 12.0];
        let lat = [55.0, 56.0];
        let regridder = Regridder::geographic(&lon, &lat).unwrap();
        // 南列在前的來源資料
        let slice = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let raster = regridder.apply(&slice);

        assert_eq!(raster.values, vec![4.0, 5.0, 6.0, 1.0, 2.0, 3.0]);
        assert_eq!(raster.west, 9.5);
        assert_eq!(raster.north, 56.5);
        assert_eq!(raster.pixel_width, 1.0);
        assert_eq!(raster.pixel_height, 1.0);
    }

    #[test]
    fn test_geographic_descending_latitudes_keep_order() {
        let regridder = Regridder::geographic(&[0.0, 0.5], &[60.0, 59.5]).unwrap();
        let raster = regridder.apply(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(raster.values, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(raster.north, 60.25);
    }

    #[test]
    fn test_single_row_uses_column_spacing() {
        let regridder = Regridder::geographic(&[0.0, 0.25, 0.5], &[55.0]).unwrap();
        let raster = regridder.apply(&[1.0, 2.0, 3.0]);
        assert_eq!(raster.height, 1);
        assert_eq!(raster.pixel_height, 0.25);

        assert!(Regridder::geographic(&[0.0], &[55.0]).is_err());
    }

    #[test]
    fn test_lambert_regrid_samples_nearest_cell() {
        let proj = LambertConformal::dmi_dini();
        // 以哥本哈根為中心、間距 10 km 的 21x21 網格
        let (cx, cy) = proj.forward(55.68, 12.57);
        let x: Vec<f64> = (0..21).map(|i| cx + (i as f64 - 10.0) * 10_000.0).collect();
        let y: Vec<f64> = (0..21).map(|j| cy + (j as f64 - 10.0) * 10_000.0).collect();
        // 每格的值為其 x 座標 (km)
        let slice: Vec<f32> = (0..21)
            .flat_map(|_| x.iter().map(|v| (*v / 1000.0) as f32))
            .collect();

        let regridder = Regridder::lambert(&x, &y, &proj).unwrap();
        let raster = regridder.apply(&slice);
        assert_eq!((raster.width, raster.height), (21, 21));

        let mut valid = 0;
        for row in 0..raster.height {
            for col in 0..raster.width {
                let value = raster.values[row * raster.width + col];
                if value.is_nan() {
                    continue;
                }
                valid += 1;
                let lat = raster.north - (row as f64 + 0.5) * raster.pixel_height;
                let lon = raster.west + (col as f64 + 0.5) * raster.pixel_width;
                let (px, _) = proj.forward(lat, lon);
                assert!(
                    (value as f64 - px / 1000.0).abs() <= 5.0 + 1e-3,
                    "pixel ({}, {}) = {} but projected x = {}",
                    row,
                    col,
                    value,
                    px / 1000.0
                );
            }
        }
        assert!(valid > 21 * 21 / 3, "only {} valid pixels", valid);
    }

    #[test]
    fn test_lambert_extent_covers_outer_cell_edges() {
        let proj = LambertConformal::dmi_dini();
        let (cx, cy) = proj.forward(55.68, 12.57);
        let x: Vec<f64> = (0..5).map(|i| cx + i as f64 * 2_500.0).collect();
        let y: Vec<f64> = (0..4).map(|j| cy + j as f64 * 2_500.0).collect();
        let raster = Regridder::lambert(&x, &y, &proj)
            .unwrap()
            .apply(&[0.0; 20]);

        let east = raster.west + raster.width as f64 * raster.pixel_width;
        let south = raster.north - raster.height as f64 * raster.pixel_height;
        let corners = [
            (x[0] - 1_250.0, y[0] - 1_250.0),
            (x[4] + 1_250.0, y[0] - 1_250.0),
            (x[0] - 1_250.0, y[3] + 1_250.0),
            (x[4] + 1_250.0, y[3] + 1_250.0),
        ];
        for (px, py) in corners {
            let (lat, lon) = proj.inverse(px, py);
            let eps = 1e-9;
            assert!(lon >= raster.west - eps && lon <= east + eps, "lon {} outside", lon);
            assert!(lat >= south - eps && lat <= raster.north + eps, "lat {} outside", lat);
        }
    }

    #[test]
    fn test_lambert_needs_two_cells() {
        let proj = LambertConformal::dmi_dini();
        assert!(Regridder::lambert(&[0.0], &[0.0, 1.0], &proj).is_err());
    }
}
