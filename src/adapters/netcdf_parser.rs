//! NetCDF decoding of DMI forecast cubes.
//!
//! libnetcdf needs a file handle, so the payload is spilled to a temp file
//! first. The data variable is reordered to `time`, `y`, `x`, CF packing
//! attributes are applied and missing values become NaN.

use crate::domain::model::{ForecastCube, GridCrs};
use crate::utils::error::{IngestError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use std::io::Write;

/// Values at or above this are the netCDF default fill for floats.
const DEFAULT_FILL_THRESHOLD: f32 = 9.9e36;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Time,
    X,
    Y,
    Other,
}

pub fn axis_of(dimension: &str) -> Axis {
    match dimension.to_ascii_lowercase().as_str() {
        "time" | "t" | "forecast_time" | "valid_time" => Axis::Time,
        "lon" | "longitude" | "x" | "rlon" => Axis::X,
        "lat" | "latitude" | "y" | "rlat" => Axis::Y,
        _ => Axis::Other,
    }
}

#[derive(Debug, Clone)]
pub struct DimInfo {
    pub name: String,
    pub axis: Axis,
    pub len: usize,
}

/// CF time units such as `hours since 2025-01-01 00:00:00`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeUnits {
    pub seconds_per_unit: f64,
    pub reference: DateTime<Utc>,
}

pub fn parse_time_units(units: &str) -> Result<TimeUnits> {
    let invalid = || IngestError::invalid_data(format!("Unsupported time units: {}", units));

    let (unit, reference) = units.split_once(" since ").ok_or_else(invalid)?;
    let seconds_per_unit = match unit.trim().to_ascii_lowercase().as_str() {
        "seconds" | "second" | "secs" | "sec" | "s" => 1.0,
        "minutes" | "minute" | "mins" | "min" => 60.0,
        "hours" | "hour" | "hrs" | "hr" | "h" => 3600.0,
        "days" | "day" | "d" => 86400.0,
        _ => return Err(invalid()),
    };

    let reference = parse_reference_time(reference).ok_or_else(invalid)?;
    Ok(TimeUnits {
        seconds_per_unit,
        reference,
    })
}

fn parse_reference_time(raw: &str) -> Option<DateTime<Utc>> {
    let mut text = raw.trim();
    for suffix in ["UTC", "Z", "+00:00", "+0000", "+00"] {
        text = text.strip_suffix(suffix).unwrap_or(text).trim_end();
    }

    const FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc())
}

pub fn decode_times(values: &[f64], units: &str) -> Result<Vec<DateTime<Utc>>> {
    let units = parse_time_units(units)?;
    values
        .iter()
        .map(|&value| {
            if !value.is_finite() {
                return Err(IngestError::invalid_data("Non-finite time value"));
            }
            let out_of_range =
                || IngestError::invalid_data(format!("Time value {} out of range", value));
            let millis = (value * units.seconds_per_unit * 1000.0).round();
            // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive
            if !(i64::MIN as f64..i64::MAX as f64).contains(&millis) {
                return Err(out_of_range());
            }
            let offset = TimeDelta::try_milliseconds(millis as i64).ok_or_else(out_of_range)?;
            units
                .reference
                .checked_add_signed(offset)
                .ok_or_else(out_of_range)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Packing {
    pub scale_factor: Option<f64>,
    pub add_offset: Option<f64>,
    pub fill_value: Option<f64>,
    pub missing_value: Option<f64>,
}

impl Packing {
    pub fn unpack(&self, raw: f32) -> f32 {
        let is_missing = |marker: Option<f64>| marker.is_some_and(|m| raw == m as f32);
        if raw.is_nan()
            || raw.abs() >= DEFAULT_FILL_THRESHOLD
            || is_missing(self.fill_value)
            || is_missing(self.missing_value)
        {
            return f32::NAN;
        }
        let scaled = raw as f64 * self.scale_factor.unwrap_or(1.0) + self.add_offset.unwrap_or(0.0);
        scaled as f32
    }
}

/// Reorders values stored in `dims` order into `time`, `y`, `x` order.
/// Singleton dimensions that are not time or space are dropped.
pub fn reorder_to_tyx(dims: &[DimInfo], values: &[f32]) -> Result<(usize, usize, usize, Vec<f32>)> {
    let expected: usize = dims.iter().map(|d| d.len).product();
    if values.len() != expected {
        return Err(IngestError::invalid_data(format!(
            "Variable holds {} values, dimensions imply {}",
            values.len(),
            expected
        )));
    }

    // 每個維度在原始陣列中的 stride
    let mut strides = vec![1usize; dims.len()];
    for i in (0..dims.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * dims[i + 1].len;
    }

    let find = |axis: Axis| -> Result<(usize, usize)> {
        let mut found = dims.iter().enumerate().filter(|(_, d)| d.axis == axis);
        match (found.next(), found.next()) {
            (Some((i, d)), None) => Ok((d.len, strides[i])),
            (None, _) => Err(IngestError::invalid_data(format!(
                "Missing {:?} dimension",
                axis
            ))),
            (Some(_), Some(_)) => Err(IngestError::invalid_data(format!(
                "More than one {:?} dimension",
                axis
            ))),
        }
    };

    if let Some(extra) = dims.iter().find(|d| d.axis == Axis::Other && d.len != 1) {
        return Err(IngestError::invalid_data(format!(
            "Unsupported dimension {} of length {}",
            extra.name, extra.len
        )));
    }

    let (nt, t_stride) = find(Axis::Time)?;
    let (ny, y_stride) = find(Axis::Y)?;
    let (nx, x_stride) = find(Axis::X)?;

    let mut out = Vec::with_capacity(nt * ny * nx);
    for t in 0..nt {
        for y in 0..ny {
            for x in 0..nx {
                out.push(values[t * t_stride + y * y_stride + x * x_stride]);
            }
        }
    }
    Ok((nt, ny, nx, out))
}

fn has_attr(var: &netcdf::Variable, name: &str) -> bool {
    var.attributes().any(|attr| attr.name() == name)
}

fn attr_f64(var: &netcdf::Variable, name: &str) -> Option<f64> {
    if !has_attr(var, name) {
        return None;
    }
    let value = var.attribute_value(name)?.ok()?;
    f64::try_from(value).ok()
}

fn attr_string(var: &netcdf::Variable, name: &str) -> Option<String> {
    if !has_attr(var, name) {
        return None;
    }
    match var.attribute_value(name)?.ok()? {
        netcdf::AttributeValue::Str(value) => Some(value),
        _ => None,
    }
}

fn dims_of(var: &netcdf::Variable) -> Vec<DimInfo> {
    var.dimensions()
        .iter()
        .map(|d| {
            let name = d.name();
            DimInfo {
                axis: axis_of(&name),
                len: d.len(),
                name,
            }
        })
        .collect()
}

fn is_forecast_variable(dims: &[DimInfo]) -> bool {
    [Axis::Time, Axis::X, Axis::Y]
        .iter()
        .all(|axis| dims.iter().any(|d| d.axis == *axis))
}

fn read_axis(file: &netcdf::File, dim: &DimInfo, crs: GridCrs) -> Result<Vec<f64>> {
    let var = file.variable(&dim.name).ok_or_else(|| {
        IngestError::invalid_data(format!("Missing coordinate variable {}", dim.name))
    })?;
    let mut values: Vec<f64> = var.get_values(..)?;

    if crs == GridCrs::DmiLambert {
        let units = attr_string(&var, "units").unwrap_or_default();
        if units.trim().eq_ignore_ascii_case("km") {
            values.iter_mut().for_each(|v| *v *= 1000.0);
        }
    }
    Ok(values)
}

/// Decodes a NetCDF payload into a forecast cube for `parameter`.
pub fn decode_cube(payload: &[u8], parameter: &str, crs: GridCrs) -> Result<ForecastCube> {
    let mut scratch = tempfile::Builder::new()
        .prefix("dmi-cube-")
        .suffix(".nc")
        .tempfile()?;
    scratch.write_all(payload)?;
    scratch.flush()?;

    let file = netcdf::open(scratch.path())?;

    let var = file
        .variable(parameter)
        .filter(|v| is_forecast_variable(&dims_of(v)))
        .or_else(|| file.variables().find(|v| is_forecast_variable(&dims_of(v))))
        .ok_or_else(|| {
            IngestError::invalid_data(format!("No forecast variable for {} in payload", parameter))
        })?;
    let dims = dims_of(&var);
    tracing::debug!(
        "Decoding variable {} with dimensions {:?}",
        var.name(),
        dims.iter().map(|d| (&d.name, d.len)).collect::<Vec<_>>()
    );

    let packing = Packing {
        scale_factor: attr_f64(&var, "scale_factor"),
        add_offset: attr_f64(&var, "add_offset"),
        fill_value: attr_f64(&var, "_FillValue"),
        missing_value: attr_f64(&var, "missing_value"),
    };
    let raw: Vec<f32> = var.get_values(..)?;
    let unpacked: Vec<f32> = raw.iter().map(|&v| packing.unpack(v)).collect();
    let (_, _, _, values) = reorder_to_tyx(&dims, &unpacked)?;

    let axis_dim = |axis: Axis| {
        dims.iter()
            .find(|d| d.axis == axis)
            .ok_or_else(|| IngestError::invalid_data(format!("Missing {:?} dimension", axis)))
    };

    let time_dim = axis_dim(Axis::Time)?;
    let time_var = file.variable(&time_dim.name).ok_or_else(|| {
        IngestError::invalid_data(format!("Missing time variable {}", time_dim.name))
    })?;
    let units = attr_string(&time_var, "units")
        .ok_or_else(|| IngestError::invalid_data("Time variable has no units"))?;
    let times = decode_times(&time_var.get_values::<f64, _>(..)?, &units)?;

    let x = read_axis(&file, axis_dim(Axis::X)?, crs)?;
    let y = read_axis(&file, axis_dim(Axis::Y)?, crs)?;

    let cube = ForecastCube {
        parameter: parameter.to_string(),
        times,
        x,
        y,
        crs,
        values,
    };
    cube.check_shape()?;
    Ok(cube)
}
