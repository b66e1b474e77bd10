// Adapters layer: concrete implementations for external systems and formats
// (DMI HTTP API, NetCDF input, GeoTIFF output). Storage backends live in config/.

pub mod dmi;
pub mod geotiff;
pub mod netcdf_parser;
