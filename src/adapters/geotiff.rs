//! Single-band float32 GeoTIFF writer (EPSG:4326, LZW).

use crate::domain::model::GeoRaster;
use crate::utils::error::{IngestError, Result};
use std::io::Cursor;
use tiff::encoder::{colortype, compression::Lzw, TiffEncoder};
use tiff::tags::Tag;

pub const MODEL_PIXEL_SCALE: u16 = 33550;
pub const MODEL_TIEPOINT: u16 = 33922;
pub const GEO_KEY_DIRECTORY: u16 = 34735;
pub const GDAL_NODATA: u16 = 42113;

/// GeoKey directory: header, then (key, location, count, value) entries.
/// GTModelType=Geographic, GTRasterType=PixelIsArea, GeographicType=EPSG:4326.
const GEO_KEYS: [u16; 16] = [
    1, 1, 0, 3, //
    1024, 0, 1, 2, //
    1025, 0, 1, 1, //
    2048, 0, 1, 4326,
];

pub fn encode_geotiff(raster: &GeoRaster) -> Result<Vec<u8>> {
    if raster.values.len() != raster.width * raster.height {
        return Err(IngestError::invalid_data(format!(
            "Raster holds {} values for {}x{} pixels",
            raster.values.len(),
            raster.width,
            raster.height
        )));
    }
    let width = u32::try_from(raster.width)
        .map_err(|_| IngestError::invalid_data("Raster is too wide"))?;
    let height = u32::try_from(raster.height)
        .map_err(|_| IngestError::invalid_data("Raster is too tall"))?;

    let mut buffer = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut buffer)?;
        let mut image = encoder.new_image_with_compression::<colortype::Gray32Float, _>(
            width,
            height,
            Lzw::default(),
        )?;

        let directory = image.encoder();
        directory.write_tag(
            Tag::Unknown(MODEL_PIXEL_SCALE),
            &[raster.pixel_width, raster.pixel_height, 0.0][..],
        )?;
        directory.write_tag(
            Tag::Unknown(MODEL_TIEPOINT),
            &[0.0, 0.0, 0.0, raster.west, raster.north, 0.0][..],
        )?;
        directory.write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), &GEO_KEYS[..])?;
        directory.write_tag(Tag::Unknown(GDAL_NODATA), "nan")?;

        image.write_data(&raster.values)?;
    }

    Ok(buffer.into_inner())
}
