//! GDAL-backed GeoTIFF export (feature `gdal`).

use crate::types::{GeoGrid, ProductError, ProductResult};
use gdal::raster::Buffer;
use gdal::DriverManager;
use image::RgbaImage;
use std::path::Path;

/// Write an RGBA image as a 4-band georeferenced GeoTIFF (EPSG:4326)
pub fn write_geotiff_rgba(path: &Path, image: &RgbaImage, grid: &GeoGrid) -> ProductResult<()> {
    let (width, height) = (image.width() as usize, image.height() as usize);
    if (height, width) != grid.shape() {
        return Err(ProductError::Render(format!(
            "image {}x{} does not match grid {}x{}",
            height, width, grid.height, grid.width
        )));
    }

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut dataset = driver.create_with_band_type::<u8, _>(path, width as isize, height as isize, 4)?;
    dataset.set_geo_transform(&grid.geo_transform())?;
    dataset.set_spatial_ref(&gdal::spatial_ref::SpatialRef::from_epsg(4326)?)?;

    for channel in 0..4 {
        let plane: Vec<u8> = image.pixels().map(|p| p.0[channel]).collect();
        let mut band = dataset.rasterband(channel as isize + 1)?;
        band.write((0, 0), (width, height), &Buffer::new((width, height), plane))?;
    }

    log::info!("Wrote RGBA GeoTIFF {} ({}x{})", path.display(), width, height);
    Ok(())
}
