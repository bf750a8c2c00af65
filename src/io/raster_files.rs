//! Load pipeline inputs from ISCE image XML + binary pairs.

use crate::io::isce_xml::read_image_xml;
use crate::io::raw_raster::{read_label_band, read_planes, DataType, RasterElement};
use crate::types::{
    ComponentMask, GeoRaster, PhaseProduct, ProductError, ProductResult, UnwrappedProduct,
    WaterMask, WATER_NODATA,
};
use ndarray::Axis;
use std::path::Path;

/// Read any georeferenced raster whose element type matches `T`
pub fn load_georaster<T: RasterElement>(xml_path: &Path) -> ProductResult<GeoRaster<T>> {
    let header = read_image_xml(xml_path)?;
    let grid = header.geo_grid()?;
    let data = read_planes::<T>(&header.file_name, &header)?;
    GeoRaster::new(grid, data)
}

/// Geocoded wrapped interferogram (`filt_topophase.flat.geo`)
pub fn load_phase(xml_path: &Path) -> ProductResult<PhaseProduct> {
    let phase: PhaseProduct = load_georaster(xml_path)?;
    log::info!("Loaded phase {:?} from {}", phase.shape(), xml_path.display());
    Ok(phase)
}

/// Geocoded unwrapped product; must carry amplitude and displacement bands
pub fn load_unwrapped(xml_path: &Path) -> ProductResult<UnwrappedProduct> {
    let product: UnwrappedProduct = load_georaster(xml_path)?;
    if product.band_count() < 2 {
        return Err(ProductError::InvalidFormat(format!(
            "{} has {} band(s); expected [amplitude, displacement]",
            xml_path.display(),
            product.band_count()
        )));
    }
    log::info!(
        "Loaded unwrapped product {:?} ({} bands) from {}",
        product.shape(),
        product.band_count(),
        xml_path.display()
    );
    Ok(product)
}

/// Water-body mask. BYTE masks are read as signed; wider integer masks are
/// collapsed to `-1` (exclude) / `0` (land) / `1` (water).
pub fn load_water_mask(xml_path: &Path) -> ProductResult<WaterMask> {
    let header = read_image_xml(xml_path)?;
    let grid = header.geo_grid()?;

    let mask = if header.data_type == DataType::Byte {
        let planes = read_planes::<i8>(&header.file_name, &header)?;
        if header.bands > 1 {
            log::warn!(
                "{} has {} bands; using band 1 as the mask",
                header.file_name.display(),
                header.bands
            );
        }
        GeoRaster::from_band(grid, planes.index_axis_move(Axis(0), 0))?
    } else {
        let labels = read_label_band(&header.file_name, &header)?;
        GeoRaster::from_band(
            grid,
            labels.mapv(|v| match v {
                -1 => WATER_NODATA,
                0 => 0,
                _ => 1,
            }),
        )?
    };

    let excluded = mask.data.iter().filter(|&&v| v == WATER_NODATA).count();
    log::info!(
        "Loaded water mask {:?} from {} ({} excluded pixels)",
        mask.shape(),
        xml_path.display(),
        excluded
    );
    Ok(mask)
}

/// Connected-component labels (`filt_topophase.unw.conncomp.geo`)
pub fn load_component_mask(xml_path: &Path) -> ProductResult<ComponentMask> {
    let header = read_image_xml(xml_path)?;
    let grid = header.geo_grid()?;
    let labels = read_label_band(&header.file_name, &header)?;
    let mask = GeoRaster::from_band(grid, labels)?;
    log::info!("Loaded connected components {:?} from {}", mask.shape(), xml_path.display());
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::isce_xml::{write_image_xml, ImageHeader};
    use crate::io::raw_raster::{write_planes, Endianness, Interleave};
    use crate::types::GeoGrid;
    use ndarray::Array3;

    fn write_raster<T: RasterElement>(dir: &Path, name: &str, data: &Array3<T>, data_type: DataType) -> std::path::PathBuf {
        let (bands, rows, cols) = data.dim();
        let header = ImageHeader {
            file_name: name.into(),
            width: cols,
            length: rows,
            bands,
            data_type,
            scheme: Interleave::Bil,
            byte_order: Endianness::Little,
            grid: Some(GeoGrid::new(-118.0, 35.0, 0.01, -0.01, cols, rows)),
        };
        write_planes(&dir.join(name), data, Interleave::Bil).unwrap();
        let xml = dir.join(format!("{}.xml", name));
        write_image_xml(&xml, &header).unwrap();
        xml
    }

    #[test]
    fn test_short_water_mask_is_collapsed() {
        let dir = tempfile::tempdir().unwrap();
        let data = Array3::from_shape_vec((1, 1, 4), vec![-1i16, 0, 1, 7]).unwrap();
        let xml = write_raster(dir.path(), "wbd", &data, DataType::Short);
        let mask = load_water_mask(&xml).unwrap();
        assert_eq!(mask.band(0).iter().copied().collect::<Vec<_>>(), vec![-1, 0, 1, 1]);
    }

    #[test]
    fn test_unwrapped_needs_two_bands() {
        let dir = tempfile::tempdir().unwrap();
        let data = Array3::<f32>::zeros((1, 2, 2));
        let xml = write_raster(dir.path(), "unw", &data, DataType::Float);
        assert!(matches!(load_unwrapped(&xml), Err(ProductError::InvalidFormat(_))));
    }

    #[test]
    fn test_component_labels() {
        let dir = tempfile::tempdir().unwrap();
        let data = Array3::from_shape_vec((1, 2, 2), vec![0u8, 1, 2, 0]).unwrap();
        let xml = write_raster(dir.path(), "conncomp", &data, DataType::Byte);
        let mask = load_component_mask(&xml).unwrap();
        assert_eq!(mask.band(0)[[1, 0]], 2);
        assert_eq!(mask.grid.width, 2);
    }
}
