//! Persist the masked product and its nodata-tagged band exports.

use crate::io::envi::write_envi_header;
use crate::io::isce_xml::{write_image_xml, ImageHeader};
use crate::io::raw_raster::{write_planes, DataType, Endianness, Interleave};
use crate::io::vrt::{write_raw_vrt, VrtBand};
use crate::types::{
    MaskedProduct, ProductError, ProductResult, AMPLITUDE_BAND, DISPLACEMENT_BAND,
};
use std::path::{Path, PathBuf};

/// Paths of everything written for one masked product
#[derive(Debug, Clone, PartialEq)]
pub struct ProductFiles {
    /// Raw BIL binary
    pub data: PathBuf,
    pub xml: PathBuf,
    pub hdr: PathBuf,
    /// Both bands, no nodata tags
    pub vrt: PathBuf,
    /// Amplitude band tagged with the amplitude nodata value
    pub amplitude_vrt: PathBuf,
    /// Displacement band tagged with the displacement nodata value
    pub displacement_vrt: PathBuf,
}

impl ProductFiles {
    /// Standard names under `dir` for a binary called `stem`,
    /// e.g. `filt_topophase.masked.unw.geo`
    pub fn in_dir(dir: &Path, stem: &str) -> Self {
        Self {
            data: dir.join(stem),
            xml: dir.join(format!("{}.xml", stem)),
            hdr: dir.join(format!("{}.hdr", stem)),
            vrt: dir.join(format!("{}.vrt", stem)),
            amplitude_vrt: dir.join(format!("{}.amp.vrt", stem)),
            displacement_vrt: dir.join(format!("{}.dis.vrt", stem)),
        }
    }

    pub fn all(&self) -> [&Path; 6] {
        [
            &self.data,
            &self.xml,
            &self.hdr,
            &self.vrt,
            &self.amplitude_vrt,
            &self.displacement_vrt,
        ]
    }
}

/// Writes a [`MaskedProduct`] as ISCE binary + XML with ENVI and VRT views
#[derive(Debug, Clone)]
pub struct ProductWriter {
    nodata_amplitude: f64,
    nodata_displacement: f64,
}

impl ProductWriter {
    pub fn new(nodata_amplitude: f64, nodata_displacement: f64) -> ProductResult<Self> {
        for (name, value) in [
            ("nodata_amplitude", nodata_amplitude),
            ("nodata_displacement", nodata_displacement),
        ] {
            // NaN cannot be stored as a sentinel in the float bands and still compare equal
            if !value.is_finite() {
                return Err(ProductError::Configuration(format!(
                    "{} must be finite, got {}",
                    name, value
                )));
            }
        }
        Ok(Self { nodata_amplitude, nodata_displacement })
    }

    pub fn write_masked_product(
        &self,
        product: &MaskedProduct,
        files: &ProductFiles,
    ) -> ProductResult<()> {
        if product.band_count() <= DISPLACEMENT_BAND {
            return Err(ProductError::GridMismatch(format!(
                "masked product has {} band(s), expected amplitude and displacement",
                product.band_count()
            )));
        }
        if let Some(parent) = files.data.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let data_name = file_name_of(&files.data)?;
        let header = ImageHeader {
            file_name: PathBuf::from(&data_name),
            width: product.grid.width,
            length: product.grid.height,
            bands: product.band_count(),
            data_type: DataType::Float,
            scheme: Interleave::Bil,
            byte_order: Endianness::Little,
            grid: Some(product.grid),
        };

        log::info!(
            "Writing masked product {} ({} bands, {}x{})",
            files.data.display(),
            header.bands,
            header.length,
            header.width
        );

        write_planes(&files.data, &product.data, header.scheme)?;
        write_image_xml(&files.xml, &header)?;
        write_envi_header(&files.hdr, &header, "masked unwrapped interferogram")?;

        let all_bands: Vec<VrtBand> = (0..header.bands)
            .map(|b| VrtBand { source_band: b, nodata: None })
            .collect();
        write_raw_vrt(&files.vrt, &header, &data_name, &all_bands)?;
        write_raw_vrt(
            &files.amplitude_vrt,
            &header,
            &data_name,
            &[VrtBand { source_band: AMPLITUDE_BAND, nodata: Some(self.nodata_amplitude) }],
        )?;
        write_raw_vrt(
            &files.displacement_vrt,
            &header,
            &data_name,
            &[VrtBand { source_band: DISPLACEMENT_BAND, nodata: Some(self.nodata_displacement) }],
        )?;

        log::info!(
            "Exported nodata-tagged bands: amplitude={} ({}), displacement={} ({})",
            files.amplitude_vrt.display(),
            self.nodata_amplitude,
            files.displacement_vrt.display(),
            self.nodata_displacement
        );
        Ok(())
    }
}

fn file_name_of(path: &Path) -> ProductResult<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            ProductError::Configuration(format!("output path {} has no file name", path.display()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::isce_xml::read_image_xml;
    use crate::io::raw_raster::read_planes;
    use crate::types::{GeoGrid, GeoRaster};
    use ndarray::Array3;

    #[test]
    fn test_nan_nodata_rejected() {
        assert!(matches!(ProductWriter::new(0.0, f64::NAN), Err(ProductError::Configuration(_))));
    }

    #[test]
    fn test_writes_all_files() {
        let dir = tempfile::tempdir().unwrap();
        let grid = GeoGrid::new(-118.0, 35.0, 0.001, -0.001, 3, 2);
        let data = Array3::from_shape_fn((2, 2, 3), |(b, r, c)| (b * 10 + r * 3 + c) as f32);
        let product = GeoRaster::new(grid, data.clone()).unwrap();

        let files = ProductFiles::in_dir(&dir.path().join("out"), "filt_topophase.masked.unw.geo");
        ProductWriter::new(0.0, -10.0).unwrap().write_masked_product(&product, &files).unwrap();

        for path in files.all() {
            assert!(path.exists(), "{} missing", path.display());
        }

        let header = read_image_xml(&files.xml).unwrap();
        assert_eq!(header.file_name, files.data);
        assert_eq!(header.geo_grid().unwrap(), grid);
        assert_eq!(read_planes::<f32>(&files.data, &header).unwrap(), data);

        let dis = std::fs::read_to_string(&files.displacement_vrt).unwrap();
        assert!(dis.contains("<NoDataValue>-10</NoDataValue>"));
        let amp = std::fs::read_to_string(&files.amplitude_vrt).unwrap();
        assert!(amp.contains("<NoDataValue>0</NoDataValue>"));
    }
}
