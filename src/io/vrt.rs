//! GDAL VRT wrappers over raw binaries, including nodata-tagged band exports.

use crate::io::isce_xml::ImageHeader;
use crate::io::raw_raster::Endianness;
use crate::types::{ProductError, ProductResult};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::path::Path;

/// One output band: which band of the binary it reads and its nodata tag
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VrtBand {
    /// Zero-based band in the source binary
    pub source_band: usize,
    pub nodata: Option<f64>,
}

/// Render a VRT exposing `bands` of the raw binary `source_file`.
///
/// `source_file` is written relative to the VRT.
pub fn render_raw_vrt(header: &ImageHeader, source_file: &str, bands: &[VrtBand]) -> ProductResult<String> {
    let grid = header.geo_grid()?;
    let dims = (header.bands, header.length, header.width);
    let elem = header.data_type.size_bytes();

    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    let mut dataset = BytesStart::new("VRTDataset");
    dataset.push_attribute(("rasterXSize", header.width.to_string().as_str()));
    dataset.push_attribute(("rasterYSize", header.length.to_string().as_str()));
    writer.write_event(Event::Start(dataset))?;

    text_element(&mut writer, "SRS", "EPSG:4326")?;
    let gt = grid.geo_transform();
    text_element(
        &mut writer,
        "GeoTransform",
        &format!("{}, {}, {}, {}, {}, {}", gt[0], gt[1], gt[2], gt[3], gt[4], gt[5]),
    )?;

    for (index, band) in bands.iter().enumerate() {
        if band.source_band >= header.bands {
            return Err(ProductError::InvalidFormat(format!(
                "VRT band {} reads source band {} of a {}-band image",
                index + 1,
                band.source_band + 1,
                header.bands
            )));
        }
        let (image_offset, pixel_offset, line_offset) =
            header.scheme.band_offsets(dims, band.source_band, elem);

        let mut element = BytesStart::new("VRTRasterBand");
        element.push_attribute(("dataType", header.data_type.gdal_name()));
        element.push_attribute(("band", (index + 1).to_string().as_str()));
        element.push_attribute(("subClass", "VRTRawRasterBand"));
        writer.write_event(Event::Start(element))?;

        if let Some(nodata) = band.nodata {
            text_element(&mut writer, "NoDataValue", &nodata.to_string())?;
        }

        let mut source = BytesStart::new("SourceFilename");
        source.push_attribute(("relativeToVRT", "1"));
        writer.write_event(Event::Start(source))?;
        writer.write_event(Event::Text(BytesText::new(source_file)))?;
        writer.write_event(Event::End(BytesEnd::new("SourceFilename")))?;

        let byte_order = match header.byte_order {
            Endianness::Little => "LSB",
            Endianness::Big => "MSB",
        };
        text_element(&mut writer, "ByteOrder", byte_order)?;
        text_element(&mut writer, "ImageOffset", &image_offset.to_string())?;
        text_element(&mut writer, "PixelOffset", &pixel_offset.to_string())?;
        text_element(&mut writer, "LineOffset", &line_offset.to_string())?;

        writer.write_event(Event::End(BytesEnd::new("VRTRasterBand")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("VRTDataset")))?;

    String::from_utf8(writer.into_inner())
        .map_err(|e| ProductError::Xml(format!("VRT is not UTF-8: {}", e)))
}

pub fn write_raw_vrt(
    path: &Path,
    header: &ImageHeader,
    source_file: &str,
    bands: &[VrtBand],
) -> ProductResult<()> {
    std::fs::write(path, render_raw_vrt(header, source_file, bands)?)?;
    log::debug!("Wrote VRT {} ({} band(s))", path.display(), bands.len());
    Ok(())
}

fn text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> ProductResult<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::raw_raster::{DataType, Interleave};
    use crate::types::GeoGrid;

    fn header() -> ImageHeader {
        ImageHeader {
            file_name: "filt_topophase.masked.unw.geo".into(),
            width: 100,
            length: 50,
            bands: 2,
            data_type: DataType::Float,
            scheme: Interleave::Bil,
            byte_order: Endianness::Little,
            grid: Some(GeoGrid::new(-118.0, 35.0, 0.001, -0.001, 100, 50)),
        }
    }

    #[test]
    fn test_displacement_export() {
        let vrt = render_raw_vrt(
            &header(),
            "filt_topophase.masked.unw.geo",
            &[VrtBand { source_band: 1, nodata: Some(-10.0) }],
        )
        .unwrap();
        assert!(vrt.contains(r#"rasterXSize="100""#));
        assert!(vrt.contains("<NoDataValue>-10</NoDataValue>"));
        assert!(vrt.contains("<ImageOffset>400</ImageOffset>"));
        assert!(vrt.contains("<LineOffset>800</LineOffset>"));
        assert!(vrt.contains(r#"dataType="Float32""#));
    }

    #[test]
    fn test_band_out_of_range() {
        let result = render_raw_vrt(&header(), "x", &[VrtBand { source_band: 2, nodata: None }]);
        assert!(matches!(result, Err(ProductError::InvalidFormat(_))));
    }
}
