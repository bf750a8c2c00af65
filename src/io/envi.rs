//! ENVI `.hdr` sidecars so GDAL and ENVI readers open the raw binaries.

use crate::io::isce_xml::ImageHeader;
use crate::io::raw_raster::Endianness;
use crate::types::ProductResult;
use std::fmt::Write as _;
use std::path::Path;

const WGS84_WKT: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137,298.257223563]],PRIMEM["Greenwich",0],UNIT["Degree",0.017453292519943295]]"#;

pub fn render_envi_header(header: &ImageHeader, description: &str) -> String {
    let mut hdr = String::new();
    // Writing to a String cannot fail
    let _ = writeln!(hdr, "ENVI");
    let _ = writeln!(hdr, "description = {{{}}}", description);
    let _ = writeln!(hdr, "samples = {}", header.width);
    let _ = writeln!(hdr, "lines = {}", header.length);
    let _ = writeln!(hdr, "bands = {}", header.bands);
    let _ = writeln!(hdr, "header offset = 0");
    let _ = writeln!(hdr, "file type = ENVI Standard");
    let _ = writeln!(hdr, "data type = {}", header.data_type.envi_code());
    let _ = writeln!(hdr, "interleave = {}", header.scheme.name().to_lowercase());
    let _ = writeln!(
        hdr,
        "byte order = {}",
        match header.byte_order {
            Endianness::Little => 0,
            Endianness::Big => 1,
        }
    );
    if let Some(grid) = header.grid {
        let _ = writeln!(
            hdr,
            "map info = {{Geographic Lat/Lon, 1.0, 1.0, {}, {}, {}, {}, WGS-84, units=Degrees}}",
            grid.origin_lon,
            grid.origin_lat,
            grid.delta_lon,
            grid.delta_lat.abs()
        );
        let _ = writeln!(hdr, "coordinate system string = {{{}}}", WGS84_WKT);
    }
    hdr
}

pub fn write_envi_header(path: &Path, header: &ImageHeader, description: &str) -> ProductResult<()> {
    std::fs::write(path, render_envi_header(header, description))?;
    log::debug!("Wrote ENVI header {}", path.display());
    Ok(())
}
