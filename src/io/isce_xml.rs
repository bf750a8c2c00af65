//! ISCE image metadata (`<imageFile>` XML) reading and writing.

use crate::io::raw_raster::{DataType, Endianness, Interleave};
use crate::types::{GeoGrid, ProductError, ProductResult};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const LON_COMPONENT: &str = "coordinate1";
const LAT_COMPONENT: &str = "coordinate2";

/// Image description carried by an ISCE `.xml` file
#[derive(Debug, Clone, PartialEq)]
pub struct ImageHeader {
    /// Binary file the header describes
    pub file_name: PathBuf,
    pub width: usize,
    pub length: usize,
    pub bands: usize,
    pub data_type: DataType,
    pub scheme: Interleave,
    pub byte_order: Endianness,
    /// Geographic grid; absent for radar-geometry images
    pub grid: Option<GeoGrid>,
}

impl ImageHeader {
    /// The geographic grid, or an error naming the image
    pub fn geo_grid(&self) -> ProductResult<GeoGrid> {
        let grid = self.grid.ok_or_else(|| {
            ProductError::InvalidFormat(format!(
                "{} has no coordinate1/coordinate2 georeference",
                self.file_name.display()
            ))
        })?;
        grid.validate()?;
        Ok(grid)
    }
}

/// Read an ISCE image XML; relative `file_name` values resolve against the
/// XML's directory.
pub fn read_image_xml(path: &Path) -> ProductResult<ImageHeader> {
    log::debug!("Reading image metadata {}", path.display());
    let content = std::fs::read_to_string(path)?;
    let mut header = parse_image_xml(&content)?;

    if header.file_name.as_os_str().is_empty() {
        header.file_name = path.with_extension("");
    } else if header.file_name.is_relative() {
        if let Some(parent) = path.parent() {
            header.file_name = parent.join(&header.file_name);
        }
    }
    Ok(header)
}

/// Parse the `<imageFile>` property tree
pub fn parse_image_xml(xml_content: &str) -> ProductResult<ImageHeader> {
    let mut reader = Reader::from_str(xml_content);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut components: Vec<String> = Vec::new();
    let mut property: Option<String> = None;
    let mut in_value = false;
    let mut values: HashMap<(Option<String>, String), String> = HashMap::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"component" => components.push(name_attribute(e)?.unwrap_or_default()),
                b"property" => property = name_attribute(e)?,
                b"value" => in_value = true,
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"component" => {
                    components.pop();
                }
                b"property" => property = None,
                b"value" => in_value = false,
                _ => {}
            },
            Ok(Event::Text(ref e)) => {
                if let (true, Some(name)) = (in_value, property.as_ref()) {
                    let text = e.unescape()?.trim().to_string();
                    values.insert((components.last().cloned(), name.to_lowercase()), text);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ProductError::Xml(format!("image XML parsing error: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    let top = |name: &str| values.get(&(None, name.to_string())).map(String::as_str);
    let in_component = |component: &str, name: &str| {
        values
            .get(&(Some(component.to_string()), name.to_string()))
            .map(String::as_str)
    };

    let width: usize = parse_required(top("width"), "width")?;
    let length: usize = parse_required(top("length"), "length")?;
    let bands: usize = match top("number_bands") {
        Some(v) => parse_required(Some(v), "number_bands")?,
        None => 1,
    };
    if width == 0 || length == 0 || bands == 0 {
        return Err(ProductError::InvalidFormat(format!(
            "empty image {}x{} with {} band(s)",
            length, width, bands
        )));
    }

    let data_type = DataType::from_isce(top("data_type").unwrap_or("FLOAT"))?;
    let scheme = Interleave::from_name(top("scheme").unwrap_or("BIL"))?;
    let byte_order = Endianness::from_isce(top("byte_order").unwrap_or("l"))?;
    let file_name = PathBuf::from(top("file_name").unwrap_or(""));

    let grid = match (
        in_component(LON_COMPONENT, "startingvalue"),
        in_component(LON_COMPONENT, "delta"),
        in_component(LAT_COMPONENT, "startingvalue"),
        in_component(LAT_COMPONENT, "delta"),
    ) {
        (Some(lon0), Some(dlon), Some(lat0), Some(dlat)) => Some(GeoGrid::new(
            parse_required(Some(lon0), "coordinate1.startingvalue")?,
            parse_required(Some(lat0), "coordinate2.startingvalue")?,
            parse_required(Some(dlon), "coordinate1.delta")?,
            parse_required(Some(dlat), "coordinate2.delta")?,
            width,
            length,
        )),
        _ => None,
    };

    log::debug!(
        "Image metadata: {}x{}x{} {} {} grid={:?}",
        bands, length, width, data_type.isce_name(), scheme.name(), grid
    );

    Ok(ImageHeader { file_name, width, length, bands, data_type, scheme, byte_order, grid })
}

fn name_attribute(e: &BytesStart<'_>) -> ProductResult<Option<String>> {
    match e.try_get_attribute("name").map_err(quick_xml::Error::from)? {
        Some(attr) => Ok(Some(attr.unescape_value()?.to_lowercase())),
        None => Ok(None),
    }
}

fn parse_required<T: std::str::FromStr>(value: Option<&str>, name: &str) -> ProductResult<T> {
    let raw = value.ok_or_else(|| ProductError::InvalidFormat(format!("missing property '{}'", name)))?;
    raw.parse::<T>()
        .map_err(|_| ProductError::InvalidFormat(format!("bad value '{}' for property '{}'", raw, name)))
}

/// Render the header as ISCE image XML.
///
/// `file_name` is written as given; callers pass the bare file name so the
/// XML and binary can move together.
pub fn render_image_xml(header: &ImageHeader) -> ProductResult<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);

    writer.write_event(Event::Start(BytesStart::new("imageFile")))?;
    write_property(&mut writer, "width", &header.width.to_string())?;
    write_property(&mut writer, "length", &header.length.to_string())?;
    write_property(&mut writer, "number_bands", &header.bands.to_string())?;
    write_property(&mut writer, "data_type", header.data_type.isce_name())?;
    write_property(&mut writer, "scheme", header.scheme.name())?;
    write_property(&mut writer, "byte_order", header.byte_order.isce_code())?;
    write_property(&mut writer, "access_mode", "read")?;
    write_property(&mut writer, "file_name", &header.file_name.to_string_lossy())?;

    if let Some(grid) = header.grid {
        write_coordinate(&mut writer, LON_COMPONENT, grid.origin_lon, grid.delta_lon, grid.width)?;
        write_coordinate(&mut writer, LAT_COMPONENT, grid.origin_lat, grid.delta_lat, grid.height)?;
    }

    writer.write_event(Event::End(BytesEnd::new("imageFile")))?;

    String::from_utf8(writer.into_inner())
        .map_err(|e| ProductError::Xml(format!("image XML is not UTF-8: {}", e)))
}

/// Write the header next to its binary
pub fn write_image_xml(path: &Path, header: &ImageHeader) -> ProductResult<()> {
    std::fs::write(path, render_image_xml(header)?)?;
    log::debug!("Wrote image metadata {}", path.display());
    Ok(())
}

fn write_property(writer: &mut Writer<Vec<u8>>, name: &str, value: &str) -> ProductResult<()> {
    let mut start = BytesStart::new("property");
    start.push_attribute(("name", name));
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Start(BytesStart::new("value")))?;
    writer.write_event(Event::Text(BytesText::new(value)))?;
    writer.write_event(Event::End(BytesEnd::new("value")))?;
    writer.write_event(Event::End(BytesEnd::new("property")))?;
    Ok(())
}

fn write_coordinate(
    writer: &mut Writer<Vec<u8>>,
    component: &str,
    start: f64,
    delta: f64,
    size: usize,
) -> ProductResult<()> {
    let mut element = BytesStart::new("component");
    element.push_attribute(("name", component));
    writer.write_event(Event::Start(element))?;
    write_property(writer, "startingvalue", &start.to_string())?;
    write_property(writer, "delta", &delta.to_string())?;
    write_property(writer, "size", &size.to_string())?;
    write_property(writer, "endingvalue", &(start + size as f64 * delta).to_string())?;
    writer.write_event(Event::End(BytesEnd::new("component")))?;
    Ok(())
}
