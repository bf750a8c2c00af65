//! Raster containers: ISCE image XML, raw planes, ENVI/VRT views and PNG.

pub mod envi;
#[cfg(feature = "gdal")]
pub mod gdal_raster;
pub mod isce_xml;
pub mod png_writer;
pub mod product_writer;
pub mod raster_files;
pub mod raw_raster;
pub mod vrt;

pub use isce_xml::{read_image_xml, write_image_xml, ImageHeader};
pub use product_writer::{ProductFiles, ProductWriter};
pub use raster_files::{load_component_mask, load_phase, load_unwrapped, load_water_mask};
pub use raw_raster::{DataType, Endianness, Interleave};
