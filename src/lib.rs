//! topsprod: finalization of Sentinel-1 interferometric standard products
//!
//! Aligns a water-body mask onto the geocoded product grid, masks the
//! unwrapped interferogram with the water and connected-component masks,
//! persists the masked product with nodata-tagged band exports, and renders
//! the displacement layer into map tiles and browse images.

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    BoundingBox, ComponentMask, GeoGrid, GeoRaster, IfgComplex, MaskedProduct, PhaseProduct,
    ProductError, ProductResult, UnwrappedProduct, WaterMask,
};

pub use crate::core::{
    CompositingEngine, GridRatio, MaskAligner, PipelineConfig, StandardProductPipeline,
    TileRenderer,
};
pub use io::{ProductFiles, ProductWriter};
