use ndarray::{Array2, Array3, ArrayView2, ArrayViewMut2, Axis};
use num_complex::Complex;
use serde::{Deserialize, Serialize};

/// Complex interferogram sample (I + jQ)
pub type IfgComplex = Complex<f32>;

/// Water-mask cell value marking water or nodata
pub const WATER_NODATA: i8 = -1;

/// Connected-component label marking an unreliable region
pub const INVALID_COMPONENT: i32 = 0;

/// Phase value written for pixels without valid phase
pub const INVALID_PHASE: f32 = -10.0;

/// Band index of the amplitude plane in the unwrapped product
pub const AMPLITUDE_BAND: usize = 0;

/// Band index of the displacement plane in the unwrapped product
pub const DISPLACEMENT_BAND: usize = 1;

/// Georeference of a north-up geographic pixel grid.
///
/// The origin is the outer corner of the top-left pixel, matching the
/// GDAL geotransform convention used by ISCE geocoded images.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoGrid {
    pub origin_lon: f64,
    pub origin_lat: f64,
    pub delta_lon: f64,
    pub delta_lat: f64,
    pub width: usize,
    pub height: usize,
}

impl GeoGrid {
    pub fn new(
        origin_lon: f64,
        origin_lat: f64,
        delta_lon: f64,
        delta_lat: f64,
        width: usize,
        height: usize,
    ) -> Self {
        Self { origin_lon, origin_lat, delta_lon, delta_lat, width, height }
    }

    /// Check the north-up invariants (`delta_lon > 0`, `delta_lat < 0`, non-empty).
    pub fn validate(&self) -> ProductResult<()> {
        if !(self.delta_lon.is_finite() && self.delta_lat.is_finite()) {
            return Err(ProductError::Configuration(format!(
                "non-finite pixel spacing ({}, {})",
                self.delta_lon, self.delta_lat
            )));
        }
        if self.delta_lon <= 0.0 || self.delta_lat >= 0.0 {
            return Err(ProductError::Configuration(format!(
                "grid is not north-up: delta_lon={} delta_lat={}",
                self.delta_lon, self.delta_lat
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(ProductError::Configuration(format!(
                "empty grid {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }

    /// GDAL-style geotransform
    pub fn geo_transform(&self) -> [f64; 6] {
        [self.origin_lon, self.delta_lon, 0.0, self.origin_lat, 0.0, self.delta_lat]
    }

    pub fn from_geo_transform(gt: [f64; 6], width: usize, height: usize) -> Self {
        Self::new(gt[0], gt[3], gt[1], gt[5], width, height)
    }

    /// Last longitude edge (`origin + width * delta`)
    pub fn end_lon(&self) -> f64 {
        self.origin_lon + self.width as f64 * self.delta_lon
    }

    /// Last latitude edge (`origin + height * delta`)
    pub fn end_lat(&self) -> f64 {
        self.origin_lat + self.height as f64 * self.delta_lat
    }

    pub fn extent(&self) -> BoundingBox {
        BoundingBox {
            min_lon: self.origin_lon.min(self.end_lon()),
            max_lon: self.origin_lon.max(self.end_lon()),
            min_lat: self.origin_lat.min(self.end_lat()),
            max_lat: self.origin_lat.max(self.end_lat()),
        }
    }

    /// (rows, cols) shape as ndarray reports it
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn same_shape(&self, other: &GeoGrid) -> bool {
        self.shape() == other.shape()
    }

    /// Fractional (col, row) of a geographic coordinate
    pub fn geo_to_pixel(&self, lon: f64, lat: f64) -> (f64, f64) {
        ((lon - self.origin_lon) / self.delta_lon, (lat - self.origin_lat) / self.delta_lat)
    }

    /// Geographic coordinate of a fractional (col, row)
    pub fn pixel_to_geo(&self, col: f64, row: f64) -> (f64, f64) {
        (self.origin_lon + col * self.delta_lon, self.origin_lat + row * self.delta_lat)
    }
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Snap outward to whole degrees and pad one degree on every side,
    /// without crossing ±89° latitude or ±179° longitude.
    ///
    /// This is the box the water-body stitcher is asked for, so the mask
    /// always extends past the product footprint before cropping.
    pub fn snapped_with_margin(&self) -> BoundingBox {
        let south = self.min_lat.floor();
        let north = self.max_lat.ceil();
        let west = self.min_lon.floor();
        let east = self.max_lon.ceil();
        BoundingBox {
            min_lat: if south > -89.0 { south - 1.0 } else { south },
            max_lat: if north < 89.0 { north + 1.0 } else { north },
            min_lon: if west > -179.0 { west - 1.0 } else { west },
            max_lon: if east < 179.0 { east + 1.0 } else { east },
        }
    }

    /// True when `other` lies entirely inside this box
    pub fn contains(&self, other: &BoundingBox) -> bool {
        self.min_lon <= other.min_lon
            && self.max_lon >= other.max_lon
            && self.min_lat <= other.min_lat
            && self.max_lat >= other.max_lat
    }
}

/// Band-stacked raster with georeference, stored as (band, row, col)
#[derive(Debug, Clone, PartialEq)]
pub struct GeoRaster<T> {
    pub grid: GeoGrid,
    pub data: Array3<T>,
}

impl<T: Clone> GeoRaster<T> {
    /// Wrap a band stack, checking it matches the grid dimensions
    pub fn new(grid: GeoGrid, data: Array3<T>) -> ProductResult<Self> {
        let (bands, rows, cols) = data.dim();
        if bands == 0 || (rows, cols) != grid.shape() {
            return Err(ProductError::GridMismatch(format!(
                "raster data {}x{}x{} does not match grid {}x{}",
                bands, rows, cols, grid.height, grid.width
            )));
        }
        Ok(Self { grid, data })
    }

    pub fn from_band(grid: GeoGrid, band: Array2<T>) -> ProductResult<Self> {
        Self::new(grid, band.insert_axis(Axis(0)))
    }

    pub fn band_count(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.data.len_of(Axis(1)), self.data.len_of(Axis(2)))
    }

    pub fn band(&self, index: usize) -> ArrayView2<'_, T> {
        self.data.index_axis(Axis(0), index)
    }

    pub fn band_mut(&mut self, index: usize) -> ArrayViewMut2<'_, T> {
        self.data.index_axis_mut(Axis(0), index)
    }
}

/// Water-body mask: `-1` excludes, any other value is valid
pub type WaterMask = GeoRaster<i8>;

/// Connected-component labels; `0` marks unreliable pixels
pub type ComponentMask = GeoRaster<i32>;

/// Geocoded wrapped interferogram (single complex band)
pub type PhaseProduct = GeoRaster<IfgComplex>;

/// Geocoded unwrapped product `[amplitude, displacement]`
pub type UnwrappedProduct = GeoRaster<f32>;

/// Unwrapped product after masking; displacement carries masked phase
pub type MaskedProduct = GeoRaster<f32>;

/// Error types for product finalization
#[derive(Debug, thiserror::Error)]
pub enum ProductError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Grid mismatch: {0}")]
    GridMismatch(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

impl ProductError {
    /// Whether the error leaves the masked product unusable.
    ///
    /// Rendering runs after the product is persisted, so a render failure
    /// only loses the visualization layer.
    pub fn is_fatal_to_product(&self) -> bool {
        !matches!(self, ProductError::Render(_))
    }
}

impl From<quick_xml::Error> for ProductError {
    fn from(err: quick_xml::Error) -> Self {
        ProductError::Xml(err.to_string())
    }
}

/// Result type for product operations
pub type ProductResult<T> = Result<T, ProductError>;
