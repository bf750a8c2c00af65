use crate::types::{GeoGrid, ProductError, ProductResult};

/// Percentage resize factors that bring one pixel grid onto another's spacing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridRatio {
    /// Longitude (column) resize percentage
    pub lon_percent: f64,
    /// Latitude (row) resize percentage
    pub lat_percent: f64,
}

impl GridRatio {
    /// Compute the resize percentages for a grid with `source` spacing so it
    /// ends up with `target` spacing: `100 * source / target` per axis.
    ///
    /// A 1" water mask against a 10" product gives 10% (shrink), a coarse
    /// mask against a finer product gives more than 100% (enlarge).
    pub fn from_spacing(
        target: (f64, f64),
        source: (f64, f64),
    ) -> ProductResult<Self> {
        let lon_percent = axis_percent("longitude", target.0, source.0)?;
        let lat_percent = axis_percent("latitude", target.1, source.1)?;

        log::debug!("Grid ratio lon/lat: {:.6}% {:.6}%", lon_percent, lat_percent);

        Ok(Self { lon_percent, lat_percent })
    }

    /// Resize percentages taking `source` grid onto `target` grid spacing
    pub fn between(target: &GeoGrid, source: &GeoGrid) -> ProductResult<Self> {
        Self::from_spacing(
            (target.delta_lon, target.delta_lat),
            (source.delta_lon, source.delta_lat),
        )
    }

    /// Output pixel counts a percentage resize produces for an input size.
    ///
    /// Rounds to the nearest whole pixel and never yields an empty axis.
    pub fn output_size(&self, width: usize, height: usize) -> (usize, usize) {
        let scaled = |n: usize, pct: f64| ((n as f64 * pct / 100.0).round() as usize).max(1);
        (scaled(width, self.lon_percent), scaled(height, self.lat_percent))
    }
}

fn axis_percent(axis: &str, target: f64, source: f64) -> ProductResult<f64> {
    if !target.is_finite() || !source.is_finite() {
        return Err(ProductError::Configuration(format!(
            "non-finite {} pixel spacing (target={}, source={})",
            axis, target, source
        )));
    }
    if target == 0.0 || source == 0.0 {
        return Err(ProductError::Configuration(format!(
            "zero {} pixel spacing (target={}, source={})",
            axis, target, source
        )));
    }
    if target.signum() != source.signum() {
        return Err(ProductError::Configuration(format!(
            "{} pixel spacing signs differ (target={}, source={}); grids use incompatible conventions",
            axis, target, source
        )));
    }
    Ok(source / target * 100.0)
}
