use crate::core::grid_ratio::GridRatio;
use crate::types::{GeoGrid, GeoRaster, ProductError, ProductResult, WaterMask};
use ndarray::{s, Array2, Array3, Axis};
use serde::{Deserialize, Serialize};

/// How the water mask is brought onto the product grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentMethod {
    /// Percentage resample to the product spacing, then crop at the product origin
    ResampleAndCrop,
    /// Nearest-neighbour warp of every product pixel centre into the mask
    NearestWarp,
}

impl Default for AlignmentMethod {
    fn default() -> Self {
        AlignmentMethod::ResampleAndCrop
    }
}

/// What a percentage resample actually produced
#[derive(Debug, Clone)]
pub struct ResampleOutput<T> {
    pub data: Array3<T>,
    /// Geotransform reported for the output (GDAL order)
    pub geo_transform: [f64; 6],
}

/// Percentage-based raster resize, the `-outsize X% Y%` operation.
///
/// Implementations report the output they actually wrote; callers must not
/// derive output sizes from the requested percentages.
pub trait Resampler {
    fn resample_percent<T: Copy + Default>(
        &self,
        raster: &GeoRaster<T>,
        ratio: &GridRatio,
    ) -> ProductResult<ResampleOutput<T>>;
}

/// Nearest-neighbour percentage resize.
///
/// Output size is the rounded scaled size; output spacing is the source
/// extent divided by the output size, so the footprint is preserved.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestResampler;

impl Resampler for NearestResampler {
    fn resample_percent<T: Copy + Default>(
        &self,
        raster: &GeoRaster<T>,
        ratio: &GridRatio,
    ) -> ProductResult<ResampleOutput<T>> {
        let (bands, rows, cols) = raster.data.dim();
        let (out_cols, out_rows) = ratio.output_size(cols, rows);

        log::debug!(
            "Nearest resample {}x{} by {:.4}%/{:.4}% -> {}x{}",
            rows, cols, ratio.lat_percent, ratio.lon_percent, out_rows, out_cols
        );

        let col_scale = cols as f64 / out_cols as f64;
        let row_scale = rows as f64 / out_rows as f64;
        let src_col: Vec<usize> = (0..out_cols)
            .map(|j| (((j as f64 + 0.5) * col_scale) as usize).min(cols - 1))
            .collect();
        let src_row: Vec<usize> = (0..out_rows)
            .map(|i| (((i as f64 + 0.5) * row_scale) as usize).min(rows - 1))
            .collect();

        let mut data = Array3::<T>::default((bands, out_rows, out_cols));
        for b in 0..bands {
            let src = raster.data.index_axis(Axis(0), b);
            let mut dst = data.index_axis_mut(Axis(0), b);
            for (i, &r) in src_row.iter().enumerate() {
                for (j, &c) in src_col.iter().enumerate() {
                    dst[[i, j]] = src[[r, c]];
                }
            }
        }

        let grid = &raster.grid;
        let geo_transform = [
            grid.origin_lon,
            grid.delta_lon * col_scale,
            0.0,
            grid.origin_lat,
            0.0,
            grid.delta_lat * row_scale,
        ];

        Ok(ResampleOutput { data, geo_transform })
    }
}

/// Brings a water mask onto the exact pixel grid of the product raster
pub struct MaskAligner<R: Resampler = NearestResampler> {
    resampler: R,
    method: AlignmentMethod,
}

impl MaskAligner<NearestResampler> {
    pub fn new(method: AlignmentMethod) -> Self {
        Self { resampler: NearestResampler, method }
    }
}

impl<R: Resampler> MaskAligner<R> {
    pub fn with_resampler(resampler: R, method: AlignmentMethod) -> Self {
        Self { resampler, method }
    }

    /// Produce a water mask pixel-for-pixel congruent with `product_grid`
    pub fn align(&self, mask: &WaterMask, product_grid: &GeoGrid) -> ProductResult<WaterMask> {
        product_grid.validate()?;
        mask.grid.validate()?;

        log::info!(
            "Aligning {}x{} water mask ({:.8}, {:.8}) onto {}x{} product grid ({:.8}, {:.8}) via {:?}",
            mask.grid.height, mask.grid.width, mask.grid.delta_lon, mask.grid.delta_lat,
            product_grid.height, product_grid.width, product_grid.delta_lon, product_grid.delta_lat,
            self.method
        );

        let aligned = match self.method {
            AlignmentMethod::ResampleAndCrop => {
                let resampled = self.resample_to_spacing(mask, product_grid)?;
                crop_to_grid(&resampled, product_grid)?
            }
            AlignmentMethod::NearestWarp => warp_nearest(mask, product_grid)?,
        };

        log::info!("Aligned water mask shape: {:?}", aligned.shape());
        Ok(aligned)
    }

    /// Resample the mask to the product spacing and rebuild its georeference
    /// from what the resampler reports.
    pub fn resample_to_spacing(
        &self,
        mask: &WaterMask,
        product_grid: &GeoGrid,
    ) -> ProductResult<WaterMask> {
        let ratio = GridRatio::between(product_grid, &mask.grid)?;
        log::info!("lon_rat/lat_rat: {} {}", ratio.lon_percent, ratio.lat_percent);

        let output = self.resampler.resample_percent(mask, &ratio)?;
        let (_, rows, cols) = output.data.dim();
        let requested = ratio.output_size(mask.grid.width, mask.grid.height);
        if requested != (cols, rows) {
            log::debug!(
                "Resampler wrote {}x{} (requested ratio implies {}x{}); using the written size",
                cols, rows, requested.0, requested.1
            );
        }

        let grid = GeoGrid::from_geo_transform(output.geo_transform, cols, rows);
        grid.validate()?;
        GeoRaster::new(grid, output.data)
    }
}

/// Crop a mask already at product spacing to the product's pixel window,
/// anchored at the product origin.
///
/// Fails with `GridMismatch` when the mask does not cover the product or
/// when accumulated spacing drift across the product exceeds one pixel.
pub fn crop_to_grid(mask: &WaterMask, product_grid: &GeoGrid) -> ProductResult<WaterMask> {
    let mgrid = &mask.grid;

    for (axis, mask_delta, prod_delta, count) in [
        ("lon", mgrid.delta_lon, product_grid.delta_lon, product_grid.width),
        ("lat", mgrid.delta_lat, product_grid.delta_lat, product_grid.height),
    ] {
        let drift_px = (mask_delta - prod_delta).abs() * count as f64 / prod_delta.abs();
        if drift_px >= 1.0 {
            return Err(ProductError::GridMismatch(format!(
                "{} spacing {} does not match product spacing {} ({:.2} px drift)",
                axis, mask_delta, prod_delta, drift_px
            )));
        }
        if drift_px > 0.5 {
            log::warn!("{} spacing drift of {:.2} px across product extent", axis, drift_px);
        }
    }

    let (col_f, row_f) = mgrid.geo_to_pixel(product_grid.origin_lon, product_grid.origin_lat);
    let col_off = col_f.round();
    let row_off = row_f.round();
    let (rows, cols) = product_grid.shape();

    // Bounds compared in f64: offsets can be arbitrarily large for a distant mask
    if col_off < 0.0
        || row_off < 0.0
        || col_off + cols as f64 > mgrid.width as f64
        || row_off + rows as f64 > mgrid.height as f64
    {
        return Err(ProductError::GridMismatch(format!(
            "water mask {:?} does not cover product extent {:?} (window {}+{} x {}+{} in {}x{})",
            mgrid.extent(),
            product_grid.extent(),
            row_off, rows, col_off, cols,
            mgrid.height, mgrid.width
        )));
    }

    let (r0, c0) = (row_off as usize, col_off as usize);
    log::debug!("Cropping water mask at row {} col {} to {}x{}", r0, c0, rows, cols);

    let data = mask.data.slice(s![.., r0..r0 + rows, c0..c0 + cols]).to_owned();
    GeoRaster::new(*product_grid, data)
}

/// Nearest-neighbour warp of the mask onto the product grid.
///
/// Fails with `GridMismatch` when any product pixel centre falls outside
/// the mask, matching the crop path's coverage requirement.
pub fn warp_nearest(mask: &WaterMask, product_grid: &GeoGrid) -> ProductResult<WaterMask> {
    let (rows, cols) = product_grid.shape();
    let src = mask.band(0);
    let (src_rows, src_cols) = src.dim();
    let mut out = Array2::<i8>::zeros((rows, cols));
    let mut outside = 0usize;

    for i in 0..rows {
        for j in 0..cols {
            let (lon, lat) = product_grid.pixel_to_geo(j as f64 + 0.5, i as f64 + 0.5);
            let (c, r) = mask.grid.geo_to_pixel(lon, lat);
            if c >= 0.0 && r >= 0.0 && (c as usize) < src_cols && (r as usize) < src_rows {
                out[[i, j]] = src[[r as usize, c as usize]];
            } else {
                outside += 1;
            }
        }
    }

    if outside > 0 {
        return Err(ProductError::GridMismatch(format!(
            "water mask {:?} does not cover product extent {:?} ({} of {} pixel centres outside)",
            mask.grid.extent(),
            product_grid.extent(),
            outside,
            rows * cols
        )));
    }

    GeoRaster::from_band(*product_grid, out)
}
