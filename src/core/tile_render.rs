use crate::core::colormap::ColorMap;
use crate::io::png_writer::write_png_rgba8;
use crate::types::{GeoGrid, MaskedProduct, ProductError, ProductResult, DISPLACEMENT_BAND};
use image::{Rgba, RgbaImage};
use ndarray::ArrayView2;
use serde::Serialize;
use std::path::{Path, PathBuf};

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Visualization parameters for the displacement layer
#[derive(Debug, Clone)]
pub struct RenderParams {
    pub clim_min: f32,
    pub clim_max: f32,
    pub color_map: ColorMap,
    /// Displacement value rendered as transparent
    pub nodata: f32,
    /// Tile edge length in pixels
    pub tile_size: u32,
    /// Coarse browse pixel spacing in degrees
    pub browse_pixel_spacing: f64,
    /// Layer name used for the tile directory and browse file names
    pub layer_name: String,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            clim_min: -std::f32::consts::PI,
            clim_max: std::f32::consts::PI,
            color_map: ColorMap::Hsv,
            nodata: crate::types::INVALID_PHASE,
            tile_size: 256,
            browse_pixel_spacing: 0.00416666667,
            layer_name: "interferogram".to_string(),
        }
    }
}

impl RenderParams {
    pub fn validate(&self) -> ProductResult<()> {
        if !(self.clim_min.is_finite() && self.clim_max.is_finite()) || self.clim_min >= self.clim_max {
            return Err(ProductError::Render(format!(
                "degenerate clip range [{}, {}]",
                self.clim_min, self.clim_max
            )));
        }
        if self.tile_size == 0 {
            return Err(ProductError::Render("tile size must be positive".to_string()));
        }
        if !(self.browse_pixel_spacing.is_finite() && self.browse_pixel_spacing > 0.0) {
            return Err(ProductError::Render(format!(
                "invalid browse pixel spacing {}",
                self.browse_pixel_spacing
            )));
        }
        if !is_single_dir_name(&self.layer_name) {
            return Err(ProductError::Render(format!("invalid layer name '{}'", self.layer_name)));
        }
        Ok(())
    }
}

/// True when `name` is exactly one plain path component, so joining it to
/// the tiles root can never address the root itself or anything above it.
fn is_single_dir_name(name: &str) -> bool {
    if name.contains(|c: char| c == '/' || c == '\\') {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(std::path::Component::Normal(_)), None)
    )
}

/// Tile pyramid description written next to the tiles as `tilemap.json`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TilePyramid {
    pub layer: String,
    pub tile_size: u32,
    pub min_zoom: u32,
    pub max_zoom: u32,
    pub width: usize,
    pub height: usize,
    pub bounds: [f64; 4],
    pub clim: [f32; 2],
    pub color_map: String,
    pub nodata: f32,
    pub tile_count: usize,
}

/// Files produced by one rendering run
#[derive(Debug, Clone)]
pub struct RenderOutputs {
    pub tiles_dir: PathBuf,
    pub pyramid: TilePyramid,
    pub browse_coarse: PathBuf,
    pub browse_full: PathBuf,
    pub sidecars_removed: usize,
}

/// Renders the masked displacement band into tiles and browse images
pub struct TileRenderer {
    params: RenderParams,
}

impl TileRenderer {
    pub fn new(params: RenderParams) -> ProductResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &RenderParams {
        &self.params
    }

    /// Render tiles under `tiles_root/<layer>` and browse images into
    /// `browse_dir`, named from `product_id`.
    pub fn render(
        &self,
        product: &MaskedProduct,
        tiles_root: &Path,
        browse_dir: &Path,
        product_id: &str,
    ) -> ProductResult<RenderOutputs> {
        if product.band_count() <= DISPLACEMENT_BAND {
            return Err(ProductError::Render(format!(
                "masked product has {} band(s), no displacement band to render",
                product.band_count()
            )));
        }

        log::info!(
            "Rendering {} layer: clim [{}, {}], colormap {}, nodata {}",
            self.params.layer_name,
            self.params.clim_min,
            self.params.clim_max,
            self.params.color_map.name(),
            self.params.nodata
        );

        let rgba = self.colorize(product.band(DISPLACEMENT_BAND));

        let tiles_dir = tiles_root.join(&self.params.layer_name);
        let pyramid = self.write_tile_pyramid(&rgba, &product.grid, &tiles_dir)?;

        std::fs::create_dir_all(browse_dir)?;
        let browse_coarse = browse_dir.join(format!(
            "{}.{}.browse_coarse.png",
            product_id, self.params.layer_name
        ));
        let browse_full = browse_dir.join(format!(
            "{}.{}.browse_full.png",
            product_id, self.params.layer_name
        ));

        let (coarse_w, coarse_h) = self.coarse_browse_size(&product.grid);
        log::info!("Writing coarse browse {}x{} to {}", coarse_w, coarse_h, browse_coarse.display());
        write_png_rgba8(&browse_coarse, &downsample_average(&rgba, coarse_w, coarse_h))?;

        log::info!("Writing full browse {}x{} to {}", rgba.width(), rgba.height(), browse_full.display());
        write_png_rgba8(&browse_full, &rgba)?;

        let sidecars_removed = remove_browse_sidecars(browse_dir, product_id);

        Ok(RenderOutputs { tiles_dir, pyramid, browse_coarse, browse_full, sidecars_removed })
    }

    /// Map clipped displacement values through the colour map; nodata and
    /// NaN become fully transparent.
    pub fn colorize(&self, band: ArrayView2<'_, f32>) -> RgbaImage {
        let (rows, cols) = band.dim();
        let span = self.params.clim_max - self.params.clim_min;
        let mut img = RgbaImage::new(cols as u32, rows as u32);

        for ((i, j), &value) in band.indexed_iter() {
            let pixel = if value.is_nan() || value == self.params.nodata {
                TRANSPARENT
            } else {
                let t = (value - self.params.clim_min) / span;
                let [r, g, b] = self.params.color_map.rgb(t);
                Rgba([r, g, b, 255])
            };
            img.put_pixel(j as u32, i as u32, pixel);
        }
        img
    }

    /// Browse size at the fixed coarse pixel spacing (at least 1x1)
    pub fn coarse_browse_size(&self, grid: &GeoGrid) -> (u32, u32) {
        let spacing = self.params.browse_pixel_spacing;
        let w = (grid.width as f64 * grid.delta_lon.abs() / spacing).round().max(1.0);
        let h = (grid.height as f64 * grid.delta_lat.abs() / spacing).round().max(1.0);
        (w as u32, h as u32)
    }

    /// Number of zoom levels above the coarsest single-tile level
    pub fn max_zoom(&self, width: u32, height: u32) -> u32 {
        let largest = width.max(height) as u64;
        let mut zoom = 0;
        while (self.params.tile_size as u64) << zoom < largest {
            zoom += 1;
        }
        zoom
    }

    /// Write `{dir}/{z}/{x}/{y}.png` for every zoom level plus `tilemap.json`.
    ///
    /// Level `max_zoom` is full resolution; each level below halves it.
    pub fn write_tile_pyramid(
        &self,
        rgba: &RgbaImage,
        grid: &GeoGrid,
        dir: &Path,
    ) -> ProductResult<TilePyramid> {
        if dir.exists() {
            log::debug!("Replacing existing tile directory {}", dir.display());
            std::fs::remove_dir_all(dir)?;
        }
        std::fs::create_dir_all(dir)?;

        let ts = self.params.tile_size;
        let max_zoom = self.max_zoom(rgba.width(), rgba.height());
        let mut tile_count = 0;

        for zoom in 0..=max_zoom {
            let factor = 1u32 << (max_zoom - zoom);
            let level_w = rgba.width().div_ceil(factor);
            let level_h = rgba.height().div_ceil(factor);
            let level = if factor == 1 {
                rgba.clone()
            } else {
                downsample_average(rgba, level_w, level_h)
            };

            let tiles_x = level_w.div_ceil(ts);
            let tiles_y = level_h.div_ceil(ts);
            log::debug!("Zoom {}: {}x{} px, {}x{} tiles", zoom, level_w, level_h, tiles_x, tiles_y);

            for tx in 0..tiles_x {
                for ty in 0..tiles_y {
                    let tile = extract_tile(&level, tx * ts, ty * ts, ts);
                    let path = dir
                        .join(zoom.to_string())
                        .join(tx.to_string())
                        .join(format!("{}.png", ty));
                    write_png_rgba8(&path, &tile)?;
                    tile_count += 1;
                }
            }
        }

        let bbox = grid.extent();
        let pyramid = TilePyramid {
            layer: self.params.layer_name.clone(),
            tile_size: ts,
            min_zoom: 0,
            max_zoom,
            width: grid.width,
            height: grid.height,
            bounds: [bbox.min_lon, bbox.min_lat, bbox.max_lon, bbox.max_lat],
            clim: [self.params.clim_min, self.params.clim_max],
            color_map: self.params.color_map.name().to_string(),
            nodata: self.params.nodata,
            tile_count,
        };
        std::fs::write(dir.join("tilemap.json"), serde_json::to_string_pretty(&pyramid)?)?;

        log::info!(
            "Wrote {} tiles over zoom 0..={} to {}",
            tile_count, max_zoom, dir.display()
        );
        Ok(pyramid)
    }
}

/// Copy a `size`x`size` window; pixels past the image edge stay transparent
fn extract_tile(level: &RgbaImage, x0: u32, y0: u32, size: u32) -> RgbaImage {
    let mut tile = RgbaImage::from_pixel(size, size, TRANSPARENT);
    let w = size.min(level.width().saturating_sub(x0));
    let h = size.min(level.height().saturating_sub(y0));
    for y in 0..h {
        for x in 0..w {
            tile.put_pixel(x, y, *level.get_pixel(x0 + x, y0 + y));
        }
    }
    tile
}

/// Box-average resample to `out_w`x`out_h`.
///
/// Colour is averaged over non-transparent source pixels only; alpha is the
/// mean over the whole window. Integer arithmetic keeps output reproducible.
pub fn downsample_average(src: &RgbaImage, out_w: u32, out_h: u32) -> RgbaImage {
    let (w, h) = (src.width() as u64, src.height() as u64);
    let (ow, oh) = (out_w.max(1) as u64, out_h.max(1) as u64);
    let mut out = RgbaImage::from_pixel(ow as u32, oh as u32, TRANSPARENT);

    for oy in 0..oh {
        let y0 = oy * h / oh;
        let y1 = ((oy + 1) * h).div_ceil(oh).max(y0 + 1).min(h);
        for ox in 0..ow {
            let x0 = ox * w / ow;
            let x1 = ((ox + 1) * w).div_ceil(ow).max(x0 + 1).min(w);

            let mut rgb = [0u64; 3];
            let mut alpha = 0u64;
            let mut opaque = 0u64;
            let mut total = 0u64;
            for y in y0..y1 {
                for x in x0..x1 {
                    let p = src.get_pixel(x as u32, y as u32).0;
                    total += 1;
                    alpha += p[3] as u64;
                    if p[3] > 0 {
                        opaque += 1;
                        for c in 0..3 {
                            rgb[c] += p[c] as u64;
                        }
                    }
                }
            }
            if opaque == 0 {
                continue;
            }
            let avg = |sum: u64, n: u64| ((sum + n / 2) / n) as u8;
            out.put_pixel(
                ox as u32,
                oy as u32,
                Rgba([avg(rgb[0], opaque), avg(rgb[1], opaque), avg(rgb[2], opaque), avg(alpha, total)]),
            );
        }
    }
    out
}

/// Delete `{id}.*.browse*.aux.xml` files left by image exporters.
///
/// Best effort: failures are logged and skipped.
pub fn remove_browse_sidecars(dir: &Path, product_id: &str) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Could not scan {} for browse sidecars: {}", dir.display(), e);
            return 0;
        }
    };

    let prefix = format!("{}.", product_id);
    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        let is_sidecar = name.starts_with(&prefix)
            && name.ends_with(".aux.xml")
            && name[prefix.len()..].contains(".browse");
        if !is_sidecar {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => {
                log::debug!("Removed browse sidecar {}", name);
                removed += 1;
            }
            Err(e) => log::warn!("Failed to remove browse sidecar {}: {}", name, e),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GeoRaster, INVALID_PHASE};
    use ndarray::{Array2, Array3};

    fn product(rows: usize, cols: usize) -> MaskedProduct {
        let grid = GeoGrid::new(-118.0, 35.0, 0.001, -0.001, cols, rows);
        let mut data = Array3::<f32>::zeros((2, rows, cols));
        data.index_axis_mut(ndarray::Axis(0), DISPLACEMENT_BAND)
            .assign(&Array2::from_shape_fn((rows, cols), |(i, j)| ((i + j) as f32 * 0.1) - 1.0));
        GeoRaster::new(grid, data).unwrap()
    }

    #[test]
    fn test_degenerate_clim_is_render_error() {
        let params = RenderParams { clim_min: 1.0, clim_max: 1.0, ..Default::default() };
        assert!(matches!(TileRenderer::new(params), Err(ProductError::Render(_))));
    }

    #[test]
    fn test_layer_name_must_be_one_plain_component() {
        for name in ["", ".", "..", "a/b", "../tiles", "a\\b", "/abs"] {
            let params = RenderParams { layer_name: name.to_string(), ..Default::default() };
            assert!(
                matches!(params.validate(), Err(ProductError::Render(_))),
                "layer name {:?} accepted",
                name
            );
        }
        for name in ["interferogram", "unw.phase", "..hidden"] {
            let params = RenderParams { layer_name: name.to_string(), ..Default::default() };
            assert!(params.validate().is_ok(), "layer name {:?} rejected", name);
        }
    }

    #[test]
    fn test_colorize_nodata_transparent() {
        let renderer = TileRenderer::new(RenderParams::default()).unwrap();
        let band = Array2::from_shape_vec((1, 3), vec![INVALID_PHASE, f32::NAN, 0.5]).unwrap();
        let img = renderer.colorize(band.view());
        assert_eq!(img.get_pixel(0, 0).0[3], 0);
        assert_eq!(img.get_pixel(1, 0).0[3], 0);
        assert_eq!(img.get_pixel(2, 0).0[3], 255);
    }

    #[test]
    fn test_max_zoom() {
        let params = RenderParams { tile_size: 4, ..Default::default() };
        let renderer = TileRenderer::new(params).unwrap();
        assert_eq!(renderer.max_zoom(4, 3), 0);
        assert_eq!(renderer.max_zoom(5, 3), 1);
        assert_eq!(renderer.max_zoom(16, 9), 2);
    }

    #[test]
    fn test_coarse_size() {
        let renderer = TileRenderer::new(RenderParams::default()).unwrap();
        let grid = GeoGrid::new(0.0, 0.0, 0.000833333, -0.000833333, 1000, 501);
        assert_eq!(renderer.coarse_browse_size(&grid), (200, 100));
    }

    #[test]
    fn test_downsample_ignores_transparent_colour() {
        let mut src = RgbaImage::from_pixel(2, 2, TRANSPARENT);
        src.put_pixel(0, 0, Rgba([200, 100, 0, 255]));
        src.put_pixel(1, 0, Rgba([100, 100, 100, 255]));
        let out = downsample_average(&src, 1, 1);
        assert_eq!(out.get_pixel(0, 0).0, [150, 100, 50, 128]);
    }

    #[test]
    fn test_render_writes_pyramid_and_browse() {
        let dir = tempfile::tempdir().unwrap();
        let params = RenderParams { tile_size: 4, browse_pixel_spacing: 0.002, ..Default::default() };
        let renderer = TileRenderer::new(params).unwrap();
        let out = renderer
            .render(&product(6, 10), &dir.path().join("tiles"), dir.path(), "S1-GUNW-TEST")
            .unwrap();

        assert_eq!(out.pyramid.max_zoom, 2);
        // zoom 0: 3x2 px -> 1 tile, zoom 1: 5x3 -> 2x1, zoom 2: 10x6 -> 3x2
        assert_eq!(out.pyramid.tile_count, 1 + 2 + 6);
        assert!(out.tiles_dir.join("2").join("2").join("1.png").exists());
        assert!(out.tiles_dir.join("tilemap.json").exists());

        let coarse = image::open(&out.browse_coarse).unwrap();
        assert_eq!((coarse.width(), coarse.height()), (5, 3));
        let full = image::open(&out.browse_full).unwrap();
        assert_eq!((full.width(), full.height()), (10, 6));
    }

    #[test]
    fn test_sidecar_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let keep = dir.path().join("ID.interferogram.browse_full.png");
        let drop = dir.path().join("ID.interferogram.browse_full.png.aux.xml");
        let other = dir.path().join("OTHER.interferogram.browse_full.png.aux.xml");
        for p in [&keep, &drop, &other] {
            std::fs::write(p, b"x").unwrap();
        }
        assert_eq!(remove_browse_sidecars(dir.path(), "ID"), 1);
        assert!(keep.exists());
        assert!(!drop.exists());
        assert!(other.exists());
    }
}
