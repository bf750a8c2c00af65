use crate::types::{
    ComponentMask, MaskedProduct, PhaseProduct, ProductError, ProductResult, UnwrappedProduct,
    WaterMask, DISPLACEMENT_BAND, INVALID_COMPONENT, INVALID_PHASE, WATER_NODATA,
};
use ndarray::{Array2, ArrayView2, Axis, Zip};
use serde::{Deserialize, Serialize};

/// One masking pass over the phase or the product bands.
///
/// Passes run in the listed order and only ever write sentinels, so a later
/// pass can re-mark a pixel but never restore one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaskPass {
    /// `phase == 0` -> invalid phase
    ZeroPhase,
    /// water/nodata -> invalid phase
    WaterPhase,
    /// water/nodata -> zero in every product band
    WaterBands,
    /// unreliable component -> zero in every product band
    ComponentBands,
    /// unreliable component -> invalid phase
    ComponentPhase,
}

/// Masking order applied by [`CompositingEngine`]
pub const MASKING_PASSES: [MaskPass; 5] = [
    MaskPass::ZeroPhase,
    MaskPass::WaterPhase,
    MaskPass::WaterBands,
    MaskPass::ComponentBands,
    MaskPass::ComponentPhase,
];

/// Per-pass pixel counts and the overall masked fraction
#[derive(Debug, Clone, Default, Serialize)]
pub struct MaskingStats {
    pub total_pixels: usize,
    /// Pixels each pass wrote a sentinel to, in pass order
    pub pass_counts: Vec<(MaskPass, usize)>,
    /// Pixels whose final displacement is the invalid-phase sentinel
    pub invalid_pixels: usize,
    pub valid_percentage: f64,
}

impl MaskingStats {
    pub fn count_for(&self, pass: MaskPass) -> usize {
        self.pass_counts
            .iter()
            .find(|(p, _)| *p == pass)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}

/// Combines the wrapped phase, water mask and component mask into the
/// masked unwrapped product.
#[derive(Debug, Clone)]
pub struct CompositingEngine {
    passes: Vec<MaskPass>,
    /// Written to the phase (and so the displacement band) where invalid
    invalid_phase: f32,
    /// Written to every product band where a mask excludes the pixel
    masked_band_value: f32,
}

impl Default for CompositingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositingEngine {
    pub fn new() -> Self {
        Self::with_sentinels(0.0, INVALID_PHASE)
    }

    /// Engine writing `masked_band_value` into masked band pixels and
    /// `invalid_phase` into masked phase pixels, so exported nodata tags
    /// can match the written values.
    pub fn with_sentinels(masked_band_value: f32, invalid_phase: f32) -> Self {
        Self { passes: MASKING_PASSES.to_vec(), invalid_phase, masked_band_value }
    }

    pub fn invalid_phase(&self) -> f32 {
        self.invalid_phase
    }

    pub fn masked_band_value(&self) -> f32 {
        self.masked_band_value
    }

    pub fn passes(&self) -> &[MaskPass] {
        &self.passes
    }

    /// Mask `product` in place and return it as the masked product.
    ///
    /// All four inputs must share one pixel grid shape; the check runs before
    /// any pixel is touched so a mismatch leaves nothing half-written.
    pub fn composite(
        &self,
        phase: &PhaseProduct,
        mut product: UnwrappedProduct,
        water: &WaterMask,
        components: &ComponentMask,
    ) -> ProductResult<(MaskedProduct, MaskingStats)> {
        check_shapes(phase, &product, water, components)?;

        let (rows, cols) = product.shape();
        log::info!(
            "Compositing {}x{} product ({} bands) with water and component masks",
            rows, cols, product.band_count()
        );

        let mut phase_band = wrapped_phase(phase.band(0));
        let water = water.band(0);
        let components = components.band(0);

        let (invalid, fill) = (self.invalid_phase, self.masked_band_value);
        let mut stats = MaskingStats { total_pixels: rows * cols, ..Default::default() };

        for &pass in &self.passes {
            let written = match pass {
                MaskPass::ZeroPhase => mark_phase(&mut phase_band, invalid, phase_is_zero),
                MaskPass::WaterPhase => mark_where(&mut phase_band, &water, invalid, |&w| w == WATER_NODATA),
                MaskPass::WaterBands => mark_bands(&mut product, &water, fill, |&w| w == WATER_NODATA),
                MaskPass::ComponentBands => mark_bands(&mut product, &components, fill, |&c| c == INVALID_COMPONENT),
                MaskPass::ComponentPhase => mark_where(&mut phase_band, &components, invalid, |&c| c == INVALID_COMPONENT),
            };
            log::debug!("Mask pass {:?}: {} pixels", pass, written);
            stats.pass_counts.push((pass, written));
        }

        product.band_mut(DISPLACEMENT_BAND).assign(&phase_band);

        stats.invalid_pixels = phase_band.iter().filter(|&&p| p == invalid).count();
        stats.valid_percentage = if stats.total_pixels > 0 {
            100.0 * (stats.total_pixels - stats.invalid_pixels) as f64 / stats.total_pixels as f64
        } else {
            0.0
        };

        log::info!(
            "Compositing complete: {} of {} pixels masked ({:.2}% valid)",
            stats.invalid_pixels, stats.total_pixels, stats.valid_percentage
        );

        Ok((product, stats))
    }
}

/// Elementwise `atan2(im, re)`, in `(-pi, pi]`
pub fn wrapped_phase(samples: ArrayView2<'_, crate::types::IfgComplex>) -> Array2<f32> {
    samples.mapv(|c| c.arg())
}

fn phase_is_zero(value: f32) -> bool {
    value == 0.0
}

fn mark_phase(phase: &mut Array2<f32>, sentinel: f32, predicate: impl Fn(f32) -> bool) -> usize {
    let mut written = 0;
    phase.map_inplace(|p| {
        if predicate(*p) {
            *p = sentinel;
            written += 1;
        }
    });
    written
}

fn mark_where<M>(
    target: &mut Array2<f32>,
    mask: &ArrayView2<'_, M>,
    sentinel: f32,
    predicate: impl Fn(&M) -> bool,
) -> usize {
    let mut written = 0;
    Zip::from(target).and(mask).for_each(|t, m| {
        if predicate(m) {
            *t = sentinel;
            written += 1;
        }
    });
    written
}

fn mark_bands<M>(
    product: &mut UnwrappedProduct,
    mask: &ArrayView2<'_, M>,
    fill: f32,
    predicate: impl Fn(&M) -> bool,
) -> usize {
    let written = mask.iter().filter(|m| predicate(m)).count();
    for mut band in product.data.axis_iter_mut(Axis(0)) {
        Zip::from(&mut band).and(mask).for_each(|v, m| {
            if predicate(m) {
                *v = fill;
            }
        });
    }
    written
}

fn check_shapes(
    phase: &PhaseProduct,
    product: &UnwrappedProduct,
    water: &WaterMask,
    components: &ComponentMask,
) -> ProductResult<()> {
    let expected = product.shape();
    if product.band_count() <= DISPLACEMENT_BAND {
        return Err(ProductError::GridMismatch(format!(
            "unwrapped product has {} band(s), need amplitude and displacement",
            product.band_count()
        )));
    }
    for (name, shape) in [
        ("wrapped phase", phase.shape()),
        ("water mask", water.shape()),
        ("connected component mask", components.shape()),
    ] {
        if shape != expected {
            return Err(ProductError::GridMismatch(format!(
                "{} is {}x{} but unwrapped product is {}x{}",
                name, shape.0, shape.1, expected.0, expected.1
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GeoGrid, GeoRaster, IfgComplex, AMPLITUDE_BAND};
    use approx::assert_relative_eq;
    use ndarray::Array3;

    fn grid(rows: usize, cols: usize) -> GeoGrid {
        GeoGrid::new(-118.0, 35.0, 0.001, -0.001, cols, rows)
    }

    fn inputs(rows: usize, cols: usize) -> (PhaseProduct, UnwrappedProduct, WaterMask, ComponentMask) {
        let g = grid(rows, cols);
        let phase = GeoRaster::from_band(g, Array2::from_elem((rows, cols), IfgComplex::new(1.0, 1.0))).unwrap();
        let mut bands = Array3::<f32>::zeros((2, rows, cols));
        bands.index_axis_mut(Axis(0), AMPLITUDE_BAND).fill(5.0);
        bands.index_axis_mut(Axis(0), DISPLACEMENT_BAND).fill(1.0);
        let product = GeoRaster::new(g, bands).unwrap();
        let water = GeoRaster::from_band(g, Array2::<i8>::zeros((rows, cols))).unwrap();
        let cc = GeoRaster::from_band(g, Array2::<i32>::ones((rows, cols))).unwrap();
        (phase, product, water, cc)
    }

    #[test]
    fn test_pass_order() {
        let engine = CompositingEngine::new();
        assert_eq!(engine.passes(), &MASKING_PASSES);
    }

    #[test]
    fn test_component_row_masked() {
        let (phase, product, water, mut cc) = inputs(4, 4);
        cc.band_mut(0).row_mut(0).fill(0);

        let (masked, stats) = CompositingEngine::new()
            .composite(&phase, product, &water, &cc)
            .unwrap();

        for j in 0..4 {
            assert_eq!(masked.band(AMPLITUDE_BAND)[[0, j]], 0.0);
            assert_eq!(masked.band(DISPLACEMENT_BAND)[[0, j]], INVALID_PHASE);
        }
        for i in 1..4 {
            for j in 0..4 {
                assert_eq!(masked.band(AMPLITUDE_BAND)[[i, j]], 5.0);
                assert_relative_eq!(
                    masked.band(DISPLACEMENT_BAND)[[i, j]],
                    std::f32::consts::FRAC_PI_4,
                    epsilon = 1e-6
                );
            }
        }
        assert_eq!(stats.invalid_pixels, 4);
        assert_eq!(stats.count_for(MaskPass::WaterPhase), 0);
        assert_eq!(stats.count_for(MaskPass::ComponentPhase), 4);
        assert_relative_eq!(stats.valid_percentage, 75.0);
    }

    #[test]
    fn test_water_and_zero_phase() {
        let (mut phase, product, mut water, cc) = inputs(3, 3);
        water.band_mut(0)[[1, 1]] = WATER_NODATA;
        phase.band_mut(0)[[2, 0]] = IfgComplex::new(0.0, 0.0);
        phase.band_mut(0)[[2, 2]] = IfgComplex::new(3.0, 0.0);

        let (masked, stats) = CompositingEngine::new()
            .composite(&phase, product, &water, &cc)
            .unwrap();

        let dis = masked.band(DISPLACEMENT_BAND);
        let amp = masked.band(AMPLITUDE_BAND);
        assert_eq!(dis[[1, 1]], INVALID_PHASE);
        assert_eq!(amp[[1, 1]], 0.0);
        // Zero phase is invalid but the amplitude survives
        assert_eq!(dis[[2, 0]], INVALID_PHASE);
        assert_eq!(amp[[2, 0]], 5.0);
        assert_eq!(dis[[2, 2]], INVALID_PHASE);
        assert_eq!(stats.count_for(MaskPass::ZeroPhase), 2);
        assert_eq!(stats.count_for(MaskPass::WaterBands), 1);
    }

    #[test]
    fn test_later_pass_remarks_earlier_pixels() {
        let (phase, product, mut water, mut cc) = inputs(2, 2);
        water.band_mut(0)[[0, 0]] = WATER_NODATA;
        cc.band_mut(0)[[0, 0]] = 0;
        cc.band_mut(0)[[1, 1]] = 0;

        let (masked, stats) = CompositingEngine::new()
            .composite(&phase, product, &water, &cc)
            .unwrap();

        assert_eq!(stats.count_for(MaskPass::WaterPhase), 1);
        assert_eq!(stats.count_for(MaskPass::ComponentPhase), 2);
        assert_eq!(stats.invalid_pixels, 2);
        assert_eq!(masked.band(DISPLACEMENT_BAND)[[1, 1]], INVALID_PHASE);
        assert_eq!(masked.band(AMPLITUDE_BAND)[[1, 1]], 0.0);
    }

    #[test]
    fn test_configured_sentinels_are_written() {
        let (phase, product, mut water, mut cc) = inputs(3, 3);
        water.band_mut(0)[[0, 0]] = WATER_NODATA;
        cc.band_mut(0)[[2, 2]] = 0;

        let engine = CompositingEngine::with_sentinels(-1.0, -9999.0);
        let (masked, stats) = engine.composite(&phase, product, &water, &cc).unwrap();

        for (i, j) in [(0, 0), (2, 2)] {
            assert_eq!(masked.band(AMPLITUDE_BAND)[[i, j]], -1.0);
            assert_eq!(masked.band(DISPLACEMENT_BAND)[[i, j]], -9999.0);
        }
        assert!(!masked.band(DISPLACEMENT_BAND).iter().any(|&v| v == INVALID_PHASE));
        assert_eq!(stats.invalid_pixels, 2);
    }

    #[test]
    fn test_unmasked_phase_matches_arg_over_full_range() {
        let samples = [
            IfgComplex::new(-1.0, 0.0),
            IfgComplex::new(0.0, -1.0),
            IfgComplex::new(-1.0, 1e-4),
            IfgComplex::new(-1.0, -1e-4),
            IfgComplex::new(-3.0, 2.0),
            IfgComplex::new(0.5, -0.25),
            IfgComplex::new(0.0, 2.0),
            IfgComplex::new(1e-3, -7.0),
            IfgComplex::new(4.0, 1.0),
        ];
        let (_, product, water, cc) = inputs(3, 3);
        let phase = GeoRaster::from_band(
            grid(3, 3),
            Array2::from_shape_vec((3, 3), samples.to_vec()).unwrap(),
        )
        .unwrap();

        let (masked, stats) = CompositingEngine::new()
            .composite(&phase, product, &water, &cc)
            .unwrap();
        let dis = masked.band(DISPLACEMENT_BAND);

        assert_eq!(stats.invalid_pixels, 0);
        for (k, sample) in samples.iter().enumerate() {
            let value = dis[[k / 3, k % 3]];
            assert_relative_eq!(value, sample.arg(), epsilon = 1e-6);
            assert!(value > -std::f32::consts::PI && value <= std::f32::consts::PI);
        }
        assert_relative_eq!(dis[[0, 0]], std::f32::consts::PI, epsilon = 1e-6);
        assert_relative_eq!(dis[[0, 1]], -std::f32::consts::FRAC_PI_2, epsilon = 1e-6);
    }

    #[test]
    fn test_masking_holds_for_arbitrary_values() {
        // Deterministic pseudo-random fill (64-bit LCG)
        let mut state = 0x2545_f491_4f6c_dd1du64;
        let mut next = move || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((state >> 33) as f32 / (1u64 << 31) as f32) * 2.0 - 1.0
        };

        let (rows, cols) = (12, 9);
        let g = grid(rows, cols);
        let phase_data = Array2::from_shape_fn((rows, cols), |_| IfgComplex::new(next() * 50.0, next() * 50.0));
        let bands = Array3::from_shape_fn((2, rows, cols), |_| next() * 1e4);
        let water_data = Array2::from_shape_fn((rows, cols), |_| if next() > 0.6 { WATER_NODATA } else { (next() > 0.0) as i8 });
        let cc_data = Array2::from_shape_fn((rows, cols), |_| if next() > 0.5 { 0 } else { 1 + (next().abs() * 5.0) as i32 });

        let phase = GeoRaster::from_band(g, phase_data.clone()).unwrap();
        let product = GeoRaster::new(g, bands).unwrap();
        let water = GeoRaster::from_band(g, water_data.clone()).unwrap();
        let cc = GeoRaster::from_band(g, cc_data.clone()).unwrap();

        let (masked, _) = CompositingEngine::new()
            .composite(&phase, product, &water, &cc)
            .unwrap();

        let mut masked_count = 0;
        for i in 0..rows {
            for j in 0..cols {
                let dis = masked.band(DISPLACEMENT_BAND)[[i, j]];
                if water_data[[i, j]] == WATER_NODATA || cc_data[[i, j]] == INVALID_COMPONENT {
                    masked_count += 1;
                    assert_eq!(dis, INVALID_PHASE);
                    assert_eq!(masked.band(AMPLITUDE_BAND)[[i, j]], 0.0);
                } else {
                    assert_relative_eq!(dis, phase_data[[i, j]].arg(), epsilon = 1e-6);
                }
            }
        }
        assert!(masked_count > 0 && masked_count < rows * cols);
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let (phase, product, _, cc) = inputs(4, 4);
        let water = GeoRaster::from_band(grid(3, 4), Array2::<i8>::zeros((3, 4))).unwrap();
        let result = CompositingEngine::new().composite(&phase, product, &water, &cc);
        assert!(matches!(result, Err(ProductError::GridMismatch(_))));
    }

    #[test]
    fn test_single_band_product_rejected() {
        let (phase, _, water, cc) = inputs(2, 2);
        let product = GeoRaster::from_band(grid(2, 2), Array2::<f32>::zeros((2, 2))).unwrap();
        let result = CompositingEngine::new().composite(&phase, product, &water, &cc);
        assert!(matches!(result, Err(ProductError::GridMismatch(_))));
    }
}
