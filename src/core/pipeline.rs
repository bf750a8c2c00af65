use crate::core::colormap::ColorMap;
use crate::core::compositing::{CompositingEngine, MaskingStats};
use crate::core::mask_align::{AlignmentMethod, MaskAligner};
use crate::core::tile_render::{RenderOutputs, RenderParams, TileRenderer};
use crate::io::product_writer::{ProductFiles, ProductWriter};
use crate::io::raster_files::{load_component_mask, load_phase, load_unwrapped, load_water_mask};
use crate::types::{
    ComponentMask, MaskedProduct, PhaseProduct, ProductError, ProductResult, UnwrappedProduct,
    WaterMask,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Explicit settings for one finalization run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub clim_min: f32,
    pub clim_max: f32,
    pub color_map: String,
    pub nodata_amplitude: f64,
    pub nodata_displacement: f64,
    /// Coarse browse spacing in degrees
    pub browse_pixel_spacing: f64,
    pub tile_size: u32,
    pub layer_name: String,
    pub alignment: AlignmentMethod,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            clim_min: -std::f32::consts::PI,
            clim_max: std::f32::consts::PI,
            color_map: "hsv".to_string(),
            nodata_amplitude: 0.0,
            nodata_displacement: crate::types::INVALID_PHASE as f64,
            browse_pixel_spacing: 0.00416666667,
            tile_size: 256,
            layer_name: "interferogram".to_string(),
            alignment: AlignmentMethod::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> ProductResult<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> ProductResult<Self> {
        log::info!("Loading pipeline configuration from {}", path.display());
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    /// Fail on settings that would break persistence or rendering
    pub fn validate(&self) -> ProductResult<()> {
        ProductWriter::new(self.nodata_amplitude, self.nodata_displacement)?;
        self.render_params()?.validate()
    }

    /// Rendering settings; the nodata colour tracks the displacement sentinel
    pub fn render_params(&self) -> ProductResult<RenderParams> {
        Ok(RenderParams {
            clim_min: self.clim_min,
            clim_max: self.clim_max,
            color_map: ColorMap::from_name(&self.color_map)?,
            nodata: self.nodata_displacement as f32,
            tile_size: self.tile_size,
            browse_pixel_spacing: self.browse_pixel_spacing,
            layer_name: self.layer_name.clone(),
        })
    }
}

/// Rasters already in memory
#[derive(Debug, Clone)]
pub struct PipelineInputs {
    pub phase: PhaseProduct,
    pub unwrapped: UnwrappedProduct,
    /// Water mask at its native resolution
    pub water_mask: WaterMask,
    pub components: ComponentMask,
}

/// Input image XML paths (binaries are found through each XML's `file_name`)
#[derive(Debug, Clone)]
pub struct PipelineInputFiles {
    pub phase_xml: PathBuf,
    pub unwrapped_xml: PathBuf,
    pub water_mask_xml: PathBuf,
    pub components_xml: PathBuf,
}

/// Where the run writes and how outputs are named
#[derive(Debug, Clone)]
pub struct PipelineDestination {
    pub product: ProductFiles,
    pub tiles_root: PathBuf,
    pub browse_dir: PathBuf,
    pub product_id: String,
}

#[derive(Debug, Clone)]
pub struct PipelineOutputs {
    pub masked: MaskedProduct,
    pub stats: MaskingStats,
    pub product: ProductFiles,
    pub render: RenderOutputs,
}

/// Align -> composite -> persist -> render, strictly in sequence
pub struct StandardProductPipeline {
    config: PipelineConfig,
    aligner: MaskAligner,
    engine: CompositingEngine,
    writer: ProductWriter,
}

impl StandardProductPipeline {
    pub fn new(config: PipelineConfig) -> ProductResult<Self> {
        let writer = ProductWriter::new(config.nodata_amplitude, config.nodata_displacement)?;
        Ok(Self {
            aligner: MaskAligner::new(config.alignment),
            // Masked pixels carry exactly the values the VRT nodata tags advertise
            engine: CompositingEngine::with_sentinels(
                config.nodata_amplitude as f32,
                config.nodata_displacement as f32,
            ),
            writer,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Mask in memory without touching the filesystem
    pub fn mask(&self, inputs: PipelineInputs) -> ProductResult<(MaskedProduct, MaskingStats)> {
        let PipelineInputs { phase, unwrapped, water_mask, components } = inputs;
        let aligned = self.aligner.align(&water_mask, &unwrapped.grid)?;
        self.engine.composite(&phase, unwrapped, &aligned, &components)
    }

    /// Run every stage.
    ///
    /// A `Render` error is returned only after the masked product has been
    /// written, so the product files remain valid.
    pub fn run(&self, inputs: PipelineInputs, dest: &PipelineDestination) -> ProductResult<PipelineOutputs> {
        log::info!("Finalizing product {}", dest.product_id);

        let (masked, stats) = self.mask(inputs)?;
        self.writer.write_masked_product(&masked, &dest.product)?;

        let renderer = TileRenderer::new(self.config.render_params()?)?;
        let render = renderer
            .render(&masked, &dest.tiles_root, &dest.browse_dir, &dest.product_id)
            .map_err(|e| {
                log::error!(
                    "Rendering failed for {}; masked product {} is kept: {}",
                    dest.product_id,
                    dest.product.data.display(),
                    e
                );
                e
            })?;

        log::info!(
            "Product {} finalized: {:.2}% valid, {} tiles",
            dest.product_id, stats.valid_percentage, render.pyramid.tile_count
        );
        Ok(PipelineOutputs { masked, stats, product: dest.product.clone(), render })
    }

    /// Load inputs from ISCE image files, then [`run`](Self::run)
    pub fn run_from_files(
        &self,
        files: &PipelineInputFiles,
        dest: &PipelineDestination,
    ) -> ProductResult<PipelineOutputs> {
        let inputs = PipelineInputs {
            phase: load_phase(&files.phase_xml)?,
            unwrapped: load_unwrapped(&files.unwrapped_xml)?,
            water_mask: load_water_mask(&files.water_mask_xml)?,
            components: load_component_mask(&files.components_xml)?,
        };
        if !inputs.phase.grid.same_shape(&inputs.unwrapped.grid) {
            return Err(ProductError::GridMismatch(format!(
                "phase {:?} and unwrapped product {:?} are not co-registered",
                inputs.phase.shape(),
                inputs.unwrapped.shape()
            )));
        }
        self.run(inputs, dest)
    }
}
