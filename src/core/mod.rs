//! Product finalization stages

pub mod colormap;
pub mod compositing;
pub mod grid_ratio;
pub mod mask_align;
pub mod pipeline;
pub mod tile_render;

// Re-export main types
pub use colormap::ColorMap;
pub use compositing::{CompositingEngine, MaskPass, MaskingStats, MASKING_PASSES};
pub use grid_ratio::GridRatio;
pub use mask_align::{AlignmentMethod, MaskAligner, NearestResampler, ResampleOutput, Resampler};
pub use pipeline::{
    PipelineConfig, PipelineDestination, PipelineInputFiles, PipelineInputs, PipelineOutputs,
    StandardProductPipeline,
};
pub use tile_render::{RenderOutputs, RenderParams, TilePyramid, TileRenderer};
