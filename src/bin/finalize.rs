use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, info, warn};
use std::path::PathBuf;
use topsprod::core::{
    AlignmentMethod, PipelineConfig, PipelineDestination, PipelineInputFiles,
    StandardProductPipeline,
};
use topsprod::io::ProductFiles;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Alignment {
    /// Percentage resample to the product spacing, then crop
    ResampleCrop,
    /// Nearest-neighbour warp onto the product grid
    Warp,
}

impl From<Alignment> for AlignmentMethod {
    fn from(value: Alignment) -> Self {
        match value {
            Alignment::ResampleCrop => AlignmentMethod::ResampleAndCrop,
            Alignment::Warp => AlignmentMethod::NearestWarp,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Mask, persist and render a geocoded interferogram product", long_about = None)]
struct Cli {
    /// Wrapped interferogram image XML (complex, e.g. filt_topophase.flat.geo.xml)
    #[arg(long)]
    phase: PathBuf,

    /// Unwrapped product image XML (2 bands: amplitude, displacement)
    #[arg(long)]
    unwrapped: PathBuf,

    /// Water-body mask image XML at any resolution
    #[arg(long)]
    water_mask: PathBuf,

    /// Connected-component image XML on the product grid
    #[arg(long)]
    components: PathBuf,

    /// Product identifier used to name browse images
    #[arg(long)]
    product_id: String,

    /// Directory for the masked product files
    #[arg(long)]
    output_dir: PathBuf,

    /// Masked product binary name
    #[arg(long, default_value = "filt_topophase.masked.unw.geo")]
    stem: String,

    /// Tile pyramid root (default: <output-dir>/tiles)
    #[arg(long)]
    tiles_dir: Option<PathBuf>,

    /// Browse image directory (default: <output-dir>)
    #[arg(long)]
    browse_dir: Option<PathBuf>,

    /// JSON pipeline configuration; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, allow_hyphen_values = true)]
    clim_min: Option<f32>,

    #[arg(long, allow_hyphen_values = true)]
    clim_max: Option<f32>,

    /// Colour map: hsv, jet or gray
    #[arg(long)]
    color_map: Option<String>,

    #[arg(long, value_enum)]
    alignment: Option<Alignment>,

    /// Also write the colour-mapped layer as an RGBA GeoTIFF (needs the `gdal` feature)
    #[arg(long)]
    geotiff: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    debug!("Parsed CLI args: {:?}", cli);

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(v) = cli.clim_min {
        config.clim_min = v;
    }
    if let Some(v) = cli.clim_max {
        config.clim_max = v;
    }
    if let Some(name) = &cli.color_map {
        config.color_map = name.clone();
    }
    if let Some(alignment) = cli.alignment {
        config.alignment = alignment.into();
    }
    config.validate().context("invalid pipeline configuration")?;

    let inputs = PipelineInputFiles {
        phase_xml: cli.phase.clone(),
        unwrapped_xml: cli.unwrapped.clone(),
        water_mask_xml: cli.water_mask.clone(),
        components_xml: cli.components.clone(),
    };
    let dest = PipelineDestination {
        product: ProductFiles::in_dir(&cli.output_dir, &cli.stem),
        tiles_root: cli.tiles_dir.clone().unwrap_or_else(|| cli.output_dir.join("tiles")),
        browse_dir: cli.browse_dir.clone().unwrap_or_else(|| cli.output_dir.clone()),
        product_id: cli.product_id.clone(),
    };

    let pipeline = StandardProductPipeline::new(config)?;
    let outputs = match pipeline.run_from_files(&inputs, &dest) {
        Ok(outputs) => outputs,
        Err(e) if !e.is_fatal_to_product() => {
            warn!("Masked product written to {}", dest.product.data.display());
            return Err(e).context("rendering failed after the product was persisted");
        }
        Err(e) => return Err(e).context("product finalization failed"),
    };

    #[cfg(not(feature = "gdal"))]
    if cli.geotiff {
        warn!("--geotiff ignored: built without the gdal feature");
    }

    #[cfg(feature = "gdal")]
    if cli.geotiff {
        let renderer = topsprod::core::TileRenderer::new(pipeline.config().render_params()?)?;
        let rgba = renderer.colorize(outputs.masked.band(topsprod::types::DISPLACEMENT_BAND));
        let path = dest
            .browse_dir
            .join(format!("{}.{}.tif", dest.product_id, pipeline.config().layer_name));
        topsprod::io::gdal_raster::write_geotiff_rgba(&path, &rgba, &outputs.masked.grid)?;
    }

    info!(
        "Done: {} ({:.2}% valid), tiles in {}, browse {} / {}",
        outputs.product.data.display(),
        outputs.stats.valid_percentage,
        outputs.render.tiles_dir.display(),
        outputs.render.browse_coarse.display(),
        outputs.render.browse_full.display()
    );
    Ok(())
}
