//! PNG encoding for tiles and browse images.

use crate::types::{ProductError, ProductResult};
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, ImageEncoder, RgbaImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Write an RGBA8 image as PNG.
///
/// Compression and filter settings are fixed so identical pixels always
/// encode to identical bytes.
pub fn write_png_rgba8(path: &Path, image: &RgbaImage) -> ProductResult<()> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(ProductError::Render(format!(
            "refusing to write empty {}x{} PNG to {}",
            width,
            height,
            path.display()
        )));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = File::create(path)?;
    let encoder = PngEncoder::new_with_quality(
        BufWriter::new(file),
        CompressionType::Default,
        FilterType::Adaptive,
    );
    encoder.write_image(image.as_raw(), width, height, ColorType::Rgba8)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_png_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("px.png");
        let img = RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, 255]));
        write_png_rgba8(&path, &img).unwrap();

        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded, img);
    }

    #[test]
    fn test_empty_image_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let img = RgbaImage::new(0, 0);
        assert!(write_png_rgba8(&dir.path().join("x.png"), &img).is_err());
    }
}
