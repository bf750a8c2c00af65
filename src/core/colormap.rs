//! Colour maps for the interferogram visualization layer.

use crate::types::{ProductError, ProductResult};
use serde::{Deserialize, Serialize};

/// Built-in colour map names (case-insensitive on lookup).
pub static SUPPORTED: [&str; 3] = ["hsv", "jet", "gray"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMap {
    /// Cyclic hue wheel; one fringe maps to one full turn
    Hsv,
    Jet,
    Gray,
}

impl ColorMap {
    pub fn from_name(name: &str) -> ProductResult<Self> {
        match name.to_lowercase().as_str() {
            "hsv" => Ok(ColorMap::Hsv),
            "jet" => Ok(ColorMap::Jet),
            "gray" | "grey" => Ok(ColorMap::Gray),
            _ => Err(ProductError::Render(format!(
                "Unknown colormap '{}'. Supported: {}",
                name,
                SUPPORTED.join(", ")
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ColorMap::Hsv => "hsv",
            ColorMap::Jet => "jet",
            ColorMap::Gray => "gray",
        }
    }

    /// RGB for a normalized position `t` in `[0, 1]` (clamped)
    pub fn rgb(&self, t: f32) -> [u8; 3] {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        match self {
            ColorMap::Hsv => hue_to_rgb(t),
            ColorMap::Jet => jet(t),
            ColorMap::Gray => {
                let v = to_u8(t);
                [v, v, v]
            }
        }
    }
}

/// Full-saturation, full-value hue wheel starting and ending at red
fn hue_to_rgb(t: f32) -> [u8; 3] {
    let h = (t * 6.0) % 6.0;
    let x = 1.0 - ((h % 2.0) - 1.0).abs();
    let (r, g, b) = match h as u32 {
        0 => (1.0, x, 0.0),
        1 => (x, 1.0, 0.0),
        2 => (0.0, 1.0, x),
        3 => (0.0, x, 1.0),
        4 => (x, 0.0, 1.0),
        _ => (1.0, 0.0, x),
    };
    [to_u8(r), to_u8(g), to_u8(b)]
}

fn jet(t: f32) -> [u8; 3] {
    let channel = |offset: f32| (1.5 - (4.0 * t - offset).abs()).clamp(0.0, 1.0);
    [to_u8(channel(3.0)), to_u8(channel(2.0)), to_u8(channel(1.0))]
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(ColorMap::from_name("HSV").unwrap(), ColorMap::Hsv);
        assert_eq!(ColorMap::from_name("grey").unwrap(), ColorMap::Gray);
        assert!(matches!(ColorMap::from_name("viridis"), Err(ProductError::Render(_))));
    }

    #[test]
    fn test_hsv_is_cyclic() {
        let cmap = ColorMap::Hsv;
        assert_eq!(cmap.rgb(0.0), [255, 0, 0]);
        assert_eq!(cmap.rgb(1.0), [255, 0, 0]);
        assert_eq!(cmap.rgb(1.0 / 3.0), [0, 255, 0]);
        assert_eq!(cmap.rgb(2.0 / 3.0), [0, 0, 255]);
    }

    #[test]
    fn test_jet_and_gray_endpoints() {
        assert_eq!(ColorMap::Jet.rgb(0.0), [0, 0, 128]);
        assert_eq!(ColorMap::Jet.rgb(1.0), [128, 0, 0]);
        assert_eq!(ColorMap::Gray.rgb(0.0), [0, 0, 0]);
        assert_eq!(ColorMap::Gray.rgb(2.0), [255, 255, 255]);
    }
}
