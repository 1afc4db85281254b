// SPDX-License-Identifier: GPL-3.0-only
//! Depth rescaling and color conversion for display
//!
//! Depth images are mapped onto 8 bits for viewing: grayscale keeps the
//! classic linear mapping (near = bright, far = dark), turbo uses a
//! colormap (blue = near, red = far). Pixels without a measurement are
//! rendered black in both modes.

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::constants::{INVALID_DEPTH_MM, display};
use crate::errors::ImageError;
use crate::media::{ImageBuffer, ImageFormat};

/// Colormap used for the depth view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DepthColormap {
    /// Linear gray ramp, produces a `Gray8` image
    #[default]
    Grayscale,
    /// Turbo colormap, produces a `ColorBgra32` image
    Turbo,
}

/// Depth visualization options
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthDisplayOptions {
    pub colormap: DepthColormap,
    /// Depth mapped to the far end of the scale (values above are clamped)
    pub max_depth_mm: u16,
    /// Quantize depth into bands for smoother visualization
    pub quantize_bands: Option<u32>,
}

impl Default for DepthDisplayOptions {
    fn default() -> Self {
        Self {
            colormap: DepthColormap::Grayscale,
            max_depth_mm: display::DEPTH_MAX_MM,
            quantize_bands: None,
        }
    }
}

impl DepthDisplayOptions {
    /// Turbo colormap with the default number of bands
    pub fn turbo() -> Self {
        Self {
            colormap: DepthColormap::Turbo,
            quantize_bands: Some(display::COLORMAP_BANDS),
            ..Self::default()
        }
    }
}

/// Turbo colormap: perceptually uniform rainbow (blue=near, red=far)
///
/// Based on the Google Turbo colormap.
fn turbo(t: f32) -> [u8; 3] {
    let r = (0.13572138
        + t * (4.6153926 + t * (-42.66032 + t * (132.13108 + t * (-152.54825 + t * 59.28144)))))
        .clamp(0.0, 1.0);
    let g = (0.09140261
        + t * (2.19418 + t * (4.84296 + t * (-14.18503 + t * (4.27805 + t * 2.53377)))))
        .clamp(0.0, 1.0);
    let b = (0.1066733
        + t * (12.64194 + t * (-60.58204 + t * (109.99648 + t * (-82.52904 + t * 20.43388)))))
        .clamp(0.0, 1.0);
    [(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8]
}

/// Gray level of the reference linear mapping: `255 - d * 255 / max`
#[inline]
fn linear_gray(d: u16, max_depth_mm: u16) -> u8 {
    if d == INVALID_DEPTH_MM {
        return 0;
    }
    let scaled = 255.0 - d as f32 * 255.0 / max_depth_mm.max(1) as f32;
    scaled.round().clamp(0.0, 255.0) as u8
}

/// Rescale a depth image into a new displayable image
///
/// The input is left untouched. Grayscale yields `Gray8`, turbo yields
/// `ColorBgra32`; both have the depth image's width and height.
pub fn scale_depth_for_display(
    depth: &ImageBuffer,
    options: &DepthDisplayOptions,
) -> Result<ImageBuffer, ImageError> {
    let values = depth.depth_values()?;
    let (width, height) = (depth.width(), depth.height());

    match options.colormap {
        DepthColormap::Grayscale => {
            let gray = values
                .iter()
                .map(|&d| linear_gray(d, options.max_depth_mm))
                .collect();
            ImageBuffer::from_raw(ImageFormat::Gray8, width, height, width, gray)
        }
        DepthColormap::Turbo => {
            let max = options.max_depth_mm.max(1) as f32;
            let mut bgra = Vec::with_capacity(values.len() * 4);
            for &d in &values {
                if d == INVALID_DEPTH_MM {
                    bgra.extend_from_slice(&[0, 0, 0, 255]);
                    continue;
                }
                let mut t = (d as f32 / max).clamp(0.0, 1.0);
                if let Some(bands) = options.quantize_bands.filter(|&b| b > 0) {
                    let bands = bands as f32;
                    t = (t * bands).floor() / bands;
                }
                let [r, g, b] = turbo(t);
                bgra.extend_from_slice(&[b, g, r, 255]);
            }
            ImageBuffer::from_raw(ImageFormat::ColorBgra32, width, height, width * 4, bgra)
        }
    }
}

/// Convert a displayable image to RGB
///
/// Accepts `ColorBgra32` and `Gray8`; depth is rescaled with the default
/// grayscale mapping first. Point cloud buffers have no direct image form.
pub fn to_rgb_image(img: &ImageBuffer) -> Result<RgbImage, ImageError> {
    let (width, height) = (img.width(), img.height());
    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);

    match img.format() {
        ImageFormat::ColorBgra32 => {
            for y in 0..height {
                for px in img.row(y).chunks_exact(4) {
                    rgb.extend_from_slice(&[px[2], px[1], px[0]]);
                }
            }
        }
        ImageFormat::Gray8 => {
            for y in 0..height {
                for &gray in img.row(y) {
                    rgb.extend_from_slice(&[gray, gray, gray]);
                }
            }
        }
        ImageFormat::Depth16 => {
            let scaled = scale_depth_for_display(img, &DepthDisplayOptions::default())?;
            return to_rgb_image(&scaled);
        }
        ImageFormat::CustomXyz16 => {
            return Err(ImageError::WrongFormat {
                expected: "BGRA32, GRAY8 or DEPTH16",
                actual: img.format().name(),
            });
        }
    }

    RgbImage::from_raw(width, height, rgb).ok_or(ImageError::BufferTooSmall {
        expected: width as usize * height as usize * 3,
        actual: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grayscale_reference_mapping() {
        let depth = ImageBuffer::from_depth_values(5, 1, &[0, 1, 2500, 5000, 9000]).unwrap();
        let gray = scale_depth_for_display(&depth, &DepthDisplayOptions::default()).unwrap();

        assert_eq!(gray.format(), ImageFormat::Gray8);
        assert_eq!((gray.width(), gray.height()), (5, 1));
        // Sentinel is black, near is bright, far end and beyond are black
        assert_eq!(gray.as_bytes(), &[0, 255, 128, 0, 0]);
    }

    #[test]
    fn test_turbo_output_is_bgra() {
        let depth = ImageBuffer::from_depth_values(2, 1, &[0, 1000]).unwrap();
        let img = scale_depth_for_display(&depth, &DepthDisplayOptions::turbo()).unwrap();

        assert_eq!(img.format(), ImageFormat::ColorBgra32);
        assert_eq!(img.bgra_at(0, 0), Some([0, 0, 0, 255]));
        assert_eq!(img.bgra_at(1, 0).map(|p| p[3]), Some(255));
    }

    #[test]
    fn test_scale_rejects_color_input() {
        let color = ImageBuffer::new(ImageFormat::ColorBgra32, 2, 2).unwrap();
        assert!(scale_depth_for_display(&color, &DepthDisplayOptions::default()).is_err());
    }

    #[test]
    fn test_bgra_to_rgb_swaps_channels() {
        let img =
            ImageBuffer::from_raw(ImageFormat::ColorBgra32, 1, 1, 4, vec![10, 20, 30, 255]).unwrap();
        let rgb = to_rgb_image(&img).unwrap();
        assert_eq!(rgb.get_pixel(0, 0).0, [30, 20, 10]);
    }

    #[test]
    fn test_turbo_colormap() {
        let start = turbo(0.0);
        let mid = turbo(0.5);
        let end = turbo(1.0);

        assert_ne!(start, mid);
        assert_ne!(mid, end);
        assert_ne!(start, end);

        // End (t=1) should have higher red than start (t=0)
        assert!(end[0] > start[0]);
    }
}
