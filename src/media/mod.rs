// SPDX-License-Identifier: GPL-3.0-only

//! Image buffers and display conversion
//!
//! # Modules
//!
//! - [`image`](self::image): Owned image buffers (BGRA32 color, 16-bit depth, XYZ16 points)
//! - [`visualization`]: Depth rescaling and RGB conversion for presenters

pub mod image;
pub mod visualization;

// Re-export commonly used types
pub use self::image::{ImageBuffer, ImageFormat};
pub use visualization::{DepthColormap, DepthDisplayOptions, scale_depth_for_display, to_rgb_image};
