// SPDX-License-Identifier: GPL-3.0-only

//! Owned image buffers passed between pipeline stages
//!
//! Every stage allocates a fresh buffer for its output; consumers only
//! borrow. Multi-byte samples are stored in native byte order.

use crate::errors::ImageError;
use crate::backends::camera::RawImage;

/// Pixel layout of an [`ImageBuffer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    /// 8-bit blue, green, red, alpha
    ColorBgra32,
    /// 16-bit depth in millimeters, 0 = no measurement
    Depth16,
    /// Three signed 16-bit coordinates (x, y, z) in millimeters
    CustomXyz16,
    /// 8-bit single channel, used for display
    Gray8,
}

impl ImageFormat {
    /// Bytes per pixel
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            ImageFormat::ColorBgra32 => 4,
            ImageFormat::Depth16 => 2,
            ImageFormat::CustomXyz16 => 6,
            ImageFormat::Gray8 => 1,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ImageFormat::ColorBgra32 => "BGRA32",
            ImageFormat::Depth16 => "DEPTH16",
            ImageFormat::CustomXyz16 => "XYZ16",
            ImageFormat::Gray8 => "GRAY8",
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Width, height, stride, pixel format and the bytes themselves
#[derive(Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    width: u32,
    height: u32,
    stride: u32,
    format: ImageFormat,
    data: Vec<u8>,
}

impl std::fmt::Debug for ImageBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ImageBuffer({} {}x{}, stride {})",
            self.format, self.width, self.height, self.stride
        )
    }
}

impl ImageBuffer {
    /// Zero-filled buffer with tightly packed rows
    pub fn new(format: ImageFormat, width: u32, height: u32) -> Result<Self, ImageError> {
        if width == 0 || height == 0 {
            return Err(ImageError::ZeroSized { width, height });
        }
        let stride = width * format.bytes_per_pixel();
        Ok(Self {
            width,
            height,
            stride,
            format,
            data: vec![0; stride as usize * height as usize],
        })
    }

    /// Wrap existing bytes after validating the layout
    pub fn from_raw(
        format: ImageFormat,
        width: u32,
        height: u32,
        stride: u32,
        data: Vec<u8>,
    ) -> Result<Self, ImageError> {
        validate_layout(format, width, height, stride, data.len())?;
        Ok(Self {
            width,
            height,
            stride,
            format,
            data,
        })
    }

    /// Copy a backend image out into an owned, tightly packed buffer
    ///
    /// The result shares nothing with the capture, so the capture can be
    /// released right after.
    pub fn copy_from(raw: &RawImage) -> Result<Self, ImageError> {
        validate_layout(raw.format, raw.width, raw.height, raw.stride, raw.data.len())?;
        let row_bytes = (raw.width * raw.format.bytes_per_pixel()) as usize;
        let mut data = Vec::with_capacity(row_bytes * raw.height as usize);
        for row in raw.data.chunks(raw.stride as usize).take(raw.height as usize) {
            data.extend_from_slice(&row[..row_bytes]);
        }
        Ok(Self {
            width: raw.width,
            height: raw.height,
            stride: row_bytes as u32,
            format: raw.format,
            data,
        })
    }

    /// Build a depth image from millimeter values in row-major order
    pub fn from_depth_values(width: u32, height: u32, values: &[u16]) -> Result<Self, ImageError> {
        let expected = width as usize * height as usize;
        if values.len() != expected {
            return Err(ImageError::BufferTooSmall {
                expected: expected * 2,
                actual: values.len() * 2,
            });
        }
        Self::from_raw(
            ImageFormat::Depth16,
            width,
            height,
            width * 2,
            bytemuck::cast_slice(values).to_vec(),
        )
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row, including padding
    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Fail with `WrongFormat` unless the buffer has `expected` layout
    pub fn require_format(&self, expected: ImageFormat) -> Result<(), ImageError> {
        if self.format != expected {
            return Err(ImageError::WrongFormat {
                expected: expected.name(),
                actual: self.format.name(),
            });
        }
        Ok(())
    }

    /// Pixel bytes of row `y` without padding
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride as usize;
        let len = (self.width * self.format.bytes_per_pixel()) as usize;
        &self.data[start..start + len]
    }

    /// Depth value at `(x, y)`, `None` outside the image or for non-depth buffers
    pub fn depth_at(&self, x: u32, y: u32) -> Option<u16> {
        if self.format != ImageFormat::Depth16 || x >= self.width || y >= self.height {
            return None;
        }
        let offset = y as usize * self.stride as usize + x as usize * 2;
        Some(u16::from_ne_bytes([self.data[offset], self.data[offset + 1]]))
    }

    /// All depth values in row-major order
    pub fn depth_values(&self) -> Result<Vec<u16>, ImageError> {
        self.require_format(ImageFormat::Depth16)?;
        let mut values = Vec::with_capacity(self.width as usize * self.height as usize);
        for y in 0..self.height {
            values.extend(bytemuck::pod_collect_to_vec::<u8, u16>(self.row(y)));
        }
        Ok(values)
    }

    /// BGRA pixel at `(x, y)`
    pub fn bgra_at(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if self.format != ImageFormat::ColorBgra32 || x >= self.width || y >= self.height {
            return None;
        }
        let offset = y as usize * self.stride as usize + x as usize * 4;
        let px = &self.data[offset..offset + 4];
        Some([px[0], px[1], px[2], px[3]])
    }
}

fn validate_layout(
    format: ImageFormat,
    width: u32,
    height: u32,
    stride: u32,
    len: usize,
) -> Result<(), ImageError> {
    if width == 0 || height == 0 {
        return Err(ImageError::ZeroSized { width, height });
    }
    let row_bytes = width * format.bytes_per_pixel();
    if stride < row_bytes {
        return Err(ImageError::StrideTooSmall { stride, row_bytes });
    }
    // The last row does not need trailing padding
    let expected = stride as usize * (height as usize - 1) + row_bytes as usize;
    if len < expected {
        return Err(ImageError::BufferTooSmall {
            expected,
            actual: len,
        });
    }
    Ok(())
}
