//! Codec-native planar images.
//!
//! A `PlanarImage` stores one contiguous sample array per component, with the
//! precision, signedness and subsampling metadata the codec works with. It is
//! what the packer produces for encoding and what the decoder hands back.

use image::{DynamicImage, RgbImage, RgbaImage};
use thiserror::Error;

/// A decoded image layout the host cannot take.
#[derive(Debug, Error)]
#[error("Unsupported decoded image: {0}")]
pub struct UnsupportedLayout(pub String);

/// Colour space declared for the component set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpace {
    #[default]
    Unspecified,
    Srgb,
    Gray,
    /// Any other codec colour space (YCC, CMYK, ...)
    Other,
}

/// One image component (plane).
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    /// Plane width in samples
    pub width: u32,
    /// Plane height in samples
    pub height: u32,
    /// Horizontal subsampling on the reference grid
    pub dx: u32,
    /// Vertical subsampling on the reference grid
    pub dy: u32,
    /// Bits per sample
    pub precision: u32,
    pub signed: bool,
    /// Row-major samples, `width * height` long
    pub data: Vec<i32>,
}

impl Component {
    /// An unsigned 8-bit plane filled with zeros.
    pub fn new_u8(width: u32, height: u32, dx: u32, dy: u32) -> Self {
        Self {
            width,
            height,
            dx,
            dy,
            precision: 8,
            signed: false,
            data: vec![0; width as usize * height as usize],
        }
    }

    /// Sample at `index` narrowed to 8 bits.
    #[inline]
    fn sample_u8(&self, index: usize) -> u8 {
        let mut value = self.data[index];
        if self.signed && self.precision > 0 {
            value += 1 << (self.precision - 1);
        }
        let value = if self.precision > 8 {
            value >> (self.precision - 8)
        } else {
            value << (8 - self.precision)
        };
        value.clamp(0, 255) as u8
    }
}

/// A planar image on the codec's reference grid.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanarImage {
    /// Left edge of the image area on the reference grid
    pub x0: u32,
    /// Top edge of the image area on the reference grid
    pub y0: u32,
    /// Right edge (exclusive)
    pub x1: u32,
    /// Bottom edge (exclusive)
    pub y1: u32,
    pub color_space: ColorSpace,
    pub components: Vec<Component>,
}

impl PlanarImage {
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Mono with alpha, or RGB with alpha.
    pub fn has_alpha(&self) -> bool {
        matches!(self.components.len(), 2 | 4)
    }

    /// Image size in pixels of the first component.
    pub fn dimensions(&self) -> (u32, u32) {
        match self.components.first() {
            Some(first) => (
                ceil_div(self.x1.saturating_sub(self.x0), first.dx),
                ceil_div(self.y1.saturating_sub(self.y0), first.dy),
            ),
            None => (0, 0),
        }
    }

    /// Check that every component shares subsampling and precision with the
    /// first and carries a full plane of samples.
    pub fn check_layout(&self) -> Result<(), UnsupportedLayout> {
        let Some(first) = self.components.first() else {
            return Err(UnsupportedLayout("no components".to_string()));
        };

        for (i, comp) in self.components.iter().enumerate() {
            if comp.dx != first.dx || comp.dy != first.dy {
                return Err(UnsupportedLayout(format!(
                    "component {} subsampling {}x{} differs from {}x{}",
                    i, comp.dx, comp.dy, first.dx, first.dy
                )));
            }
            if comp.precision != first.precision {
                return Err(UnsupportedLayout(format!(
                    "component {} precision {} differs from {}",
                    i, comp.precision, first.precision
                )));
            }
            if comp.data.len() < comp.width as usize * comp.height as usize {
                return Err(UnsupportedLayout(format!("component {} is missing samples", i)));
            }
        }

        Ok(())
    }

    pub fn is_supported(&self) -> bool {
        self.check_layout().is_ok()
    }

    /// Convert to an 8-bit host image.
    ///
    /// Gray and gray+alpha are expanded to RGB and RGBA; samples of any
    /// precision are scaled to 8 bits.
    pub fn to_dynamic_image(&self) -> Result<DynamicImage, UnsupportedLayout> {
        self.check_layout()?;

        let first = &self.components[0];
        let (width, height) = (first.width, first.height);
        let pixel_count = width as usize * height as usize;
        let count = self.components.len();
        let gray = count < 3;
        let out_channels = if self.has_alpha() { 4 } else { 3 };

        if count > 4 {
            return Err(UnsupportedLayout(format!("{} components", count)));
        }
        if self.components.iter().any(|c| c.width != width || c.height != height) {
            return Err(UnsupportedLayout("component planes differ in size".to_string()));
        }

        let mut buf = Vec::with_capacity(pixel_count * out_channels);
        for i in 0..pixel_count {
            if gray {
                let luma = first.sample_u8(i);
                buf.extend_from_slice(&[luma, luma, luma]);
            } else {
                for comp in &self.components[..3] {
                    buf.push(comp.sample_u8(i));
                }
            }
            if let Some(alpha) = self.components.get(count - 1).filter(|_| self.has_alpha()) {
                buf.push(alpha.sample_u8(i));
            }
        }

        let image = if out_channels == 4 {
            RgbaImage::from_raw(width, height, buf).map(DynamicImage::ImageRgba8)
        } else {
            RgbImage::from_raw(width, height, buf).map(DynamicImage::ImageRgb8)
        };

        image.ok_or_else(|| UnsupportedLayout("pixel buffer size mismatch".to_string()))
    }
}

/// Divide and round upwards.
#[inline]
pub(crate) fn ceil_div(a: u32, b: u32) -> u32 {
    if b == 0 {
        return 0;
    }
    a.div_ceil(b)
}
