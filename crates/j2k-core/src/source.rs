//! Host pixel extraction.
//!
//! The editor hands over a pixel rectangle as raw bytes plus a channel layout
//! descriptor (`HostImage`). `prepare` validates it and produces the
//! `PixelSource` the rest of the pipeline consumes.

use image::DynamicImage;
use thiserror::Error;

/// Errors raised while extracting pixels from the host.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Indexed colour drawables are rejected outright.
    #[error("Indexed colour images are not supported (use PNG instead)")]
    Indexed,

    /// Component count outside 1..=4
    #[error("Unsupported component count: {0} (expected 1 to 4)")]
    InvalidComponentCount(usize),

    /// Pixel data length doesn't match the declared dimensions
    #[error("Invalid pixel data: expected {expected} bytes ({width}x{height}x{components}), got {actual}")]
    InvalidPixelData {
        width: u32,
        height: u32,
        components: usize,
        expected: usize,
        actual: usize,
    },
}

/// Channel layout of a host drawable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    /// 8-bit luma
    Gray,
    /// 8-bit luma + alpha
    GrayAlpha,
    /// 8-bit RGB
    Rgb,
    /// 8-bit RGBA
    Rgba,
    /// Palette indices
    Indexed,
    /// Palette indices + alpha
    IndexedAlpha,
}

impl ChannelLayout {
    /// Bytes per pixel in the host buffer.
    pub fn channels(self) -> usize {
        match self {
            ChannelLayout::Gray | ChannelLayout::Indexed => 1,
            ChannelLayout::GrayAlpha | ChannelLayout::IndexedAlpha => 2,
            ChannelLayout::Rgb => 3,
            ChannelLayout::Rgba => 4,
        }
    }

    pub fn is_indexed(self) -> bool {
        matches!(self, ChannelLayout::Indexed | ChannelLayout::IndexedAlpha)
    }
}

/// A pixel rectangle as the host editor exposes it.
#[derive(Debug, Clone)]
pub struct HostImage {
    pub width: u32,
    pub height: u32,
    pub layout: ChannelLayout,
    /// Row-major interleaved bytes, `layout.channels()` per pixel
    pub bytes: Vec<u8>,
}

impl HostImage {
    pub fn new(width: u32, height: u32, layout: ChannelLayout, bytes: Vec<u8>) -> Self {
        Self {
            width,
            height,
            layout,
            bytes,
        }
    }

    /// Build a host image from an `image` crate buffer.
    ///
    /// 8-bit gray, gray+alpha, RGB and RGBA buffers are taken as-is; deeper
    /// formats are narrowed to 8 bits per channel.
    pub fn from_dynamic(image: &DynamicImage) -> Self {
        let (width, height) = (image.width(), image.height());
        let (layout, bytes) = match image {
            DynamicImage::ImageLuma8(img) => (ChannelLayout::Gray, img.as_raw().clone()),
            DynamicImage::ImageLumaA8(img) => (ChannelLayout::GrayAlpha, img.as_raw().clone()),
            DynamicImage::ImageRgb8(img) => (ChannelLayout::Rgb, img.as_raw().clone()),
            DynamicImage::ImageRgba8(img) => (ChannelLayout::Rgba, img.as_raw().clone()),
            other => {
                let color = other.color();
                match (color.has_color(), color.has_alpha()) {
                    (true, true) => (ChannelLayout::Rgba, other.to_rgba8().into_raw()),
                    (true, false) => (ChannelLayout::Rgb, other.to_rgb8().into_raw()),
                    (false, true) => (ChannelLayout::GrayAlpha, other.to_luma_alpha8().into_raw()),
                    (false, false) => (ChannelLayout::Gray, other.to_luma8().into_raw()),
                }
            }
        };

        Self::new(width, height, layout, bytes)
    }
}

/// Interleaved 8-bit pixels ready for analysis and packing.
#[derive(Debug, Clone)]
pub struct PixelSource {
    width: u32,
    height: u32,
    components: usize,
    data: Vec<u8>,
}

impl PixelSource {
    /// Create a pixel source, validating the component count and buffer size.
    pub fn new(
        width: u32,
        height: u32,
        components: usize,
        data: Vec<u8>,
    ) -> Result<Self, SourceError> {
        if !(1..=4).contains(&components) {
            return Err(SourceError::InvalidComponentCount(components));
        }

        let expected = (width as usize) * (height as usize) * components;
        if data.len() != expected {
            return Err(SourceError::InvalidPixelData {
                width,
                height,
                components,
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            width,
            height,
            components,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of interleaved channels (1-4).
    pub fn components(&self) -> usize {
        self.components
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.components
    }

    /// Bytes per scanline.
    pub fn pitch(&self) -> usize {
        self.width as usize * self.components
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Gray or gray+alpha layout.
    pub fn is_gray(&self) -> bool {
        self.components < 3
    }

    /// Whether the last channel is alpha (2 or 4 components).
    pub fn has_alpha(&self) -> bool {
        self.components == 2 || self.components == 4
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Extract the pixel rectangle of a host image.
///
/// # Errors
///
/// Returns `SourceError::Indexed` for palette images (no conversion fallback)
/// and `SourceError::InvalidPixelData` when the buffer length doesn't match
/// the declared dimensions.
pub fn prepare(host: &HostImage) -> Result<PixelSource, SourceError> {
    if host.layout.is_indexed() {
        return Err(SourceError::Indexed);
    }

    PixelSource::new(host.width, host.height, host.layout.channels(), host.bytes.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_rgb() {
        let host = HostImage::new(2, 2, ChannelLayout::Rgb, vec![128u8; 12]);
        let source = prepare(&host).unwrap();

        assert_eq!(source.width(), 2);
        assert_eq!(source.height(), 2);
        assert_eq!(source.components(), 3);
        assert_eq!(source.pitch(), 6);
        assert!(!source.has_alpha());
        assert!(!source.is_gray());
    }

    #[test]
    fn test_prepare_rejects_indexed() {
        let host = HostImage::new(2, 2, ChannelLayout::Indexed, vec![0u8; 4]);
        assert!(matches!(prepare(&host), Err(SourceError::Indexed)));

        let host = HostImage::new(2, 2, ChannelLayout::IndexedAlpha, vec![0u8; 8]);
        assert!(matches!(prepare(&host), Err(SourceError::Indexed)));
    }

    #[test]
    fn test_prepare_rejects_short_buffer() {
        let host = HostImage::new(4, 4, ChannelLayout::Rgba, vec![0u8; 63]);
        assert!(matches!(
            prepare(&host),
            Err(SourceError::InvalidPixelData {
                expected: 64,
                actual: 63,
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_component_count() {
        assert!(matches!(
            PixelSource::new(1, 1, 5, vec![0u8; 5]),
            Err(SourceError::InvalidComponentCount(5))
        ));
        assert!(matches!(
            PixelSource::new(1, 1, 0, vec![]),
            Err(SourceError::InvalidComponentCount(0))
        ));
    }

    #[test]
    fn test_zero_sized_source_is_empty() {
        let source = PixelSource::new(0, 10, 3, vec![]).unwrap();
        assert!(source.is_empty());
    }

    #[test]
    fn test_alpha_layouts() {
        let gray_alpha = PixelSource::new(1, 1, 2, vec![1, 2]).unwrap();
        assert!(gray_alpha.is_gray());
        assert!(gray_alpha.has_alpha());

        let rgba = PixelSource::new(1, 1, 4, vec![1, 2, 3, 4]).unwrap();
        assert!(!rgba.is_gray());
        assert!(rgba.has_alpha());
    }

    #[test]
    fn test_from_dynamic_keeps_8bit_layouts() {
        let rgba = image::RgbaImage::from_pixel(3, 2, image::Rgba([1, 2, 3, 4]));
        let host = HostImage::from_dynamic(&DynamicImage::ImageRgba8(rgba));

        assert_eq!(host.layout, ChannelLayout::Rgba);
        assert_eq!(host.bytes.len(), 3 * 2 * 4);
        assert_eq!(&host.bytes[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_from_dynamic_narrows_16bit() {
        let img = image::ImageBuffer::<image::Luma<u16>, Vec<u16>>::from_pixel(
            2,
            2,
            image::Luma([65535]),
        );
        let host = HostImage::from_dynamic(&DynamicImage::ImageLuma16(img));

        assert_eq!(host.layout, ChannelLayout::Gray);
        assert_eq!(host.bytes, vec![255u8; 4]);
    }
}
