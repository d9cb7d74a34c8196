//! Interleaved → planar component packing.
//!
//! Splits an analysed `PixelSource` into the codec's planar layout, dropping
//! redundant components, optionally flipping the scanline order and
//! reordering BGR sources.

use crate::planar::{ColorSpace, Component, PlanarImage};
use crate::source::PixelSource;

/// How a source is laid out into components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackOptions {
    /// Write a single luma component instead of three colour components
    pub mono: bool,
    /// Write the source's alpha channel as the last component
    pub save_alpha: bool,
    /// Source bytes are R, G, B (false = B, G, R)
    pub colour_order_rgb: bool,
    /// Read scanlines bottom-up
    pub flip_vertically: bool,
    /// Horizontal subsampling
    pub dx: u32,
    /// Vertical subsampling
    pub dy: u32,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            mono: false,
            save_alpha: false,
            colour_order_rgb: true,
            flip_vertically: false,
            dx: 1,
            dy: 1,
        }
    }
}

/// Number of components written for the given elision flags.
pub fn component_count(mono: bool, save_alpha: bool) -> usize {
    match (mono, save_alpha) {
        (true, false) => 1,
        (true, true) => 2,
        (false, false) => 3,
        (false, true) => 4,
    }
}

/// Pack interleaved pixels into planar components.
///
/// # Layout
///
/// * Mono colour sources take the third byte of each pixel as luma (the
///   first two are known to match it); gray sources take the first byte.
/// * Colour sources fill planes 0, 1, 2 as R, G, B; BGR sources are
///   swapped into the same order.
/// * With `save_alpha` the source's last byte goes to the final plane.
///   Otherwise a 4-byte pixel's last byte is stepped over unread.
///
/// `save_alpha` is ignored for sources without an alpha channel.
pub fn pack(source: &PixelSource, options: &PackOptions) -> PlanarImage {
    let width = source.width();
    let height = source.height();
    let bpp = source.bytes_per_pixel();
    let pitch = source.pitch();
    let dx = options.dx.max(1);
    let dy = options.dy.max(1);

    let mono = options.mono || source.is_gray();
    let save_alpha = options.save_alpha && source.has_alpha();
    let numcomps = component_count(mono, save_alpha);

    let mut planes: Vec<Component> = (0..numcomps)
        .map(|_| Component::new_u8(width, height, dx, dy))
        .collect();

    let luma_offset = if source.is_gray() { 0 } else { 2 };
    let alpha_offset = bpp - 1;
    let alpha_plane = numcomps - 1;
    let (red_plane, blue_plane) = if options.colour_order_rgb { (0, 2) } else { (2, 0) };

    let w = width as usize;
    let h = height as usize;
    let data = source.data();

    for y in 0..h {
        let src_y = if options.flip_vertically { h - 1 - y } else { y };
        let row = &data[src_y * pitch..src_y * pitch + w * bpp];

        for (x, px) in row.chunks_exact(bpp).enumerate() {
            let index = y * w + x;

            if mono {
                planes[0].data[index] = px[luma_offset] as i32;
            } else {
                planes[red_plane].data[index] = px[0] as i32;
                planes[1].data[index] = px[1] as i32;
                planes[blue_plane].data[index] = px[2] as i32;
            }

            if save_alpha {
                planes[alpha_plane].data[index] = px[alpha_offset] as i32;
            }
        }
    }

    PlanarImage {
        x0: 0,
        y0: 0,
        x1: grid_extent(width, dx),
        y1: grid_extent(height, dy),
        color_space: if mono { ColorSpace::Gray } else { ColorSpace::Srgb },
        components: planes,
    }
}

/// Reference grid extent covering `samples` at subsampling `d`.
fn grid_extent(samples: u32, d: u32) -> u32 {
    if samples == 0 {
        0
    } else {
        (samples - 1) * d + 1
    }
}


// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// Strategy for an RGBA source with dimensions.
    fn rgba_strategy() -> impl Strategy<Value = (u32, u32, Vec<u8>)> {
        (1u32..=16, 1u32..=16).prop_flat_map(|(w, h)| {
            let size = (w * h * 4) as usize;
            (Just(w), Just(h), prop::collection::vec(any::<u8>(), size..=size))
        })
    }

    proptest! {
        /// Property: without save_alpha a 4-byte source yields exactly three
        /// planes and each plane samples its own byte of a 4-byte stride.
        #[test]
        fn prop_rgba_without_alpha_strides_four((w, h, data) in rgba_strategy()) {
            let src = PixelSource::new(w, h, 4, data.clone()).unwrap();
            let img = pack(&src, &PackOptions::default());

            prop_assert_eq!(img.component_count(), 3);
            for (i, px) in data.chunks_exact(4).enumerate() {
                prop_assert_eq!(img.components[0].data[i], px[0] as i32);
                prop_assert_eq!(img.components[1].data[i], px[1] as i32);
                prop_assert_eq!(img.components[2].data[i], px[2] as i32);
            }
        }

        /// Property: every plane is width * height samples.
        #[test]
        fn prop_plane_sizes(
            (w, h, data) in rgba_strategy(),
            mono in any::<bool>(),
            save_alpha in any::<bool>(),
        ) {
            let src = PixelSource::new(w, h, 4, data).unwrap();
            let options = PackOptions { mono, save_alpha, ..PackOptions::default() };
            let img = pack(&src, &options);

            prop_assert_eq!(img.component_count(), component_count(mono, save_alpha));
            for comp in &img.components {
                prop_assert_eq!(comp.data.len(), (w * h) as usize);
                prop_assert_eq!(comp.precision, 8);
                prop_assert!(!comp.signed);
            }
        }

        /// Property: a flipped pack holds the same rows in reverse order.
        #[test]
        fn prop_flip_reverses_rows((w, h, data) in rgba_strategy()) {
            let src = PixelSource::new(w, h, 4, data).unwrap();
            let straight = pack(&src, &PackOptions::default());
            let options = PackOptions {
                flip_vertically: true,
                ..PackOptions::default()
            };
            let flipped = pack(&src, &options);

            let w = w as usize;
            let h = h as usize;
            for y in 0..h {
                for x in 0..w {
                    prop_assert_eq!(
                        straight.components[1].data[y * w + x],
                        flipped.components[1].data[(h - 1 - y) * w + x]
                    );
                }
            }
        }
    }
}
