//! Pixel analysis for component elision.
//!
//! Before packing, the source is scanned to find channels that carry no
//! information: colour channels that never differ by more than
//! `COLOUR_THRESHOLD` (the image is effectively grayscale) and an alpha
//! channel that holds the same value everywhere. Dropping those components
//! shrinks the encoded file.
//!
//! Both scans are pure and stop at the first pixel that disproves them.

use crate::source::PixelSource;

/// Largest per-pair colour difference still treated as gray.
pub const COLOUR_THRESHOLD: i32 = 3;

/// Check whether the first three channels of every pixel agree within
/// `COLOUR_THRESHOLD`.
///
/// # Arguments
///
/// * `pixels` - Interleaved pixel data, row-major
/// * `pitch` - Bytes per scanline
/// * `bytes_per_pixel` - Interleaved channels per pixel (3 or 4)
/// * `width` - Image width in pixels
/// * `height` - Image height in pixels
///
/// # Returns
///
/// `false` at the first pixel whose R/G, R/B or G/B difference exceeds the
/// threshold, `true` after a full scan. Sources with fewer than three
/// channels have no colour to disagree and return `true`.
pub fn is_mono(
    pixels: &[u8],
    pitch: usize,
    bytes_per_pixel: usize,
    width: usize,
    height: usize,
) -> bool {
    if bytes_per_pixel < 3 || pitch == 0 {
        return true;
    }

    for row in pixels.chunks(pitch).take(height) {
        for px in row.chunks_exact(bytes_per_pixel).take(width) {
            let r = px[0] as i32;
            let g = px[1] as i32;
            let b = px[2] as i32;

            if (r - g).abs() > COLOUR_THRESHOLD
                || (r - b).abs() > COLOUR_THRESHOLD
                || (g - b).abs() > COLOUR_THRESHOLD
            {
                return false;
            }
        }
    }

    true
}

/// Check whether one channel holds the same value in every pixel.
///
/// The value at the first pixel is the reference; the scan returns `false`
/// as soon as any pixel differs. A `channel_offset` outside the pixel is
/// trivially redundant.
pub fn is_channel_redundant(
    channel_offset: usize,
    pixels: &[u8],
    pitch: usize,
    bytes_per_pixel: usize,
    width: usize,
    height: usize,
) -> bool {
    if channel_offset >= bytes_per_pixel || pitch == 0 {
        return true;
    }

    let Some(&first) = pixels.get(channel_offset) else {
        return true;
    };

    for row in pixels.chunks(pitch).take(height) {
        for px in row.chunks_exact(bytes_per_pixel).take(width) {
            if px[channel_offset] != first {
                return false;
            }
        }
    }

    true
}

/// Result of analysing a source before packing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Analysis {
    /// Colour channels are redundant; pack a single luma component
    pub mono: bool,
    /// Alpha carries information and gets its own component
    pub save_alpha: bool,
}

/// Analyse a pixel source for redundant colour and alpha channels.
pub fn analyze(source: &PixelSource) -> Analysis {
    let bpp = source.bytes_per_pixel();
    let pitch = source.pitch();
    let (width, height) = (source.width() as usize, source.height() as usize);

    let mono = source.is_gray() || is_mono(source.data(), pitch, bpp, width, height);

    let mut save_alpha = source.has_alpha();
    if save_alpha && is_channel_redundant(bpp - 1, source.data(), pitch, bpp, width, height) {
        log::info!("Uniform alpha channel discarded; use layer transparency instead");
        save_alpha = false;
    }

    log::debug!(
        "Analysed {}x{} source ({} channels): mono={}, save_alpha={}",
        width,
        height,
        bpp,
        mono,
        save_alpha
    );

    Analysis { mono, save_alpha }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb(pixels: &[[u8; 3]]) -> Vec<u8> {
        pixels.iter().flatten().copied().collect()
    }

    #[test]
    fn test_gray_pixels_are_mono() {
        let data = rgb(&[[10, 10, 10], [200, 200, 200], [0, 0, 0], [255, 255, 255]]);
        assert!(is_mono(&data, 6, 3, 2, 2));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let data = rgb(&[[100, 103, 100]]);
        assert!(is_mono(&data, 3, 3, 1, 1));

        let data = rgb(&[[100, 104, 100]]);
        assert!(!is_mono(&data, 3, 3, 1, 1));
    }

    #[test]
    fn test_red_blue_difference_detected() {
        let data = rgb(&[[50, 50, 50], [50, 52, 54]]);
        assert!(!is_mono(&data, 6, 3, 2, 1));
    }

    #[test]
    fn test_mono_skips_alpha_byte() {
        // Alpha differs wildly from colour; only RGB is compared.
        let data = vec![80, 80, 80, 0, 81, 80, 79, 255];
        assert!(is_mono(&data, 8, 4, 2, 1));
    }

    #[test]
    fn test_mono_ignores_padding_past_width() {
        // Pitch of 8 with a 2-pixel-wide RGB row leaves 2 padding bytes.
        let data = vec![1, 1, 1, 2, 2, 2, 0, 255, 3, 3, 3, 4, 4, 4, 255, 0];
        assert!(is_mono(&data, 8, 3, 2, 2));
    }

    #[test]
    fn test_channel_redundant_uniform() {
        let data = vec![1, 2, 3, 255, 4, 5, 6, 255];
        assert!(is_channel_redundant(3, &data, 8, 4, 2, 1));
    }

    #[test]
    fn test_channel_redundant_detects_change() {
        let data = vec![1, 2, 3, 255, 4, 5, 6, 254];
        assert!(!is_channel_redundant(3, &data, 8, 4, 2, 1));
    }

    #[test]
    fn test_single_pixel_channel_always_redundant() {
        let data = vec![9, 8, 7, 42];
        assert!(is_channel_redundant(3, &data, 4, 4, 1, 1));
    }

    #[test]
    fn test_channel_offset_outside_pixel() {
        let data = vec![1, 2, 3];
        assert!(is_channel_redundant(3, &data, 3, 3, 1, 1));
    }

    #[test]
    fn test_analyze_rgba_with_uniform_alpha() {
        let source = PixelSource::new(2, 1, 4, vec![10, 200, 30, 255, 40, 50, 60, 255]).unwrap();
        let analysis = analyze(&source);

        assert!(!analysis.mono);
        assert!(!analysis.save_alpha);
    }

    #[test]
    fn test_analyze_gray_alpha_keeps_varying_alpha() {
        let source = PixelSource::new(2, 1, 2, vec![10, 0, 20, 128]).unwrap();
        let analysis = analyze(&source);

        assert!(analysis.mono);
        assert!(analysis.save_alpha);
    }

    #[test]
    fn test_analyze_gray_rgb() {
        let source = PixelSource::new(2, 2, 3, vec![128u8; 12]).unwrap();
        assert_eq!(
            analyze(&source),
            Analysis {
                mono: true,
                save_alpha: false
            }
        );
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================
