//! J2K Core - JPEG 2000 export and import for image editor pixel buffers
//!
//! This crate turns an editor's interleaved pixel rectangle into JPEG 2000
//! output and back, and drives the live export preview that re-encodes the
//! image in the background while the export dialog is open.
//!
//! # Module Structure
//!
//! - `source` - Host pixel extraction (`HostImage` → `PixelSource`)
//! - `analyze` - Redundant colour / alpha channel detection
//! - `pack` - Interleaved → planar component packing
//! - `planar` - Codec-native planar image and host injection
//! - `codec` - OpenJPEG adapter over single-chunk memory streams
//! - `serialize` - Export/import orchestration and output sinks
//! - `preview` - Background preview worker and UI idle consumer
//! - `config` / `defaults` - Pipeline configuration and persisted defaults
//!
//! # Pipeline
//!
//! ```text
//! HostImage ─prepare─► PixelSource ─analyze─► Analysis
//!                           │                    │
//!                           └──────pack──────────┘
//!                                   │
//!                              PlanarImage ─codec─► bytes ─► Sink
//! ```

pub mod analyze;
pub mod codec;
pub mod config;
pub mod defaults;
pub mod pack;
pub mod planar;
pub mod preview;
pub mod serialize;
pub mod source;

pub use analyze::{analyze, is_channel_redundant, is_mono, Analysis};
pub use codec::{
    CodecAdapter, CodecError, CodecStage, Container, MemoryStream, StreamError, StreamIo,
};
pub use config::ExportConfig;
pub use defaults::{DefaultsError, DefaultsStore, DEFAULTS_VERSION};
pub use pack::{pack, PackOptions};
pub use planar::{ColorSpace, Component, PlanarImage};
pub use preview::{
    PipelineRenderer, PreviewCoordinator, PreviewDisplay, PreviewRenderer, PreviewState, SizeLabel,
};
pub use serialize::{FileSink, SerializeError, Serializer, Sink};
pub use source::{prepare, ChannelLayout, HostImage, PixelSource, SourceError};

/// Number of quality layers written per image.
pub const NUM_QUALITY_LAYERS: usize = 1;

/// Quality value that selects lossless coding.
pub const QUALITY_LOSSLESS: f32 = 100.0;

/// Quality used when nothing else has been chosen.
pub const DEFAULT_QUALITY: f32 = QUALITY_LOSSLESS / 2.0;

/// Whether the export preview starts enabled.
pub const DEFAULT_PREVIEW: bool = true;

/// Per-export encode settings.
///
/// Owned by the export session and mutated by UI actions; the preview worker
/// reads a snapshot of it at the start of every pass.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EncodeSettings {
    /// Quality per layer (PSNR target in dB, `QUALITY_LOSSLESS` = lossless)
    pub quality: Vec<f32>,
    /// Whether the live preview is generated
    pub preview_enabled: bool,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            quality: vec![DEFAULT_QUALITY; NUM_QUALITY_LAYERS],
            preview_enabled: DEFAULT_PREVIEW,
        }
    }
}

impl EncodeSettings {
    /// Create settings with default quality and preview enabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings for a single lossless layer
    pub fn lossless() -> Self {
        Self::with_quality(QUALITY_LOSSLESS)
    }

    /// Settings with every layer at the given quality
    pub fn with_quality(quality: f32) -> Self {
        Self {
            quality: vec![quality; NUM_QUALITY_LAYERS],
            ..Self::default()
        }
    }

    /// Set the first layer from a 0.0..=1.0 slider position.
    pub fn set_quality_fraction(&mut self, fraction: f32) {
        if let Some(first) = self.quality.first_mut() {
            *first = fraction.clamp(0.0, 1.0) * QUALITY_LOSSLESS;
        }
    }

    /// Per-layer distortion ratios handed to the encoder.
    ///
    /// The lossless sentinel maps to 0, which tells the encoder to keep
    /// every remaining coding pass in that layer.
    pub fn distortion_ratios(&self) -> Vec<f32> {
        self.quality
            .iter()
            .map(|&q| if q >= QUALITY_LOSSLESS { 0.0 } else { q })
            .collect()
    }

    /// Check if every layer is lossless
    pub fn is_lossless(&self) -> bool {
        !self.quality.is_empty() && self.quality.iter().all(|&q| q >= QUALITY_LOSSLESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_settings_default() {
        let settings = EncodeSettings::new();
        assert_eq!(settings.quality, vec![50.0]);
        assert!(settings.preview_enabled);
        assert!(!settings.is_lossless());
    }

    #[test]
    fn test_lossless_maps_to_zero_ratio() {
        let settings = EncodeSettings::lossless();
        assert!(settings.is_lossless());
        assert_eq!(settings.distortion_ratios(), vec![0.0]);
    }

    #[test]
    fn test_lossy_ratio_passes_through() {
        let settings = EncodeSettings::with_quality(35.0);
        assert_eq!(settings.distortion_ratios(), vec![35.0]);
    }

    #[test]
    fn test_quality_fraction() {
        let mut settings = EncodeSettings::new();
        settings.set_quality_fraction(0.25);
        assert_eq!(settings.quality[0], 25.0);

        settings.set_quality_fraction(1.5);
        assert!(settings.is_lossless());
    }

    #[test]
    fn test_empty_quality_is_not_lossless() {
        let settings = EncodeSettings {
            quality: Vec::new(),
            preview_enabled: false,
        };
        assert!(!settings.is_lossless());
        assert!(settings.distortion_ratios().is_empty());
    }
}
