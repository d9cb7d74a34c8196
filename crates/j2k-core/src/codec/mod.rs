//! JPEG 2000 codec adapter.
//!
//! Configures the OpenJPEG encoder and decoder and connects them to
//! in-memory streams. Encoding always produces a raw codestream through a
//! single-write stream; the JP2 flavor is formed by wrapping that output in
//! boxes (see `container`).
//!
//! # Module Structure
//!
//! - `stream` - `StreamIo` callbacks and the single-chunk `MemoryStream`
//! - `container` - Container flavors and JP2 box wrapping
//! - `openjpeg` - FFI handles, callbacks and the encode/decode sequences

pub mod container;
mod openjpeg;
pub mod stream;

use std::fmt;

use thiserror::Error;

pub use container::Container;
pub use openjpeg::MAX_QUALITY_LAYERS;
pub use stream::{MemoryStream, StreamError, StreamIo};

use crate::config::ExportConfig;
use crate::planar::PlanarImage;

/// A codec call that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecStage {
    CreateImage,
    CreateCodec,
    SetupEncoder,
    SetupDecoder,
    CreateStream,
    StartCompress,
    Encode,
    EndCompress,
    ReadHeader,
    Decode,
    EndDecompress,
}

impl fmt::Display for CodecStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CodecStage::CreateImage => "image creation",
            CodecStage::CreateCodec => "codec creation",
            CodecStage::SetupEncoder => "encoder setup",
            CodecStage::SetupDecoder => "decoder setup",
            CodecStage::CreateStream => "stream creation",
            CodecStage::StartCompress => "compression start",
            CodecStage::Encode => "encoding",
            CodecStage::EndCompress => "compression end",
            CodecStage::ReadHeader => "header read",
            CodecStage::Decode => "decoding",
            CodecStage::EndDecompress => "decompression end",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in the codec adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// A codec call reported failure; later stages were not attempted
    #[error("JPEG 2000 {0} failed")]
    Stage(CodecStage),

    /// The output stream rejected a write
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// Zero-length input to the decoder
    #[error("No JPEG 2000 data to decode")]
    EmptyInput,

    /// Quality layer count outside 1..=MAX_QUALITY_LAYERS
    #[error("Unsupported quality layer count: {0} (expected 1 to {max})", max = MAX_QUALITY_LAYERS)]
    InvalidLayers(usize),

    /// Encoding finished without writing anything
    #[error("JPEG 2000 encoder produced no output")]
    NoOutput,
}

/// Encoder/decoder front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecAdapter {
    write_chunk_size: usize,
    diagnostics: bool,
}

impl Default for CodecAdapter {
    fn default() -> Self {
        Self::new(&ExportConfig::default())
    }
}

impl CodecAdapter {
    pub fn new(config: &ExportConfig) -> Self {
        Self {
            write_chunk_size: config.write_chunk_size,
            diagnostics: config.codec_diagnostics,
        }
    }

    /// Largest output a single encode may produce.
    pub fn write_chunk_size(&self) -> usize {
        self.write_chunk_size
    }

    /// Encode a planar image.
    ///
    /// # Arguments
    ///
    /// * `image` - Packed components to encode
    /// * `ratios` - Distortion ratio per quality layer (0 = lossless)
    /// * `container` - Output flavor
    ///
    /// # Returns
    ///
    /// The encoded file bytes. Multiple component transform is enabled for
    /// three or more components.
    pub fn encode(
        &self,
        image: &PlanarImage,
        ratios: &[f32],
        container: Container,
    ) -> Result<Vec<u8>, CodecError> {
        let codestream =
            openjpeg::encode_codestream(image, ratios, self.write_chunk_size, self.diagnostics)?;

        log::debug!(
            "Encoded {} components into {} byte codestream ({} layers)",
            image.component_count(),
            codestream.len(),
            ratios.len()
        );

        Ok(match container {
            Container::Codestream => codestream,
            Container::Jp2 => container::wrap_jp2(&codestream, image),
        })
    }

    /// Decode bytes as the given container flavor.
    pub fn decode(&self, bytes: &[u8], container: Container) -> Result<PlanarImage, CodecError> {
        openjpeg::decode(bytes, container, self.diagnostics)
    }
}
