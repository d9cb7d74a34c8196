//! Export/import orchestration.
//!
//! `Serializer` runs the full pipeline: host pixels are prepared, analysed
//! and packed, handed to the codec, and the single output buffer goes to a
//! `Sink` (a file, or memory for the preview). Decoding guesses the container
//! flavor from a filename and retries once with the other flavor.

use std::fs;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use thiserror::Error;

use crate::analyze::{analyze, Analysis};
use crate::codec::{CodecAdapter, CodecError, Container};
use crate::config::ExportConfig;
use crate::pack::{pack, PackOptions};
use crate::planar::{PlanarImage, UnsupportedLayout};
use crate::source::{self, HostImage, PixelSource, SourceError};
use crate::EncodeSettings;

/// Errors that can occur during export or import.
#[derive(Debug, Error)]
pub enum SerializeError {
    /// The host image can't be exported
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Opening, reading or writing a file failed
    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A codec stage or the output stream failed
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Width or height is zero
    #[error("Invalid dimensions: width ({width}) and height ({height}) must be non-zero")]
    EmptyImage { width: u32, height: u32 },

    /// Decoded components the host can't take
    #[error(transparent)]
    UnsupportedDecoded(#[from] UnsupportedLayout),

    /// Neither container flavor decoded
    #[error("Could not decode JPEG 2000 data ({first}; retry as the other container: {second})")]
    DecodeFailed { first: CodecError, second: CodecError },
}

/// Destination of an encoded buffer.
pub trait Sink {
    /// Take the complete encoded output.
    fn accept(&mut self, bytes: &[u8]) -> Result<(), SerializeError>;
}

/// Writes the buffer verbatim to a file, creating or truncating it.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for FileSink {
    fn accept(&mut self, bytes: &[u8]) -> Result<(), SerializeError> {
        fs::write(&self.path, bytes).map_err(|source| SerializeError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// In-memory capture; replaces any previous contents.
impl Sink for Vec<u8> {
    fn accept(&mut self, bytes: &[u8]) -> Result<(), SerializeError> {
        self.clear();
        self.extend_from_slice(bytes);
        Ok(())
    }
}

/// Export/import pipeline for one session.
#[derive(Debug, Clone, Default)]
pub struct Serializer {
    config: ExportConfig,
    codec: CodecAdapter,
}

impl Serializer {
    pub fn new(config: ExportConfig) -> Self {
        let codec = CodecAdapter::new(&config);
        Self { config, codec }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Extract the pixel rectangle of a host image.
    ///
    /// Indexed images are rejected here, before any codec call.
    pub fn prepare(&self, host: &HostImage) -> Result<PixelSource, SerializeError> {
        Ok(source::prepare(host)?)
    }

    /// Packing options for an analysed source under this configuration.
    pub fn pack_options(&self, analysis: Analysis) -> PackOptions {
        PackOptions {
            mono: analysis.mono,
            save_alpha: analysis.save_alpha,
            colour_order_rgb: self.config.colour_order_rgb,
            flip_vertically: self.config.flip_vertically,
            dx: self.config.subsampling_dx,
            dy: self.config.subsampling_dy,
        }
    }

    /// Encode a pixel source and hand the result to `sink`.
    ///
    /// # Arguments
    ///
    /// * `source` - Prepared pixels
    /// * `settings` - Quality layers to encode with
    /// * `container` - Output flavor
    /// * `sink` - Receives the encoded buffer, only on success
    ///
    /// # Returns
    ///
    /// The number of bytes handed to the sink.
    ///
    /// # Errors
    ///
    /// A zero-sized source fails with `SerializeError::EmptyImage` before the
    /// codec is touched; codec and stream failures leave the sink untouched.
    pub fn encode<S: Sink>(
        &self,
        source: &PixelSource,
        settings: &EncodeSettings,
        container: Container,
        sink: &mut S,
    ) -> Result<usize, SerializeError> {
        if source.is_empty() {
            return Err(SerializeError::EmptyImage {
                width: source.width(),
                height: source.height(),
            });
        }

        let analysis = analyze(source);
        let options = self.pack_options(analysis);
        let ratios = settings.distortion_ratios();

        let bytes = {
            let planar = pack(source, &options);
            log::debug!(
                "Packed {}x{} source into {} components",
                source.width(),
                source.height(),
                planar.component_count()
            );
            self.codec.encode(&planar, &ratios, container)?
        };

        sink.accept(&bytes)?;
        Ok(bytes.len())
    }

    /// Encode into a new buffer.
    pub fn encode_to_vec(
        &self,
        source: &PixelSource,
        settings: &EncodeSettings,
        container: Container,
    ) -> Result<Vec<u8>, SerializeError> {
        let mut out = Vec::new();
        self.encode(source, settings, container, &mut out)?;
        Ok(out)
    }

    /// Decode as `container`, falling back to the opposite flavor once.
    pub fn decode_as(
        &self,
        bytes: &[u8],
        container: Container,
    ) -> Result<PlanarImage, SerializeError> {
        let first = match self.codec.decode(bytes, container) {
            Ok(image) => return Ok(image),
            Err(e) => e,
        };

        let retry = container.opposite();
        log::debug!("Decoding as {:?} failed ({}), retrying as {:?}", container, first, retry);

        self.codec
            .decode(bytes, retry)
            .map_err(|second| SerializeError::DecodeFailed { first, second })
    }

    /// Decode with the container flavor guessed from `filename`.
    pub fn decode(&self, bytes: &[u8], filename: &Path) -> Result<PlanarImage, SerializeError> {
        self.decode_as(bytes, Container::from_path(filename))
    }

    /// Export a host image to `path`, flavor chosen by extension.
    pub fn export_file(
        &self,
        host: &HostImage,
        settings: &EncodeSettings,
        path: &Path,
    ) -> Result<usize, SerializeError> {
        let source = self.prepare(host)?;
        let container = Container::from_path(path);
        let written = self.encode(&source, settings, container, &mut FileSink::new(path))?;

        log::debug!("Wrote {} bytes to {} ({:?})", written, path.display(), container);
        Ok(written)
    }

    /// Load a JPEG 2000 file as an 8-bit host image.
    pub fn load_file(&self, path: &Path) -> Result<DynamicImage, SerializeError> {
        let bytes = fs::read(path).map_err(|source| SerializeError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let planar = self.decode(&bytes, path)?;
        Ok(planar.to_dynamic_image()?)
    }
}
