//! Background preview worker.

use std::sync::Arc;
use std::time::Duration;

use super::state::{DoneGuard, PreviewArtifact, PreviewState, WorkerStep};
use crate::codec::Container;
use crate::planar::PlanarImage;
use crate::serialize::{SerializeError, Serializer};
use crate::source::PixelSource;
use crate::EncodeSettings;

/// Encodes and decodes previews for the worker.
pub trait PreviewRenderer: Send + 'static {
    /// Encode the current image at `settings`.
    fn encode(&mut self, settings: &EncodeSettings) -> Result<Vec<u8>, SerializeError>;

    /// Decode an encoded buffer for display.
    fn decode(&mut self, bytes: &[u8]) -> Result<PlanarImage, SerializeError>;
}

/// Renders through the export pipeline into memory, as bare codestreams.
#[derive(Debug, Clone)]
pub struct PipelineRenderer {
    serializer: Serializer,
    source: PixelSource,
}

impl PipelineRenderer {
    pub fn new(serializer: Serializer, source: PixelSource) -> Self {
        Self { serializer, source }
    }
}

impl PreviewRenderer for PipelineRenderer {
    fn encode(&mut self, settings: &EncodeSettings) -> Result<Vec<u8>, SerializeError> {
        self.serializer
            .encode_to_vec(&self.source, settings, Container::Codestream)
    }

    fn decode(&mut self, bytes: &[u8]) -> Result<PlanarImage, SerializeError> {
        self.serializer.decode_as(bytes, Container::Codestream)
    }
}

/// Run one pass. Failures are logged and yield no artifact.
fn render<R: PreviewRenderer>(
    renderer: &mut R,
    state: &PreviewState,
    settings: &EncodeSettings,
) -> Option<PreviewArtifact> {
    let bytes = match renderer.encode(settings) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("Preview encode failed: {}", e);
            return None;
        }
    };

    // Skip the decode when the result is already stale.
    let image = if state.update_required() {
        None
    } else {
        match renderer.decode(&bytes) {
            Ok(image) => Some(image),
            Err(e) => {
                log::warn!("Preview decode failed: {}", e);
                return None;
            }
        }
    };

    Some(PreviewArtifact {
        compressed_size: bytes.len(),
        image,
    })
}

/// Worker loop; returns when quit is signalled.
pub(crate) fn run<R: PreviewRenderer>(
    mut renderer: R,
    state: Arc<PreviewState>,
    idle_wait: Duration,
) {
    let _done = DoneGuard(&state);

    loop {
        match state.next_step(idle_wait) {
            WorkerStep::Quit => break,
            WorkerStep::Render(settings) => {
                let artifact = if settings.preview_enabled {
                    render(&mut renderer, &state, &settings)
                } else {
                    None
                };
                state.publish(artifact);
            }
        }
    }

    log::debug!("Preview worker exiting");
}
