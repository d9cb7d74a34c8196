//! Pipeline configuration.
//!
//! `ExportConfig` collects the knobs that are fixed for a session: source
//! channel order, scanline direction, component subsampling, output stream
//! capacity, codec diagnostics and the preview worker's timing.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Single-chunk output capacity of an encode stream (128 MiB).
pub const DEFAULT_WRITE_CHUNK_SIZE: usize = 0x0800_0000;

/// Configuration for export, import and preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Source buffers are RGB ordered (false = BGR, red/blue planes swapped)
    pub colour_order_rgb: bool,
    /// Pack scanlines bottom-up
    pub flip_vertically: bool,
    /// Horizontal component subsampling
    pub subsampling_dx: u32,
    /// Vertical component subsampling
    pub subsampling_dy: u32,
    /// Largest encoded output accepted in the single stream write
    pub write_chunk_size: usize,
    /// Route OpenJPEG's own messages to the logger
    pub codec_diagnostics: bool,
    /// Longest the preview worker sleeps before re-checking its flags
    pub worker_idle_wait: Duration,
    /// Shutdown logs a diagnostic each time the worker takes longer than this
    pub shutdown_warn_after: Duration,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            colour_order_rgb: true,
            flip_vertically: false,
            subsampling_dx: 1,
            subsampling_dy: 1,
            write_chunk_size: DEFAULT_WRITE_CHUNK_SIZE,
            codec_diagnostics: false,
            worker_idle_wait: Duration::from_millis(50),
            shutdown_warn_after: Duration::from_secs(1),
        }
    }
}
