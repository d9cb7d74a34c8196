//! Live export preview.
//!
//! While the export dialog is open a background worker re-encodes the image
//! whenever the settings change, reporting the compressed size and, when the
//! result is still current, a decoded preview. The UI thread polls `idle()`
//! to consume results and drive the display.
//!
//! A burst of changes collapses into a single trailing pass: a request that
//! arrives mid-encode stays raised until the next pass begins, and no pass
//! starts until the previous result has been consumed.
//!
//! # Module Structure
//!
//! - `state` - Mutex-guarded flags and artifact slot shared with the worker
//! - `worker` - Worker loop and the `PreviewRenderer` seam
//! - `display` - `PreviewDisplay` contract and the size label

pub mod display;
pub mod state;
pub mod worker;

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub use display::{PreviewDisplay, SizeLabel};
pub use state::{PreviewArtifact, PreviewState};
pub use worker::{PipelineRenderer, PreviewRenderer};

use state::Consumed;

use crate::config::ExportConfig;
use crate::EncodeSettings;

/// Owns the preview worker and the display for one export session.
pub struct PreviewCoordinator<D: PreviewDisplay> {
    state: Arc<PreviewState>,
    display: D,
    worker: Option<JoinHandle<()>>,
    undo_frozen: bool,
    shutdown_warn_after: Duration,
}

impl<D: PreviewDisplay> PreviewCoordinator<D> {
    /// Start the worker. The first pass runs immediately.
    ///
    /// # Arguments
    ///
    /// * `renderer` - Produces encoded and decoded previews on the worker
    /// * `settings` - Initial encode settings
    /// * `display` - Host preview surface, driven from `idle()`
    /// * `config` - Worker idle wait and shutdown diagnostic threshold
    pub fn start<R: PreviewRenderer>(
        renderer: R,
        settings: EncodeSettings,
        display: D,
        config: &ExportConfig,
    ) -> io::Result<Self> {
        let state = Arc::new(PreviewState::new(settings));
        let worker_state = Arc::clone(&state);
        let idle_wait = config.worker_idle_wait;

        let worker = thread::Builder::new()
            .name("j2k-preview".to_string())
            .spawn(move || worker::run(renderer, worker_state, idle_wait))?;

        Ok(Self {
            state,
            display,
            worker: Some(worker),
            undo_frozen: false,
            shutdown_warn_after: config.shutdown_warn_after,
        })
    }

    pub fn state(&self) -> &PreviewState {
        &self.state
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    /// Ask for a new pass with the current settings.
    pub fn request_update(&self) {
        self.state.request_update();
    }

    /// Change the settings and ask for a new pass.
    pub fn update_settings(&self, change: impl FnOnce(&mut EncodeSettings)) {
        self.state.update_settings(change);
    }

    /// One UI idle tick.
    pub fn idle(&mut self) {
        // Skip re-preparing when another update is already on its way.
        if let Some(update_pending) = self.state.take_state_change() {
            if !update_pending {
                self.prepare_display();
            }
        }

        let Some(Consumed {
            artifact,
            update_pending,
            preview_enabled,
        }) = self.state.begin_consume()
        else {
            return;
        };

        let label = match &artifact {
            Some(artifact) if !update_pending => SizeLabel::Bytes(artifact.compressed_size),
            _ => SizeLabel::Pending,
        };
        self.display.set_size_label(label);

        // The decoded image is released here whether or not it is shown.
        if let Some(image) = artifact.and_then(|a| a.image) {
            if !update_pending && preview_enabled {
                self.display.show(image);
            }
        }

        if !update_pending {
            self.display.flush();
        }

        self.state.finish_consume();
    }

    fn prepare_display(&mut self) {
        if self.state.settings().preview_enabled {
            if !self.undo_frozen {
                self.display.freeze_undo();
                self.undo_frozen = true;
            }
            self.display.prepare();
        } else {
            self.display.set_size_label(SizeLabel::Unknown);
            self.display.flush();
        }
    }

    /// Stop the worker and tear down the display.
    ///
    /// Waits for the worker to finish its current pass, logging a warning
    /// each time the wait exceeds `shutdown_warn_after`. Does nothing on a
    /// second call.
    pub fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        self.state.signal_quit();
        while !self.state.wait_done(self.shutdown_warn_after) {
            log::warn!("Waiting for background preview thread to terminate");
        }
        if worker.join().is_err() {
            log::warn!("Background preview thread panicked");
        }

        drop(self.state.take_artifact());
        self.display.teardown();
    }
}

impl<D: PreviewDisplay> Drop for PreviewCoordinator<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
