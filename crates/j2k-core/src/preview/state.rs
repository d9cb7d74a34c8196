//! Shared preview state.
//!
//! One mutex-guarded struct holds the three coordination flags, the quit and
//! done flags, the current settings and the artifact slot. A condition
//! variable wakes the worker on new requests and quit, and wakes the UI on
//! worker exit.
//!
//! Flag protocol:
//!
//! - `update_required` is raised by any parameter change and cleared only by
//!   the worker when it begins a pass.
//! - `update_available` is raised by the worker with a new artifact and
//!   cleared by the UI once it has consumed it. The worker starts no pass
//!   while it is set.
//! - `state_change` is raised by the worker after every pass and cleared by
//!   the UI when it re-prepares the display.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::planar::PlanarImage;
use crate::EncodeSettings;

/// Output of one preview pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewArtifact {
    /// Encoded size in bytes
    pub compressed_size: usize,
    /// Decoded preview, absent if a newer request arrived during encoding
    pub image: Option<PlanarImage>,
}

/// What the worker should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerStep {
    /// Run a pass with this settings snapshot
    Render(EncodeSettings),
    Quit,
}

/// An artifact taken by the UI, plus the flags it was taken under.
#[derive(Debug)]
pub struct Consumed {
    pub artifact: Option<PreviewArtifact>,
    /// A newer request was already pending
    pub update_pending: bool,
    pub preview_enabled: bool,
}

#[derive(Debug)]
struct Inner {
    update_required: bool,
    update_available: bool,
    state_change: bool,
    quit: bool,
    done: bool,
    settings: EncodeSettings,
    artifact: Option<PreviewArtifact>,
}

/// State shared by the preview worker and the UI consumer.
#[derive(Debug)]
pub struct PreviewState {
    inner: Mutex<Inner>,
    wake: Condvar,
}

impl PreviewState {
    /// New state with a first update already requested.
    pub fn new(settings: EncodeSettings) -> Self {
        Self {
            inner: Mutex::new(Inner {
                update_required: true,
                update_available: false,
                state_change: false,
                quit: false,
                done: false,
                settings,
                artifact: None,
            }),
            wake: Condvar::new(),
        }
    }

    // --- Any thread ---

    /// Ask for a new preview pass.
    pub fn request_update(&self) {
        self.inner.lock().update_required = true;
        self.wake.notify_all();
    }

    /// Change the settings and ask for a new pass.
    pub fn update_settings(&self, change: impl FnOnce(&mut EncodeSettings)) {
        {
            let mut inner = self.inner.lock();
            change(&mut inner.settings);
            inner.update_required = true;
        }
        self.wake.notify_all();
    }

    pub fn settings(&self) -> EncodeSettings {
        self.inner.lock().settings.clone()
    }

    pub fn update_required(&self) -> bool {
        self.inner.lock().update_required
    }

    pub fn update_available(&self) -> bool {
        self.inner.lock().update_available
    }

    pub fn state_change(&self) -> bool {
        self.inner.lock().state_change
    }

    pub fn is_done(&self) -> bool {
        self.inner.lock().done
    }

    // --- Worker side ---

    /// Block until there is a pass to run or quit is signalled.
    ///
    /// A pass starts when an update is required and the previous artifact
    /// has been consumed; `update_required` is cleared and the settings
    /// snapshotted under the same lock. Waits are bounded by `idle_wait`.
    pub fn next_step(&self, idle_wait: Duration) -> WorkerStep {
        let mut inner = self.inner.lock();
        loop {
            if inner.quit {
                return WorkerStep::Quit;
            }
            if inner.update_required && !inner.update_available {
                inner.update_required = false;
                return WorkerStep::Render(inner.settings.clone());
            }
            self.wake.wait_for(&mut inner, idle_wait);
        }
    }

    /// Publish the result of a pass.
    ///
    /// `update_available` is raised only with an artifact; `state_change` is
    /// raised either way so the UI refreshes its display.
    pub fn publish(&self, artifact: Option<PreviewArtifact>) {
        {
            let mut inner = self.inner.lock();
            if artifact.is_some() {
                inner.artifact = artifact;
                inner.update_available = true;
            }
            inner.state_change = true;
        }
        self.wake.notify_all();
    }

    pub(crate) fn mark_done(&self) {
        self.inner.lock().done = true;
        self.wake.notify_all();
    }

    // --- UI side ---

    /// Clear `state_change` if set.
    ///
    /// Returns `Some(update_pending)` when it was set, `None` otherwise.
    pub fn take_state_change(&self) -> Option<bool> {
        let mut inner = self.inner.lock();
        if !inner.state_change {
            return None;
        }
        inner.state_change = false;
        Some(inner.update_required)
    }

    /// Take the published artifact, if one is available.
    ///
    /// `update_available` stays raised until `finish_consume`, so the worker
    /// doesn't start a pass while the UI is still handling this one.
    pub fn begin_consume(&self) -> Option<Consumed> {
        let mut inner = self.inner.lock();
        if !inner.update_available {
            return None;
        }
        Some(Consumed {
            artifact: inner.artifact.take(),
            update_pending: inner.update_required,
            preview_enabled: inner.settings.preview_enabled,
        })
    }

    /// Clear `update_available` and let the worker run again.
    pub fn finish_consume(&self) {
        self.inner.lock().update_available = false;
        self.wake.notify_all();
    }

    /// Signal the worker to exit.
    pub fn signal_quit(&self) {
        self.inner.lock().quit = true;
        self.wake.notify_all();
    }

    /// Wait up to `timeout` for the worker to finish.
    pub fn wait_done(&self, timeout: Duration) -> bool {
        let mut inner = self.inner.lock();
        if !inner.done {
            self.wake.wait_while_for(&mut inner, |inner| !inner.done, timeout);
        }
        inner.done
    }

    /// Take any artifact still in the slot.
    pub fn take_artifact(&self) -> Option<PreviewArtifact> {
        self.inner.lock().artifact.take()
    }
}

/// Marks the worker done when dropped, including on unwind.
pub(crate) struct DoneGuard<'a>(pub(crate) &'a PreviewState);

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        self.0.mark_done();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_WAIT: Duration = Duration::from_millis(1);

    fn artifact(size: usize) -> PreviewArtifact {
        PreviewArtifact {
            compressed_size: size,
            image: None,
        }
    }

    #[test]
    fn test_first_update_requested() {
        let state = PreviewState::new(EncodeSettings::default());
        assert!(state.update_required());
        assert!(!state.update_available());
        assert!(!state.state_change());
    }

    #[test]
    fn test_next_step_clears_request_and_snapshots() {
        let state = PreviewState::new(EncodeSettings::with_quality(30.0));

        let step = state.next_step(NO_WAIT);
        assert_eq!(step, WorkerStep::Render(EncodeSettings::with_quality(30.0)));
        assert!(!state.update_required());
    }

    #[test]
    fn test_no_pass_while_artifact_unconsumed() {
        let state = PreviewState::new(EncodeSettings::default());
        let _ = state.next_step(NO_WAIT);
        state.publish(Some(artifact(10)));

        state.request_update();
        // Worker must wait; quit breaks it out.
        state.signal_quit();
        assert_eq!(state.next_step(NO_WAIT), WorkerStep::Quit);
        assert!(state.update_required());
    }

    #[test]
    fn test_publish_without_artifact_only_signals_change() {
        let state = PreviewState::new(EncodeSettings::default());
        let _ = state.next_step(NO_WAIT);
        state.publish(None);

        assert!(!state.update_available());
        assert_eq!(state.take_state_change(), Some(false));
        assert_eq!(state.take_state_change(), None);
        assert!(state.begin_consume().is_none());
    }

    #[test]
    fn test_consume_cycle() {
        let state = PreviewState::new(EncodeSettings::default());
        let _ = state.next_step(NO_WAIT);
        state.publish(Some(artifact(1234)));

        let consumed = state.begin_consume().unwrap();
        assert_eq!(consumed.artifact.unwrap().compressed_size, 1234);
        assert!(!consumed.update_pending);
        assert!(state.update_available());

        state.finish_consume();
        assert!(!state.update_available());
        assert!(state.take_artifact().is_none());
    }

    #[test]
    fn test_pending_request_reported_at_consume() {
        let state = PreviewState::new(EncodeSettings::default());
        let _ = state.next_step(NO_WAIT);
        state.update_settings(|s| s.preview_enabled = false);
        state.publish(Some(artifact(1)));

        assert_eq!(state.take_state_change(), Some(true));
        let consumed = state.begin_consume().unwrap();
        assert!(consumed.update_pending);
        assert!(!consumed.preview_enabled);
    }

    #[test]
    fn test_done_guard_marks_done() {
        let state = PreviewState::new(EncodeSettings::default());
        assert!(!state.wait_done(NO_WAIT));
        {
            let _guard = DoneGuard(&state);
        }
        assert!(state.is_done());
        assert!(state.wait_done(NO_WAIT));
    }
}
