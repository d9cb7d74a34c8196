//! Preview display contract.

use std::fmt;

use crate::planar::PlanarImage;

/// File size label shown under the preview.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizeLabel {
    /// Preview disabled, size not computed
    Unknown,
    /// A newer request is being encoded
    Pending,
    /// Encoded size in bytes
    Bytes(usize),
}

impl fmt::Display for SizeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeLabel::Unknown => f.write_str("File size: unknown"),
            SizeLabel::Pending => f.write_str("File size:"),
            SizeLabel::Bytes(bytes) => write!(f, "File size: {:.1} kB", *bytes as f64 / 1024.0),
        }
    }
}

/// The host-side preview surface, driven from the UI thread.
pub trait PreviewDisplay {
    /// Create or re-attach the preview surface.
    fn prepare(&mut self);

    /// Stop host undo recording. Called at most once per session.
    fn freeze_undo(&mut self);

    fn set_size_label(&mut self, label: SizeLabel);

    /// Replace the preview contents with a decoded image.
    fn show(&mut self, image: PlanarImage);

    /// Push pending display changes to the screen.
    fn flush(&mut self);

    /// Remove the preview surface and restore undo recording.
    fn teardown(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_label_text() {
        assert_eq!(SizeLabel::Unknown.to_string(), "File size: unknown");
        assert_eq!(SizeLabel::Pending.to_string(), "File size:");
        assert_eq!(SizeLabel::Bytes(12_595).to_string(), "File size: 12.3 kB");
        assert_eq!(SizeLabel::Bytes(0).to_string(), "File size: 0.0 kB");
    }
}
