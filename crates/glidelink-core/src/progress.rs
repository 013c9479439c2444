//! Progress reporting for long-running bulk operations.

/// Receives progress updates while a slot runs a bulk operation.
///
/// Implementations must be cheap; they are called from inside the binary
/// exchange.
pub trait ProgressSink: Send + Sync {
    /// Describe the current step, e.g. "Declaring task".
    fn set_text(&self, text: &str);

    /// Set the upper bound for [`set_position`](ProgressSink::set_position).
    fn set_range(&self, range: u32);

    /// Report progress within the current range.
    fn set_position(&self, position: u32);
}

/// A [`ProgressSink`] that discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn set_text(&self, _text: &str) {}
    fn set_range(&self, _range: u32) {}
    fn set_position(&self, _position: u32) {}
}
