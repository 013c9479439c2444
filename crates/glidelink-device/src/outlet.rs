//! Pass-through targets.
//!
//! Every slot publishes an [`Outlet`]: a shared, swappable handle to the
//! writer of its current receive loop. Another slot holding the outlet can
//! forward raw lines to it without owning the target slot. While the
//! target is closed or busy the outlet is empty and forwarding is a no-op.

use std::sync::{Arc, PoisonError, RwLock};

use glidelink_line_io::LineWriter;

/// A non-owning reference to a slot's outbound channel.
#[derive(Clone, Default)]
pub struct Outlet {
    writer: Arc<RwLock<Option<LineWriter>>>,
}

impl Outlet {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn attach(&self, writer: LineWriter) {
        *self.writer.write().unwrap_or_else(PoisonError::into_inner) = Some(writer);
    }

    pub(crate) fn detach(&self) {
        *self.writer.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Whether a running receive loop is behind this outlet.
    pub fn is_open(&self) -> bool {
        self.writer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|w| !w.is_closed())
    }

    /// Queue `line` plus a line terminator without waiting. `false` if the
    /// target is gone or its queue is full.
    pub fn forward(&self, line: &str) -> bool {
        let guard = self.writer.read().unwrap_or_else(PoisonError::into_inner);
        let Some(writer) = guard.as_ref() else {
            return false;
        };
        let mut data = Vec::with_capacity(line.len() + 2);
        data.extend_from_slice(line.as_bytes());
        data.extend_from_slice(b"\r\n");
        writer.try_write(data)
    }

    /// Whether `self` and `other` point at the same slot.
    pub fn same_target(&self, other: &Outlet) -> bool {
        Arc::ptr_eq(&self.writer, &other.writer)
    }
}

impl std::fmt::Debug for Outlet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outlet")
            .field("open", &self.is_open())
            .finish()
    }
}
