//! Change notifications published by the mutation coordinator.
//!
//! Collaborators (cursors, selections, highlighters, windows) subscribe to
//! the shared [`Channel`](mote_sync::Channel) and receive one
//! [`BufferEvent`] strictly *before* each mutation is applied
//! ([`ChangeKind::PreChange`]) and one strictly *after*
//! ([`ChangeKind::TextAdded`] / [`ChangeKind::TextDeleted`]). The protocol
//! lets them snapshot offsets on the pre message and remap on the post
//! message instead of rebuilding their state from scratch.

use std::fmt;

use crate::location::Location;

// ---------------------------------------------------------------------------
// BufferId
// ---------------------------------------------------------------------------

/// Host-assigned handle identifying a buffer in the host's registry.
///
/// Buffers are owned by the host; windows and other collaborators refer to
/// them through this id rather than holding references, so buffer lifetime
/// stays independent of how many views point at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ChangeKind / BufferEvent
// ---------------------------------------------------------------------------

/// What a [`BufferEvent`] announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// The range `[start, end)` is about to change; offsets inside it (and
    /// after it) are about to become stale. Published before any mutation.
    PreChange,
    /// Text was spliced in; `[start, end)` is the inserted extent in the
    /// new layout.
    TextAdded,
    /// Text was erased; `[start, end)` is the removed extent in the *old*
    /// layout (those offsets no longer exist).
    TextDeleted,
}

/// One change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferEvent {
    /// Which buffer changed.
    pub buffer: BufferId,
    pub kind: ChangeKind,
    /// Affected byte range, `[start, end)`.
    pub start: Location,
    pub end: Location,
    /// Where the editing cursor should land after the change, when the
    /// mutator knows.
    pub cursor: Option<Location>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_id_display() {
        assert_eq!(BufferId(3).to_string(), "buffer#3");
    }

    #[test]
    fn events_compare_by_value() {
        let a = BufferEvent {
            buffer: BufferId(1),
            kind: ChangeKind::TextAdded,
            start: 0,
            end: 5,
            cursor: Some(5),
        };
        assert_eq!(a, a);
        assert_ne!(
            a,
            BufferEvent {
                kind: ChangeKind::TextDeleted,
                ..a
            }
        );
    }
}
