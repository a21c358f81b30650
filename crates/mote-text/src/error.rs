//! Error and outcome types for the document engine.
//!
//! Two failure classes, deliberately kept apart:
//!
//! - **Recoverable precondition violations** ([`TextError::OutOfRange`],
//!   [`TextError::InvalidRange`]): the caller handed us an offset the
//!   current document cannot satisfy. The edit is rejected, nothing
//!   mutates, and the caller decides what to do. Never clamped silently.
//! - **Structural invariant violations** ([`TextError::InvariantViolation`]):
//!   the store or a derived index no longer has its required shape. These
//!   are fail-fast — masking one risks silently corrupting every edit that
//!   follows, so they propagate loudly up the operation chain.
//!
//! Cancellation is *not* an error. A background scan that stops early
//! resolves to [`Outcome::Cancelled`], distinct from [`Outcome::Completed`]
//! so whoever restarts the work knows whether the processed high-water mark
//! is a resumable prefix or a finished result.

use thiserror::Error;

/// Errors surfaced by the document engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TextError {
    /// An offset fell outside the addressable extent of the document.
    #[error("offset out of range: {offset} (document extent {length})")]
    OutOfRange { offset: usize, length: usize },

    /// A `[start, end)` range was reversed or reached past the deletable
    /// extent (the terminator can never be inside a mutation range).
    #[error("invalid range: start {start}, end {end} (document extent {length})")]
    InvalidRange {
        start: usize,
        end: usize,
        length: usize,
    },

    /// The store or an index diverged from its required shape. Not
    /// recoverable locally; continuing would corrupt further edits.
    #[error("document invariant violated: {reason}")]
    InvariantViolation { reason: &'static str },
}

/// How a background scan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Ran to the end of its input; the derived state is complete.
    Completed,
    /// Stopped at a cancellation poll; a valid prefix remains, bounded by
    /// the processed high-water mark.
    Cancelled,
}

impl Outcome {
    #[inline]
    #[must_use]
    pub const fn is_cancelled(self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result of one background scan: an [`Outcome`] on any orderly exit, an
/// error only for internal failures the next foreground join must surface.
pub type ScanResult = Result<Outcome, TextError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
