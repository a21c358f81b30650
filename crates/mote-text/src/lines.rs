//! Line index — ordered line-end offsets derived from the document store.
//!
//! One entry per line, each the offset of the first byte *after* that
//! line's terminator (CR, LF, or CRLF counted as one). The document's
//! terminator sentinel closes a final, possibly zero-length line, so the
//! index of any well-formed store is never empty and its last entry always
//! equals the store length. Line `n` then spans
//! `[ends[n-1] (or 0), ends[n])`, and offset→line is a binary search.
//!
//! # Concurrency
//!
//! The entry vector sits behind an `RwLock`; a monotone `processed`
//! counter (atomic, lock-free to read) tracks how many entries are valid
//! while a build is in flight. There is exactly one writer at a time: the
//! background [`build`] worker *or* the foreground patcher — never both,
//! because every mutation path cancels and joins the builder before it
//! touches the index. Lookups take the read view and serve whatever is
//! present; mid-build staleness is visible (via `processed`), not unsafe.
//!
//! # Patch, don't rebuild
//!
//! Edits call [`LineIndex::splice_inserted`] / [`LineIndex::remove_span`],
//! which adjust only the entries at and after the edit point. Edit cost is
//! proportional to the edit plus the tail of the index — not to document
//! size. A full [`build`] happens only when nothing of the old index is
//! reusable (bulk text replacement).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use mote_sync::CancelToken;

use crate::error::Outcome;
use crate::location::Location;

// ---------------------------------------------------------------------------
// LineIndex
// ---------------------------------------------------------------------------

/// Shared, incrementally-maintained list of line-end offsets.
#[derive(Debug, Default)]
pub struct LineIndex {
    ends: RwLock<Vec<usize>>,
    processed: AtomicUsize,
}

impl LineIndex {
    /// Create an empty index (no lines known yet).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all entries and zero the processed counter, ready for a fresh
    /// build.
    pub fn reset(&self) {
        let mut ends = self.ends.write().expect("line index poisoned");
        ends.clear();
        self.processed.store(0, Ordering::Relaxed);
    }

    /// How many entries a background build has committed so far. Readable
    /// without locking; lags `line_count` never, equals it once a build or
    /// patch has settled.
    #[inline]
    #[must_use]
    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::Relaxed)
    }

    /// Number of entries currently present.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.ends.read().expect("line index poisoned").len()
    }

    /// The byte range `[start, end)` of `line`, or `None` when the index
    /// does not (or does not yet) reach that line.
    #[must_use]
    pub fn line_bounds(&self, line: usize) -> Option<(Location, Location)> {
        let ends = self.ends.read().expect("line index poisoned");
        if line >= ends.len() {
            return None;
        }
        let start = if line == 0 { 0 } else { ends[line - 1] };
        Some((start, ends[line]))
    }

    /// The line containing `offset`, clamped to the known entries.
    ///
    /// An offset equal to a line's end belongs to the *next* line (the end
    /// is the first byte after the terminator).
    #[must_use]
    pub fn line_at(&self, offset: Location) -> usize {
        let ends = self.ends.read().expect("line index poisoned");
        if ends.is_empty() {
            return 0;
        }
        let mut line = ends.partition_point(|&e| e < offset);
        if line < ends.len() && ends[line] == offset {
            line += 1;
        }
        line.min(ends.len() - 1)
    }

    /// Copy of the entries (test and verification support).
    #[must_use]
    pub fn entries(&self) -> Vec<usize> {
        self.ends.read().expect("line index poisoned").clone()
    }

    // -- Incremental patches (foreground; builder joined by the caller) -----

    /// Account for `added` bytes spliced in at `offset`, whose scan
    /// produced the absolute line-end offsets `new_ends`.
    ///
    /// Entries after the splice point shift right by `added`; the new
    /// entries slot in at the first entry beyond `offset` (an entry equal
    /// to `offset` closes a line that ends *before* the inserted text and
    /// stays put).
    pub fn splice_inserted(&self, offset: Location, new_ends: &[usize], added: usize) {
        let mut ends = self.ends.write().expect("line index poisoned");
        let at = ends.partition_point(|&e| e <= offset);
        for e in &mut ends[at..] {
            *e += added;
        }
        if !new_ends.is_empty() {
            ends.splice(at..at, new_ends.iter().copied());
            self.processed.fetch_add(new_ends.len(), Ordering::Relaxed);
        }
    }

    /// Account for the byte range `[start, end)` being erased: entries
    /// inside `(start, end]` disappear, later entries shift left. Returns
    /// how many entries were removed.
    pub fn remove_span(&self, start: Location, end: Location) -> usize {
        let mut ends = self.ends.write().expect("line index poisoned");
        let first = ends.partition_point(|&e| e <= start);
        let last = ends.partition_point(|&e| e <= end);
        let delta = end - start;
        for e in &mut ends[last..] {
            *e -= delta;
        }
        let removed = last - first;
        if removed > 0 {
            ends.drain(first..last);
            let before = self.processed.load(Ordering::Relaxed);
            self.processed
                .store(before.saturating_sub(removed), Ordering::Relaxed);
        }
        removed
    }

    /// Append one entry during a build and publish the new progress.
    fn push_end(&self, end: usize) {
        let mut ends = self.ends.write().expect("line index poisoned");
        ends.push(end);
        self.processed.store(ends.len(), Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Background build
// ---------------------------------------------------------------------------

/// Scan `text` once, forward, committing one line-end entry at a time.
///
/// CR, LF, and CRLF each close a line; the final entry is always
/// `text.len()` — with the terminator sentinel in place that closes the
/// zero-length last line, so even an "empty" document indexes to one line.
/// The cancellation token is polled once per line; a cancelled build
/// leaves the prefix committed so far, which the next edit either patches
/// or supersedes.
pub fn build(index: &LineIndex, text: &[u8], cancel: &CancelToken) -> Outcome {
    index.reset();

    let mut pos = 0;
    while pos != text.len() {
        if cancel.is_cancelled() {
            return Outcome::Cancelled;
        }
        let after = match text[pos..].iter().position(|&b| b == b'\r' || b == b'\n') {
            Some(rel) => {
                let mut after = pos + rel;
                if text[after] == b'\r' {
                    after += 1;
                }
                if after < text.len() && text[after] == b'\n' {
                    after += 1;
                }
                after
            }
            None => text.len(),
        };
        index.push_end(after);
        pos = after;
    }
    Outcome::Completed
}

/// Scan freshly inserted text for embedded line terminators, producing the
/// absolute line-end offsets its splice introduces (`base` is the insert
/// offset in the document).
///
/// A terminator must end *inside* the inserted text to count — trailing
/// bytes with no break produce nothing, and the surrounding document is
/// deliberately not consulted (the patch touches only what the edit adds).
#[must_use]
pub fn scan_inserted(text: &[u8], base: Location) -> Vec<usize> {
    let mut out = Vec::new();
    let mut pos = 0;
    while let Some(rel) = text[pos..].iter().position(|&b| b == b'\r' || b == b'\n') {
        let mut after = pos + rel;
        if text[after] == b'\r' {
            after += 1;
        }
        if after < text.len() && text[after] == b'\n' {
            after += 1;
        }
        out.push(base + after);
        pos = after;
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
