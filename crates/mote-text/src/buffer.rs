//! Text buffer — the mutation coordinator and query surface.
//!
//! A [`TextBuffer`] owns one document: the gap-buffer store, its line
//! index, and (optionally) its syntax highlighter. Every mutation runs the
//! same protocol:
//!
//! 1. **Quiesce** — any in-flight background scan is cancelled and joined
//!    (a bounded wait: the worker is signalled first), so nothing reads or
//!    writes the derived indices concurrently with the splice.
//! 2. **Announce** — a pre-change notification goes out on the shared
//!    channel *before* anything mutates, carrying the extent that is about
//!    to become stale.
//! 3. **Splice** — the store mutates; the line index is *patched*, never
//!    rebuilt: binary-search the affected entries, scan only the edited
//!    bytes, shift the tail. Edit cost tracks the edit, not the document.
//! 4. **Re-arm** — the syntax scan restarts from the invalidated offset
//!    (background or inline per [`EngineFlags::DISABLE_BACKGROUND`]; the
//!    protocol is identical either way).
//! 5. **Confirm** — a post-change notification reports the edited range
//!    and the optional post-edit cursor, so collaborators can remap the
//!    offsets they snapshotted at step 2.
//!
//! Precondition violations reject the edit with an error and mutate
//! nothing; the splice is all-or-nothing. Only a bulk [`TextBuffer::set_text`]
//! schedules a full line-index rebuild — after wholesale replacement
//! nothing of the old index is reusable.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use mote_sync::{CancelToken, Channel, TaskHandle, TaskPool};

use crate::error::{ScanResult, TextError};
use crate::event::{BufferEvent, BufferId, ChangeKind};
use crate::lines::{self, LineIndex};
use crate::location::{Direction, LinePoint, Location};
use crate::scan::{self, BlockScan, ScanPolicy, is_graphic_byte};
use crate::store::{GapBuffer, TERMINATOR};
use crate::syntax::{Highlighter, SyntaxKind};

bitflags! {
    /// Engine behavior switches, fixed at buffer construction.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EngineFlags: u32 {
        /// Run all background work inline, synchronously, on the caller.
        /// The update protocol is unchanged — only the scheduling — so
        /// results are deterministic and identical in both modes.
        const DISABLE_BACKGROUND = 1;
    }
}

/// One document: store + derived indices + the mutation protocol.
pub struct TextBuffer {
    id: BufferId,
    name: String,
    store: GapBuffer,
    lines: Arc<LineIndex>,
    line_task: Option<TaskHandle<ScanResult>>,
    highlighter: Option<Highlighter>,
    channel: Arc<Channel<BufferEvent>>,
    pool: Arc<TaskPool>,
    flags: EngineFlags,
    modified: bool,
}

impl TextBuffer {
    // -- Construction -------------------------------------------------------

    /// Create an empty buffer: one terminator byte, one zero-length line.
    ///
    /// The channel and pool are shared, host-owned collaborators; the
    /// buffer only ever publishes to the channel and submits to the pool.
    #[must_use]
    pub fn new(
        id: BufferId,
        name: impl Into<String>,
        channel: Arc<Channel<BufferEvent>>,
        pool: Arc<TaskPool>,
        flags: EngineFlags,
    ) -> Self {
        let store = GapBuffer::from_bytes(&[TERMINATOR]);
        let lines = Arc::new(LineIndex::new());
        let _ = lines::build(&lines, &[TERMINATOR], &CancelToken::new());

        Self {
            id,
            name: name.into(),
            store,
            lines,
            line_task: None,
            highlighter: None,
            channel,
            pool,
            flags,
            modified: false,
        }
    }

    fn background(&self) -> bool {
        !self.flags.contains(EngineFlags::DISABLE_BACKGROUND)
    }

    // -- Identity & metadata ------------------------------------------------

    #[inline]
    #[must_use]
    pub const fn id(&self) -> BufferId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once an insert or delete has landed since the last
    /// [`set_text`](Self::set_text) or [`mark_saved`](Self::mark_saved).
    #[inline]
    #[must_use]
    pub const fn is_modified(&self) -> bool {
        self.modified
    }

    /// Clear the modified flag (the host persisted the contents).
    #[inline]
    pub const fn mark_saved(&mut self) {
        self.modified = false;
    }

    // -- Size & raw access --------------------------------------------------

    /// Total length in bytes, terminator included. Never zero.
    #[inline]
    #[must_use]
    #[allow(clippy::len_without_is_empty)] // never empty: the sentinel is always there
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Location of the terminator — the last addressable byte.
    #[inline]
    #[must_use]
    pub fn end_location(&self) -> Location {
        self.store.len() - 1
    }

    /// Byte at `offset`, or `None` past the end.
    #[inline]
    #[must_use]
    pub fn byte_at(&self, offset: Location) -> Option<u8> {
        self.store.get(offset)
    }

    /// The document text (terminator excluded), decoded lossily.
    #[must_use]
    pub fn text(&self) -> String {
        self.store.string_range(0, self.end_location())
    }

    /// Full byte snapshot, terminator included.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.store.snapshot()
    }

    /// The underlying store, for read-only scans.
    #[inline]
    #[must_use]
    pub const fn store(&self) -> &GapBuffer {
        &self.store
    }

    /// Clamp a location into the addressable range `[0, end_location()]`.
    #[inline]
    #[must_use]
    pub fn clamp(&self, location: Location) -> Location {
        location.min(self.end_location())
    }

    /// Clamp a line number to the processed prefix of the line index.
    #[inline]
    #[must_use]
    pub fn clamp_line(&self, line: usize) -> usize {
        line.min(self.lines.processed())
    }

    // -- Line queries -------------------------------------------------------

    /// Number of lines the index currently knows about.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.lines.line_count()
    }

    /// How many line entries a background build has committed so far.
    /// Lock-free; lookups past this point return `None` until the build
    /// catches up.
    #[must_use]
    pub fn processed_lines(&self) -> usize {
        self.lines.processed()
    }

    /// The line containing `offset` (clamped to known lines).
    #[must_use]
    pub fn line_from_offset(&self, offset: Location) -> usize {
        self.lines.line_at(offset)
    }

    /// Byte range `[start, end)` of `line`, or `None` when the index does
    /// not (or does not yet) reach it.
    #[must_use]
    pub fn line_offsets(&self, line: usize) -> Option<(Location, Location)> {
        self.lines.line_bounds(line)
    }

    /// A cursor landing position on `line` (clamped to known lines),
    /// computed by scanning the line's bytes.
    #[must_use]
    pub fn line_position(&self, line: usize, point: LinePoint) -> Location {
        let count = self.lines.line_count();
        if count == 0 {
            return 0;
        }
        let Some((start, end)) = self.lines.line_bounds(line.min(count - 1)) else {
            return 0;
        };

        let is_break = |b: u8| matches!(b, b'\r' | b'\n' | TERMINATOR);
        let forward = |pred: &dyn Fn(u8) -> bool| {
            (start..end).find(|&i| pred(self.store.byte(i))).unwrap_or(end)
        };
        let backward = |pred: &dyn Fn(u8) -> bool| {
            (start..end)
                .rev()
                .find(|&i| pred(self.store.byte(i)))
                .unwrap_or(end)
        };

        match point {
            LinePoint::Begin => start,
            LinePoint::End => end,
            LinePoint::BreakBegin => forward(&is_break),
            LinePoint::FirstGraphic => forward(&is_graphic_byte),
            LinePoint::LastNonBreak => backward(&|b| !is_break(b)),
            LinePoint::LastGraphic => backward(&is_graphic_byte),
        }
    }

    /// Step `count` characters from `location` (negative steps backward),
    /// counting a CRLF pair as a single character. The result is clamped
    /// into the document.
    #[must_use]
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    pub fn location_after_chars(&self, location: Location, count: isize) -> Location {
        let len = self.store.len() as isize;
        let step: isize = if count > 0 { 1 } else { -1 };
        // Stepping forward lands on the second half of a CRLF pair and
        // skips it; stepping backward meets the halves in the other order.
        let (first_break, second_break) = if step < 0 {
            (b'\n', b'\r')
        } else {
            (b'\r', b'\n')
        };

        let mut current = self.clamp(location) as isize;
        for _ in 0..count.unsigned_abs() {
            if step == -1 {
                current += step;
            }
            if current < 0 || current >= len {
                break;
            }
            if self.store.byte(current as usize) == first_break {
                let next = current + step;
                if next < 0 || next >= len {
                    break;
                }
                if self.store.byte(next as usize) == second_break {
                    current = next;
                }
            }
            if step == 1 {
                current += step;
            }
        }
        self.clamp(current.max(0) as usize)
    }

    // -- Motion primitive ---------------------------------------------------

    /// Classify the block/separator runs around `origin` (clamped), walking
    /// in `direction` under `policy`. Reads a snapshot of the current
    /// store; mutates nothing.
    #[must_use]
    pub fn scan_block(
        &self,
        origin: Location,
        direction: Direction,
        policy: ScanPolicy,
    ) -> BlockScan {
        scan::scan(&self.store, self.clamp(origin), direction, policy)
    }

    // -- Search -------------------------------------------------------------

    /// Find the next literal occurrence of `needle`, starting at `from`
    /// (inclusive), walking in `direction`. Non-wrapping; the terminator is
    /// not searchable text. Returns the match start.
    #[must_use]
    pub fn find(&self, needle: &[u8], from: Location, direction: Direction) -> Option<Location> {
        let text_len = self.end_location();
        if needle.is_empty() || needle.len() > text_len {
            return None;
        }
        let last = text_len - needle.len();
        let hit = |at: usize| (0..needle.len()).all(|i| self.store.byte(at + i) == needle[i]);

        match direction {
            Direction::Forward => (from..=last).find(|&at| hit(at)),
            Direction::Backward => (0..=last.min(from)).rev().find(|&at| hit(at)),
        }
    }

    /// All non-overlapping occurrences of `needle` starting within
    /// `[start, end)`, for match-highlighting collaborators.
    #[must_use]
    pub fn find_all(&self, needle: &[u8], start: Location, end: Location) -> Vec<Location> {
        let mut out = Vec::new();
        if needle.is_empty() {
            return out;
        }
        let mut at = start;
        while let Some(hit) = self.find(needle, at, Direction::Forward) {
            if hit >= end {
                break;
            }
            out.push(hit);
            at = hit + needle.len();
        }
        out
    }

    // -- Syntax -------------------------------------------------------------

    /// Attach a highlighter with the given keyword set and scan the current
    /// contents.
    ///
    /// # Errors
    ///
    /// Propagates an internal scan failure (inline mode only).
    pub fn attach_highlighter(&mut self, keywords: &[&str]) -> Result<(), TextError> {
        let mut highlighter =
            Highlighter::new(Arc::clone(&self.pool), self.background(), keywords);
        let snapshot = self.store.snapshot();
        let end = snapshot.len();
        highlighter.update(snapshot, 0, end)?;
        self.highlighter = Some(highlighter);
        Ok(())
    }

    /// Attach the stock shader-language highlighter.
    ///
    /// # Errors
    ///
    /// Propagates an internal scan failure (inline mode only).
    pub fn attach_shader_highlighter(&mut self) -> Result<(), TextError> {
        let mut highlighter = Highlighter::shader(Arc::clone(&self.pool), self.background());
        let snapshot = self.store.snapshot();
        let end = snapshot.len();
        highlighter.update(snapshot, 0, end)?;
        self.highlighter = Some(highlighter);
        Ok(())
    }

    /// Classification at `offset`; `Normal` without a highlighter or past
    /// its settled prefix.
    #[must_use]
    pub fn syntax_at(&self, offset: Location) -> SyntaxKind {
        self.highlighter
            .as_ref()
            .map_or(SyntaxKind::Normal, |h| h.kind_at(offset))
    }

    /// Presentation color at `offset` (the highlighter's fixed mapping).
    #[must_use]
    pub fn color_at(&self, offset: Location) -> u32 {
        self.highlighter
            .as_ref()
            .map_or(SyntaxKind::Normal.color(), |h| h.color_at(offset))
    }

    /// The attached highlighter, if any.
    #[must_use]
    pub const fn highlighter(&self) -> Option<&Highlighter> {
        self.highlighter.as_ref()
    }

    // -- Mutation -----------------------------------------------------------

    /// Splice `text` in at `offset`.
    ///
    /// Valid offsets address the text extent: `0..=end_location()`, where
    /// inserting at `end_location()` appends just before the terminator.
    ///
    /// # Errors
    ///
    /// [`TextError::OutOfRange`] past that extent (nothing mutates), or a
    /// propagated invariant failure from a joined background worker.
    pub fn insert(
        &mut self,
        offset: Location,
        text: &[u8],
        cursor: Option<Location>,
    ) -> Result<(), TextError> {
        let extent = self.store.len();
        if offset >= extent {
            return Err(TextError::OutOfRange {
                offset,
                length: extent - 1,
            });
        }

        self.stop_workers()?;
        self.publish(ChangeKind::PreChange, offset, extent, None);

        // Patch the index from the edited bytes alone, then splice.
        let new_ends = lines::scan_inserted(text, offset);
        self.lines.splice_inserted(offset, &new_ends, text.len());
        self.store.insert(offset, text);
        self.modified = true;

        self.rearm_syntax(offset)?;
        self.publish(ChangeKind::TextAdded, offset, offset + text.len(), cursor);
        Ok(())
    }

    /// Erase the byte range `[start, end)`.
    ///
    /// Requires `start <= end` and `end <= end_location()` — the terminator
    /// is never deletable.
    ///
    /// # Errors
    ///
    /// [`TextError::InvalidRange`] on a violated precondition (nothing
    /// mutates); [`TextError::InvariantViolation`] if the store comes out
    /// of the splice without its terminator.
    pub fn delete(
        &mut self,
        start: Location,
        end: Location,
        cursor: Option<Location>,
    ) -> Result<(), TextError> {
        if start > end || end > self.end_location() {
            return Err(TextError::InvalidRange {
                start,
                end,
                length: self.end_location(),
            });
        }

        self.stop_workers()?;
        self.publish(ChangeKind::PreChange, start, end, None);

        self.lines.remove_span(start, end);
        self.store.erase(start, end);
        if self.store.is_empty() || self.store.byte(self.store.len() - 1) != TERMINATOR {
            return Err(TextError::InvariantViolation {
                reason: "store must end with the terminator",
            });
        }
        self.modified = true;

        self.rearm_syntax(start)?;
        self.publish(ChangeKind::TextDeleted, start, end, cursor);
        Ok(())
    }

    /// Replace the whole document.
    ///
    /// Publishes a delete-everything/add-everything pair around the swap
    /// and schedules a full line-index rebuild (background, or inline when
    /// disabled) — after wholesale replacement nothing of the old index is
    /// reusable. Clears the modified flag.
    ///
    /// # Errors
    ///
    /// Propagates an invariant failure from a joined or inline worker.
    pub fn set_text(&mut self, text: &str) -> Result<(), TextError> {
        self.stop_workers()?;
        self.publish(ChangeKind::TextDeleted, 0, self.store.len(), None);

        let mut bytes = text.as_bytes().to_vec();
        if bytes.last() != Some(&TERMINATOR) {
            bytes.push(TERMINATOR);
        }
        self.store = GapBuffer::from_bytes(&bytes);

        self.lines.reset();
        if self.background() {
            let index = Arc::clone(&self.lines);
            let snapshot = bytes;
            self.line_task = Some(
                self.pool
                    .submit(move |cancel| Ok(lines::build(&index, &snapshot, cancel))),
            );
        } else {
            let _ = lines::build(&self.lines, &bytes, &CancelToken::new());
        }

        self.rearm_syntax(0)?;
        self.publish(ChangeKind::TextAdded, 0, self.store.len(), None);
        self.modified = false;
        Ok(())
    }

    /// Wait for in-flight background work to run to completion — no
    /// cancellation, no mutation.
    ///
    /// Hosts call this before reads that must see fully built indices
    /// (saving, whole-document queries). Contrast with the mutation paths,
    /// which cancel the workers because their results are about to be
    /// invalidated anyway.
    ///
    /// # Errors
    ///
    /// Surfaces an internal error a background worker left behind.
    pub fn settle(&mut self) -> Result<(), TextError> {
        if let Some(task) = self.line_task.take() {
            match task.join() {
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(err),
                None => {
                    return Err(TextError::InvariantViolation {
                        reason: "line index worker terminated abnormally",
                    });
                }
            }
        }
        if let Some(highlighter) = self.highlighter.as_mut() {
            highlighter.settle()?;
        }
        Ok(())
    }

    // -- Internals ----------------------------------------------------------

    /// Cancel and join both background workers. Foreground code may touch
    /// the store and indices only after this returns.
    fn stop_workers(&mut self) -> Result<(), TextError> {
        if let Some(task) = self.line_task.take() {
            task.request_cancel();
            match task.join() {
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(err),
                None => {
                    return Err(TextError::InvariantViolation {
                        reason: "line index worker terminated abnormally",
                    });
                }
            }
        }
        if let Some(highlighter) = self.highlighter.as_mut() {
            highlighter.interrupt()?;
        }
        Ok(())
    }

    /// Restart the syntax scan for everything at and after `start`.
    fn rearm_syntax(&mut self, start: Location) -> Result<(), TextError> {
        if let Some(highlighter) = self.highlighter.as_mut() {
            let snapshot = self.store.snapshot();
            let end = snapshot.len();
            highlighter.update(snapshot, start, end)?;
        }
        Ok(())
    }

    fn publish(&self, kind: ChangeKind, start: Location, end: Location, cursor: Option<Location>) {
        // Whether anyone claimed the message is the publisher's concern,
        // not the buffer's.
        let _ = self.channel.publish(&BufferEvent {
            buffer: self.id,
            kind,
            start,
            end,
            cursor,
        });
    }
}

impl Drop for TextBuffer {
    fn drop(&mut self) {
        let _ = self.stop_workers();
    }
}

impl fmt::Debug for TextBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextBuffer")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("len", &self.store.len())
            .field("lines", &self.lines.line_count())
            .field("modified", &self.modified)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use mote_sync::Subscriber;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Inline-mode buffer (deterministic) over `text`.
    fn make(text: &str) -> TextBuffer {
        let mut buf = TextBuffer::new(
            BufferId(1),
            "scratch",
            Arc::new(Channel::new()),
            Arc::new(TaskPool::new(2)),
            EngineFlags::DISABLE_BACKGROUND,
        );
        buf.set_text(text).expect("set_text");
        buf
    }

    /// Background-mode buffer sharing the given channel.
    fn make_background(channel: Arc<Channel<BufferEvent>>) -> TextBuffer {
        TextBuffer::new(
            BufferId(2),
            "threaded",
            channel,
            Arc::new(TaskPool::new(2)),
            EngineFlags::empty(),
        )
    }

    /// The line index must match a from-scratch rescan of the current text.
    fn assert_index_consistent(buf: &TextBuffer) {
        let expect = LineIndex::new();
        let _ = lines::build(&expect, &buf.snapshot(), &CancelToken::new());
        assert_eq!(buf.lines.entries(), expect.entries(), "index vs full rescan");

        let entries = buf.lines.entries();
        assert!(entries.windows(2).all(|w| w[0] < w[1]), "strictly increasing");
        assert_eq!(*entries.last().unwrap(), buf.len(), "last entry is length");
    }

    fn assert_sentinel(buf: &TextBuffer) {
        assert!(buf.len() >= 1);
        assert_eq!(buf.byte_at(buf.end_location()), Some(TERMINATOR));
    }

    // -- Construction & set_text --------------------------------------------

    #[test]
    fn new_buffer_is_one_empty_line() {
        let buf = TextBuffer::new(
            BufferId(0),
            "empty",
            Arc::new(Channel::new()),
            Arc::new(TaskPool::new(1)),
            EngineFlags::DISABLE_BACKGROUND,
        );
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.text(), "");
        assert_eq!(buf.line_count(), 1);
        assert_eq!(buf.end_location(), 0);
        assert!(!buf.is_modified());
        assert_sentinel(&buf);
    }

    #[test]
    fn set_text_basic() {
        let buf = make("ab\ncd");
        assert_eq!(buf.text(), "ab\ncd");
        assert_eq!(buf.len(), 6);
        assert_eq!(buf.line_count(), 2);
        assert!(!buf.is_modified());
        assert_index_consistent(&buf);
    }

    #[test]
    fn set_text_empty() {
        let buf = make("");
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.line_count(), 1);
        assert_sentinel(&buf);
    }

    #[test]
    fn set_text_replaces_previous_contents() {
        let mut buf = make("old contents\nwith lines");
        buf.set_text("new").unwrap();
        assert_eq!(buf.text(), "new");
        assert_index_consistent(&buf);
    }

    #[test]
    fn buffer_identity() {
        let buf = make("x");
        assert_eq!(buf.id(), BufferId(1));
        assert_eq!(buf.name(), "scratch");
    }

    // -- Insert -------------------------------------------------------------

    #[test]
    fn insert_in_middle() {
        let mut buf = make("hllo");
        buf.insert(1, b"e", None).unwrap();
        assert_eq!(buf.text(), "hello");
        assert!(buf.is_modified());
        assert_index_consistent(&buf);
    }

    #[test]
    fn insert_at_start_and_end() {
        let mut buf = make("bc");
        buf.insert(0, b"a", None).unwrap();
        assert_eq!(buf.text(), "abc");
        // end_location() addresses the terminator: appending there.
        let end = buf.end_location();
        buf.insert(end, b"d", None).unwrap();
        assert_eq!(buf.text(), "abcd");
        assert_sentinel(&buf);
        assert_index_consistent(&buf);
    }

    #[test]
    fn insert_with_newlines_patches_index() {
        let mut buf = make("ab\ncd");
        buf.insert(1, b"x\ny\r\nz", None).unwrap();
        assert_eq!(buf.text(), "ax\ny\r\nzb\ncd");
        assert_index_consistent(&buf);
    }

    #[test]
    fn insert_out_of_range_is_rejected() {
        let mut buf = make("abc");
        let err = buf.insert(4, b"x", None).unwrap_err();
        assert_eq!(
            err,
            TextError::OutOfRange {
                offset: 4,
                length: 3
            }
        );
        // Nothing mutated.
        assert_eq!(buf.text(), "abc");
        assert!(!buf.is_modified());
        assert_index_consistent(&buf);
    }

    #[test]
    fn insert_empty_text_changes_nothing_textual() {
        let mut buf = make("abc");
        buf.insert(1, b"", None).unwrap();
        assert_eq!(buf.text(), "abc");
        assert_index_consistent(&buf);
    }

    // -- Delete -------------------------------------------------------------

    #[test]
    fn delete_within_line() {
        let mut buf = make("hello");
        buf.delete(1, 3, None).unwrap();
        assert_eq!(buf.text(), "hlo");
        assert!(buf.is_modified());
        assert_index_consistent(&buf);
    }

    #[test]
    fn delete_across_line_break() {
        let mut buf = make("ab\ncd");
        buf.delete(1, 4, None).unwrap();
        assert_eq!(buf.text(), "ad");
        assert_index_consistent(&buf);
    }

    #[test]
    fn delete_everything_leaves_the_empty_line() {
        let mut buf = make("ab\ncd");
        buf.delete(0, buf.end_location(), None).unwrap();
        assert_eq!(buf.text(), "");
        assert_eq!(buf.line_count(), 1);
        assert_sentinel(&buf);
        assert_index_consistent(&buf);
    }

    #[test]
    fn delete_reversed_range_is_rejected() {
        let mut buf = make("abc");
        let err = buf.delete(2, 1, None).unwrap_err();
        assert!(matches!(err, TextError::InvalidRange { start: 2, end: 1, .. }));
        assert_eq!(buf.text(), "abc");
    }

    #[test]
    fn delete_cannot_touch_the_terminator() {
        let mut buf = make("abc");
        // end == end_location() is fine; one past it is not.
        let err = buf.delete(0, buf.len(), None).unwrap_err();
        assert!(matches!(err, TextError::InvalidRange { .. }));
        assert_eq!(buf.text(), "abc");
    }

    #[test]
    fn delete_empty_range_is_harmless() {
        let mut buf = make("abc");
        buf.delete(1, 1, None).unwrap();
        assert_eq!(buf.text(), "abc");
        assert_index_consistent(&buf);
    }

    // -- Round trip & invariants --------------------------------------------

    #[test]
    fn insert_then_delete_round_trips() {
        let mut buf = make("abc def\n\tghi");
        let before = buf.snapshot();
        buf.insert(4, b"NEW\nTEXT", None).unwrap();
        buf.delete(4, 4 + 8, None).unwrap();
        assert_eq!(buf.snapshot(), before);
        assert_index_consistent(&buf);
    }

    #[test]
    fn sentinel_invariant_survives_edit_sequences() {
        let mut buf = make("one\ntwo\nthree");
        let edits: &[(&str, usize, usize)] = &[
            ("insert", 0, 0),
            ("insert", 4, 0),
            ("delete", 1, 3),
            ("insert", 8, 0),
            ("delete", 0, 5),
            ("delete", 0, 0),
        ];
        for &(op, a, b) in edits {
            match op {
                "insert" => buf.insert(a, b"x\ny", None).unwrap(),
                _ => buf.delete(a, b, None).unwrap(),
            }
            assert_sentinel(&buf);
            assert_index_consistent(&buf);
        }
        buf.set_text("").unwrap();
        assert_sentinel(&buf);
        assert_index_consistent(&buf);
    }

    // -- Line queries -------------------------------------------------------

    #[test]
    fn line_lookups() {
        let buf = make("ab\ncd\nef");
        assert_eq!(buf.line_count(), 3);
        assert_eq!(buf.line_offsets(0), Some((0, 3)));
        assert_eq!(buf.line_offsets(1), Some((3, 6)));
        assert_eq!(buf.line_offsets(2), Some((6, 9)));
        assert_eq!(buf.line_offsets(3), None);

        assert_eq!(buf.line_from_offset(0), 0);
        assert_eq!(buf.line_from_offset(3), 1);
        assert_eq!(buf.line_from_offset(7), 2);
        assert_eq!(buf.line_from_offset(100), 2);
    }

    #[test]
    fn line_positions_on_a_padded_line() {
        //         0123456789
        let buf = make("  hello \nx");
        assert_eq!(buf.line_position(0, LinePoint::Begin), 0);
        assert_eq!(buf.line_position(0, LinePoint::End), 9);
        assert_eq!(buf.line_position(0, LinePoint::BreakBegin), 8);
        assert_eq!(buf.line_position(0, LinePoint::FirstGraphic), 2);
        assert_eq!(buf.line_position(0, LinePoint::LastNonBreak), 7); // trailing space
        assert_eq!(buf.line_position(0, LinePoint::LastGraphic), 6); // 'o'
    }

    #[test]
    fn line_positions_on_an_empty_line() {
        let buf = make("a\n\nb");
        // Line 1 is just "\n": [2, 3).
        assert_eq!(buf.line_position(1, LinePoint::Begin), 2);
        assert_eq!(buf.line_position(1, LinePoint::BreakBegin), 2);
        assert_eq!(buf.line_position(1, LinePoint::FirstGraphic), 3); // none: falls to end
        assert_eq!(buf.line_position(1, LinePoint::LastNonBreak), 3);
        assert_eq!(buf.line_position(1, LinePoint::LastGraphic), 3);
    }

    #[test]
    fn line_positions_on_the_last_line() {
        let buf = make("x");
        // One line [0, 2) holding "x" + terminator.
        assert_eq!(buf.line_position(0, LinePoint::BreakBegin), 1); // the terminator
        assert_eq!(buf.line_position(0, LinePoint::LastNonBreak), 0);
        assert_eq!(buf.line_position(0, LinePoint::LastGraphic), 0);
    }

    #[test]
    fn line_position_clamps_the_line_number() {
        let buf = make("ab\ncd");
        assert_eq!(buf.line_position(99, LinePoint::Begin), 3);
    }

    // -- Character stepping -------------------------------------------------

    #[test]
    fn char_stepping_over_crlf() {
        //         a  b  \r \n c  d
        let buf = make("ab\r\ncd");
        assert_eq!(buf.location_after_chars(1, 1), 2); // onto the \r
        assert_eq!(buf.location_after_chars(1, 2), 4); // CRLF is one step
        assert_eq!(buf.location_after_chars(4, -1), 2); // back over the pair
        assert_eq!(buf.location_after_chars(0, 0), 0);
    }

    #[test]
    fn char_stepping_clamps_at_the_edges() {
        let buf = make("abc");
        assert_eq!(buf.location_after_chars(2, 10), buf.end_location());
        assert_eq!(buf.location_after_chars(1, -10), 0);
    }

    // -- Motion primitive ---------------------------------------------------

    #[test]
    fn scan_block_two_words() {
        let buf = make("abc def\n\tghi");
        let r = buf.scan_block(1, Direction::Forward, ScanPolicy::Word);
        assert_eq!(r.first_block, 0);
        assert_eq!(r.first_non_block, 3);
        assert!(r.space_between);
        assert_eq!(r.second_block, 4);
        assert_eq!(r.second_non_block, 7);
    }

    #[test]
    fn scan_block_after_deleting_the_separator() {
        let mut buf = make("abc def\n\tghi");
        buf.delete(3, 4, None).unwrap();
        assert_eq!(buf.text(), "abcdef\n\tghi");
        // The runs merge: one block to the newline, next block past the
        // whitespace.
        let r = buf.scan_block(1, Direction::Forward, ScanPolicy::Word);
        assert_eq!(r.first_block, 0);
        assert_eq!(r.first_non_block, 6);
        assert!(r.space_between);
        assert_eq!(r.second_block, 8);
        assert_eq!(r.second_non_block, 11);
    }

    #[test]
    fn scan_block_clamps_origin() {
        let buf = make("ab");
        let r = buf.scan_block(500, Direction::Forward, ScanPolicy::Word);
        assert_eq!(r.origin, buf.end_location());
    }

    // -- Search -------------------------------------------------------------

    #[test]
    fn find_forward_and_backward() {
        let buf = make("one two one two");
        assert_eq!(buf.find(b"two", 0, Direction::Forward), Some(4));
        assert_eq!(buf.find(b"two", 5, Direction::Forward), Some(12));
        assert_eq!(buf.find(b"two", 13, Direction::Forward), None);
        assert_eq!(buf.find(b"one", 14, Direction::Backward), Some(8));
        assert_eq!(buf.find(b"one", 7, Direction::Backward), Some(0));
    }

    #[test]
    fn find_misses_and_edge_cases() {
        let buf = make("abc");
        assert_eq!(buf.find(b"zzz", 0, Direction::Forward), None);
        assert_eq!(buf.find(b"", 0, Direction::Forward), None);
        assert_eq!(buf.find(b"abcd", 0, Direction::Forward), None); // longer than text
        // The terminator is not searchable.
        assert_eq!(buf.find(&[TERMINATOR], 0, Direction::Forward), None);
    }

    #[test]
    fn find_match_at_text_end() {
        let buf = make("xyzabc");
        assert_eq!(buf.find(b"abc", 0, Direction::Forward), Some(3));
        assert_eq!(buf.find(b"abc", 3, Direction::Forward), Some(3));
    }

    #[test]
    fn find_all_non_overlapping() {
        let buf = make("aaaa");
        assert_eq!(buf.find_all(b"aa", 0, buf.len()), vec![0, 2]);
        assert_eq!(buf.find_all(b"aa", 1, buf.len()), vec![1]);
        assert_eq!(buf.find_all(b"aa", 0, 1), vec![0]);
        assert_eq!(buf.find_all(b"zz", 0, buf.len()), Vec::<usize>::new());
    }

    // -- Notifications ------------------------------------------------------

    /// A collaborator that keeps a cursor valid across edits: snapshots on
    /// pre-change, remaps on the post-change message.
    struct CursorProbe {
        cursor: Mutex<Location>,
        log: Mutex<Vec<ChangeKind>>,
    }

    impl CursorProbe {
        fn new(at: Location) -> Arc<Self> {
            Arc::new(Self {
                cursor: Mutex::new(at),
                log: Mutex::new(Vec::new()),
            })
        }
    }

    impl Subscriber<BufferEvent> for CursorProbe {
        fn notify(&self, event: &BufferEvent) -> bool {
            self.log.lock().unwrap().push(event.kind);
            let mut cursor = self.cursor.lock().unwrap();
            match event.kind {
                ChangeKind::PreChange => {}
                ChangeKind::TextAdded => {
                    if *cursor >= event.start {
                        *cursor += event.end - event.start;
                    }
                }
                ChangeKind::TextDeleted => {
                    if *cursor >= event.end {
                        *cursor -= event.end - event.start;
                    } else if *cursor >= event.start {
                        *cursor = event.start;
                    }
                }
            }
            true
        }
    }

    #[test]
    fn notifications_bracket_every_edit() {
        let channel = Arc::new(Channel::new());
        let mut buf = TextBuffer::new(
            BufferId(7),
            "watched",
            Arc::clone(&channel),
            Arc::new(TaskPool::new(1)),
            EngineFlags::DISABLE_BACKGROUND,
        );
        buf.set_text("hello world").unwrap();

        let probe = CursorProbe::new(6); // on 'w'
        let subscriber: Arc<dyn Subscriber<BufferEvent>> = probe.clone();
        channel.subscribe(&subscriber);

        buf.insert(0, b"xx", Some(0)).unwrap();
        assert_eq!(
            *probe.log.lock().unwrap(),
            vec![ChangeKind::PreChange, ChangeKind::TextAdded]
        );
        // The remapped cursor still points at 'w' in the new layout.
        let cursor = *probe.cursor.lock().unwrap();
        assert_eq!(cursor, 8);
        assert_eq!(buf.byte_at(cursor), Some(b'w'));

        probe.log.lock().unwrap().clear();
        buf.delete(0, 2, None).unwrap();
        assert_eq!(
            *probe.log.lock().unwrap(),
            vec![ChangeKind::PreChange, ChangeKind::TextDeleted]
        );
        let cursor = *probe.cursor.lock().unwrap();
        assert_eq!(cursor, 6);
        assert_eq!(buf.byte_at(cursor), Some(b'w'));
    }

    #[test]
    fn set_text_publishes_delete_then_add() {
        let channel = Arc::new(Channel::new());
        let mut buf = TextBuffer::new(
            BufferId(8),
            "watched",
            Arc::clone(&channel),
            Arc::new(TaskPool::new(1)),
            EngineFlags::DISABLE_BACKGROUND,
        );
        let probe = CursorProbe::new(0);
        let subscriber: Arc<dyn Subscriber<BufferEvent>> = probe.clone();
        channel.subscribe(&subscriber);

        buf.set_text("fresh").unwrap();
        assert_eq!(
            *probe.log.lock().unwrap(),
            vec![ChangeKind::TextDeleted, ChangeKind::TextAdded]
        );
    }

    #[test]
    fn events_carry_the_cursor_hint() {
        let channel = Arc::new(Channel::new());
        let mut buf = TextBuffer::new(
            BufferId(9),
            "watched",
            Arc::clone(&channel),
            Arc::new(TaskPool::new(1)),
            EngineFlags::DISABLE_BACKGROUND,
        );
        buf.set_text("abc").unwrap();

        struct HintProbe(Mutex<Vec<Option<Location>>>);
        impl Subscriber<BufferEvent> for HintProbe {
            fn notify(&self, event: &BufferEvent) -> bool {
                if event.kind != ChangeKind::PreChange {
                    self.0.lock().unwrap().push(event.cursor);
                }
                true
            }
        }
        let probe = Arc::new(HintProbe(Mutex::new(Vec::new())));
        let subscriber: Arc<dyn Subscriber<BufferEvent>> = probe.clone();
        channel.subscribe(&subscriber);

        buf.insert(1, b"x", Some(2)).unwrap();
        buf.delete(0, 1, Some(0)).unwrap();
        assert_eq!(*probe.0.lock().unwrap(), vec![Some(2), Some(0)]);
    }

    // -- Syntax integration -------------------------------------------------

    #[test]
    fn highlighting_follows_edits() {
        let mut buf = make("int x;");
        buf.attach_highlighter(&["int", "uint"]).unwrap();
        assert_eq!(buf.syntax_at(0), SyntaxKind::Keyword);
        assert_eq!(buf.syntax_at(4), SyntaxKind::Normal);

        // "int" → "uint": still a keyword, one byte longer.
        buf.insert(0, b"u", None).unwrap();
        for i in 0..4 {
            assert_eq!(buf.syntax_at(i), SyntaxKind::Keyword, "offset {i}");
        }

        buf.delete(0, 1, None).unwrap();
        assert_eq!(buf.syntax_at(0), SyntaxKind::Keyword);
        assert_eq!(buf.syntax_at(3), SyntaxKind::Whitespace);
    }

    #[test]
    fn no_highlighter_answers_normal() {
        let buf = make("int x;");
        assert_eq!(buf.syntax_at(0), SyntaxKind::Normal);
        assert_eq!(buf.color_at(0), 0xFFFF_FFFF);
        assert!(buf.highlighter().is_none());
    }

    #[test]
    fn shader_highlighter_marks_types() {
        let mut buf = make("vec3 color;");
        buf.attach_shader_highlighter().unwrap();
        for i in 0..4 {
            assert_eq!(buf.syntax_at(i), SyntaxKind::Keyword, "offset {i}");
        }
    }

    // -- Clamping & metadata ------------------------------------------------

    #[test]
    fn clamp_location_and_line() {
        let buf = make("ab\ncd");
        assert_eq!(buf.clamp(2), 2);
        assert_eq!(buf.clamp(100), buf.end_location());
        assert_eq!(buf.clamp_line(0), 0);
        assert!(buf.clamp_line(100) <= buf.line_count());
    }

    #[test]
    fn modified_flag_lifecycle() {
        let mut buf = make("abc");
        assert!(!buf.is_modified());
        buf.insert(0, b"x", None).unwrap();
        assert!(buf.is_modified());
        buf.mark_saved();
        assert!(!buf.is_modified());
        buf.delete(0, 1, None).unwrap();
        assert!(buf.is_modified());
        buf.set_text("fresh").unwrap();
        assert!(!buf.is_modified());
    }

    // -- Background mode ----------------------------------------------------

    #[test]
    fn background_edits_match_inline_results() {
        let text = "fn main() {\n    let x = 1;\n}\n".repeat(64);

        let mut inline = make(&text);
        let mut threaded = make_background(Arc::new(Channel::new()));
        threaded.set_text(&text).unwrap();
        threaded.settle().unwrap(); // let the full build land before patching

        for buf in [&mut inline, &mut threaded] {
            buf.insert(5, b"spliced\nacross\nlines\n", None).unwrap();
            buf.delete(2, 40, None).unwrap();
            buf.insert(buf.end_location(), b"tail", None).unwrap();
        }
        threaded.settle().unwrap();

        assert_eq!(threaded.text(), inline.text());
        assert_eq!(threaded.lines.entries(), inline.lines.entries());
        assert_eq!(threaded.processed_lines(), inline.processed_lines());
    }

    #[test]
    fn cancelling_a_build_mid_flight_is_safe() {
        let mut buf = make_background(Arc::new(Channel::new()));
        let big = "line of text\n".repeat(20_000);

        // Kick off a large background build, then immediately edit: the
        // edit cancels and joins the build (bounded), patches whatever
        // prefix was committed, and must not deadlock.
        buf.set_text(&big).unwrap();
        buf.insert(0, b"x", None).unwrap();
        assert_sentinel(&buf);

        // A subsequent full rebuild restores a correct, complete index.
        buf.set_text(&big).unwrap();
        buf.settle().unwrap();
        assert_index_consistent(&buf);
        assert_eq!(buf.line_count(), 20_001);
    }

    #[test]
    fn settle_joins_quietly_when_idle() {
        let mut buf = make("abc");
        buf.settle().unwrap();
        buf.settle().unwrap();
    }
}
