//! Incremental syntax tokenizer — the second background worker.
//!
//! Structurally the twin of the line-index builder: a cancellable scan over
//! an immutable snapshot, committing progress into a shared map guarded by
//! a reader/writer lock plus an atomic high-water mark. Where the line
//! builder commits one entry per line, this one commits one classification
//! tag per byte offset.
//!
//! # Resumability
//!
//! [`Highlighter::update`] may be handed any edit offset. To avoid resuming
//! mid-token it first walks backward to the previous line boundary, then to
//! the previous delimiter, and tokenizes forward from there to the end of
//! the store. The end offset callers supply is accepted as a hint only —
//! rescanning to the end is never *under*-scanning, and bounding the rescan
//! once classification restabilizes is an optimization this implementation
//! deliberately does not take.
//!
//! # Classification
//!
//! Tokens are runs bounded by a fixed delimiter set (whitespace and
//! `.;(){}=`). `//` marks through end-of-line as [`SyntaxKind::Comment`];
//! a token containing `/*` opens comment carry, one containing `*/` closes
//! it and retroactively marks the carried span; otherwise a keyword-set
//! match is [`SyntaxKind::Keyword`], an all-digit token
//! [`SyntaxKind::Integer`], anything else [`SyntaxKind::Normal`]. Space
//! bytes inside the consumed span are tagged [`SyntaxKind::Whitespace`].

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use mote_sync::{CancelToken, TaskHandle, TaskPool};

use crate::error::{Outcome, ScanResult, TextError};
use crate::location::Location;

/// Token boundaries: whitespace plus the punctuation that always splits.
const DELIMITERS: &[u8] = b" \t.\r\n;(){}=";

#[inline]
fn is_delimiter(b: u8) -> bool {
    DELIMITERS.contains(&b)
}

// ---------------------------------------------------------------------------
// SyntaxKind
// ---------------------------------------------------------------------------

/// Classification tag for one byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyntaxKind {
    #[default]
    Normal,
    Comment,
    Keyword,
    Integer,
    Whitespace,
}

impl SyntaxKind {
    /// Presentation color (`0xAARRGGBB`). The mapping is fixed here because
    /// it is trivial; real theming belongs to the render layer.
    #[must_use]
    pub const fn color(self) -> u32 {
        match self {
            Self::Normal => 0xFFFF_FFFF,
            Self::Comment => 0xFF00_FF11,
            Self::Keyword => 0xFFFF_FF11,
            Self::Integer => 0xFF11_FFFF,
            Self::Whitespace => 0xFF22_3322,
        }
    }
}

// ---------------------------------------------------------------------------
// SyntaxMap
// ---------------------------------------------------------------------------

/// Shared per-byte classification, parallel to the document store.
///
/// The vector sits behind an `RwLock`; `processed` is the high-water byte
/// offset the background scan has settled, readable without locking.
/// Queries past the high-water mark answer [`SyntaxKind::Normal`] — stale
/// is visible, never unsafe.
#[derive(Debug, Default)]
pub struct SyntaxMap {
    kinds: RwLock<Vec<SyntaxKind>>,
    processed: AtomicUsize,
}

impl SyntaxMap {
    /// High-water byte offset of settled classification.
    #[inline]
    #[must_use]
    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::Relaxed)
    }

    /// Classification at `offset`; `Normal` beyond the high-water mark or
    /// the map's extent.
    #[must_use]
    pub fn kind_at(&self, offset: Location) -> SyntaxKind {
        if self.processed() < offset {
            return SyntaxKind::Normal;
        }
        let kinds = self.kinds.read().expect("syntax map poisoned");
        kinds.get(offset).copied().unwrap_or_default()
    }

    /// Copy of the tags (test and verification support).
    #[must_use]
    pub fn entries(&self) -> Vec<SyntaxKind> {
        self.kinds.read().expect("syntax map poisoned").clone()
    }

    /// Match the map's extent to the store's, defaulting new cells.
    fn resize(&self, len: usize) {
        let mut kinds = self.kinds.write().expect("syntax map poisoned");
        kinds.resize(len, SyntaxKind::Normal);
    }

    /// Tag every byte in `[start, end)`.
    fn mark(&self, start: usize, end: usize, kind: SyntaxKind) {
        let mut kinds = self.kinds.write().expect("syntax map poisoned");
        for slot in &mut kinds[start..end] {
            *slot = kind;
        }
    }

    /// Tag the space bytes (`b' '` exactly) in `[start, end)`.
    fn mark_spaces(&self, text: &[u8], start: usize, end: usize) {
        let mut kinds = self.kinds.write().expect("syntax map poisoned");
        for i in start..end {
            if text[i] == b' ' {
                kinds[i] = SyntaxKind::Whitespace;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tokenizer worker
// ---------------------------------------------------------------------------

fn position_from(text: &[u8], from: usize, pred: impl Fn(u8) -> bool) -> Option<usize> {
    text[from..].iter().position(|&b| pred(b)).map(|i| from + i)
}

fn contains_pair(token: &[u8], pair: &[u8]) -> bool {
    token.windows(2).any(|w| w == pair)
}

/// Walk back from `start` to the previous line boundary, then to the
/// previous delimiter — a position tokenization can safely resume from
/// without landing mid-token.
fn safe_restart_point(text: &[u8], start: usize) -> usize {
    if text.is_empty() {
        return 0;
    }
    let mut cur = start.min(text.len() - 1);
    while cur > 0 && !matches!(text[cur], b'\r' | b'\n') {
        cur -= 1;
    }
    while cur > 0 && !is_delimiter(text[cur]) {
        cur -= 1;
    }
    cur
}

/// Tokenize `text` from `start` to its end, committing tags into `map`.
///
/// Polls `cancel` once per token. A scan position that fails to advance is
/// an internal-consistency failure — reported, never looped on.
fn tokenize(
    map: &SyntaxMap,
    keywords: &HashSet<Vec<u8>>,
    text: &[u8],
    start: usize,
    cancel: &CancelToken,
) -> ScanResult {
    let len = text.len();
    let mut cur = start;
    let mut open_comment: Option<usize> = None;
    let mut last_pos: Option<usize> = None;

    while cur != len {
        if last_pos.is_some_and(|p| p >= cur) {
            return Err(TextError::InvariantViolation {
                reason: "syntax scan made no progress",
            });
        }
        last_pos = Some(cur);

        if cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }

        // Next token: first non-delimiter, run to the next delimiter.
        let Some(first) = position_from(text, cur, |b| !is_delimiter(b)) else {
            break;
        };
        let last = position_from(text, first, is_delimiter).unwrap_or(len);
        let token = &text[first..last];

        if token == b"//" {
            // Comment to end of line.
            let eol = position_from(text, last, |b| matches!(b, b'\r' | b'\n')).unwrap_or(len);
            map.mark(first, eol, SyntaxKind::Comment);
            map.mark_spaces(text, cur, eol);
            cur = eol;
            continue;
        } else if contains_pair(token, b"/*") {
            open_comment = Some(first);
        } else if contains_pair(token, b"*/") {
            // Close the carried span and mark the whole of it.
            if let Some(begin) = open_comment.take() {
                map.mark(begin, last, SyntaxKind::Comment);
                map.mark_spaces(text, begin, last);
            }
        } else {
            let kind = if keywords.contains(token) {
                SyntaxKind::Keyword
            } else if token.iter().all(u8::is_ascii_digit) {
                SyntaxKind::Integer
            } else {
                SyntaxKind::Normal
            };
            map.mark(first, last, kind);
            map.mark_spaces(text, cur, last);
        }

        map.processed.store(cur, Ordering::Relaxed);
        cur = last;
    }

    map.processed.store(len.saturating_sub(1), Ordering::Relaxed);
    Ok(Outcome::Completed)
}

// ---------------------------------------------------------------------------
// Highlighter
// ---------------------------------------------------------------------------

/// Owns one buffer's syntax map and the worker that fills it.
///
/// At most one scan is in flight at a time; the owning buffer interrupts it
/// (cancel + bounded join) before every mutation and re-arms it afterwards
/// with a fresh snapshot.
pub struct Highlighter {
    map: Arc<SyntaxMap>,
    keywords: Arc<HashSet<Vec<u8>>>,
    pool: Arc<TaskPool>,
    background: bool,
    task: Option<TaskHandle<ScanResult>>,
}

impl Highlighter {
    /// Create a highlighter with an explicit keyword set.
    #[must_use]
    pub fn new(pool: Arc<TaskPool>, background: bool, keywords: &[&str]) -> Self {
        Self {
            map: Arc::new(SyntaxMap::default()),
            keywords: Arc::new(keywords.iter().map(|k| k.as_bytes().to_vec()).collect()),
            pool,
            background,
            task: None,
        }
    }

    /// The stock shader-language keyword set.
    #[must_use]
    pub fn shader(pool: Arc<TaskPool>, background: bool) -> Self {
        const KEYWORDS: &[&str] = &[
            "float", "vec2", "vec3", "vec4", "int", "uint", "mat2", "mat3", "mat4", "mat",
            "uniform", "layout", "location", "void", "out", "in", "#version", "core",
            "sampler1D", "sampler2D", "sampler3D", "pow", "sin", "cos", "mul", "abs", "floor",
            "ceil",
        ];
        Self::new(pool, background, KEYWORDS)
    }

    /// Classification at `offset` (`Normal` past the settled prefix).
    #[must_use]
    pub fn kind_at(&self, offset: Location) -> SyntaxKind {
        self.map.kind_at(offset)
    }

    /// Presentation color at `offset`.
    #[must_use]
    pub fn color_at(&self, offset: Location) -> u32 {
        self.kind_at(offset).color()
    }

    /// High-water byte offset of settled classification.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.map.processed()
    }

    /// The shared map (verification support).
    #[must_use]
    pub fn map(&self) -> &SyntaxMap {
        &self.map
    }

    /// Cancel and join any in-flight scan. Surfaces an internal worker
    /// error, if one occurred, to the foreground.
    pub fn interrupt(&mut self) -> Result<(), TextError> {
        if let Some(task) = &self.task {
            task.request_cancel();
        }
        self.settle()
    }

    /// Join any in-flight scan *without* cancelling — wait for it to run
    /// to completion. Surfaces an internal worker error to the foreground.
    pub fn settle(&mut self) -> Result<(), TextError> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        match task.join() {
            Some(Ok(_)) => Ok(()),
            Some(Err(err)) => Err(err),
            None => Err(TextError::InvariantViolation {
                reason: "syntax worker terminated abnormally",
            }),
        }
    }

    /// Re-tokenize from (a safe point before) `start` over `snapshot`.
    ///
    /// `end` is a hint only; the scan always runs to the end of the
    /// snapshot (see the module docs). In background mode the scan is
    /// submitted to the pool and this returns immediately; inline it runs
    /// to completion on the caller.
    pub fn update(
        &mut self,
        snapshot: Vec<u8>,
        start: Location,
        _end: Location,
    ) -> Result<(), TextError> {
        self.interrupt()?;
        self.map.resize(snapshot.len());
        let safe = safe_restart_point(&snapshot, start);

        if self.background {
            let map = Arc::clone(&self.map);
            let keywords = Arc::clone(&self.keywords);
            self.task = Some(
                self.pool
                    .submit(move |cancel| tokenize(&map, &keywords, &snapshot, safe, cancel)),
            );
            Ok(())
        } else {
            tokenize(
                &self.map,
                &self.keywords,
                &snapshot,
                safe,
                &CancelToken::new(),
            )
            .map(|_| ())
        }
    }
}

impl std::fmt::Debug for Highlighter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Highlighter")
            .field("processed", &self.processed())
            .field("background", &self.background)
            .field("in_flight", &self.task.is_some())
            .finish_non_exhaustive()
    }
}

impl Drop for Highlighter {
    fn drop(&mut self) {
        let _ = self.interrupt();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
