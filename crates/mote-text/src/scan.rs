//! Block scanner — the boundary-finding primitive beneath word motions.
//!
//! Given a stream like `___AAA__BBB`, one scan reports where the first
//! block starts and ends, whether whitespace separates it from the second,
//! and where the second block runs — enough for a caller to implement
//! forward-word, backward-word, and end-of-word motions by reading the
//! boundary it needs out of one [`BlockScan`].
//!
//! # Blocks and separators
//!
//! Classification is policy-driven, matching the two Vim notions of a word:
//!
//! - [`ScanPolicy::Word`] — a block is a run of alphanumerics/underscores;
//!   any other non-space run (punctuation) is a *separator* block of its
//!   own. `hello.world` scans as three runs.
//! - [`ScanPolicy::BigWord`] — a block is any run of graphic (visible)
//!   characters; only whitespace divides. `hello.world` is one run.
//!
//! Bytes `>= 0x80` (multibyte UTF-8) count as word constituents and as
//! graphic, so a multibyte sequence clusters into one block instead of
//! splitting at the ASCII boundary.
//!
//! # Direction symmetry
//!
//! The algorithm is implemented once with a signed step; scanning backward
//! swaps the begin/end bounds, so a backward result mirrors a forward one
//! (its `first_block` is the run's far edge in scan order). The scan
//! re-centers on whichever run contains the origin — walking *against* the
//! direction to the run's start before walking with it — rather than only
//! looking ahead.
//!
//! All walks stop at the store's natural bounds; there is no wraparound.

use crate::location::{Direction, Location};
use crate::store::GapBuffer;

// ---------------------------------------------------------------------------
// Byte classification
// ---------------------------------------------------------------------------

/// Whitespace for scanning purposes (ASCII space family).
#[inline]
#[must_use]
pub(crate) const fn is_space_byte(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

/// Graphic (visible) byte. Multibyte UTF-8 lead/continuation bytes count.
#[inline]
#[must_use]
pub(crate) const fn is_graphic_byte(b: u8) -> bool {
    b.is_ascii_graphic() || b >= 0x80
}

/// Word-constituent byte: alphanumeric, underscore, or multibyte UTF-8.
#[inline]
#[must_use]
const fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

/// Which classification governs a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPolicy {
    /// Vim's `word`: alphanumeric/underscore runs, punctuation separates.
    Word,
    /// Vim's `WORD`: any visible run, only whitespace separates.
    BigWord,
}

impl ScanPolicy {
    /// Does `b` belong to a block under this policy?
    #[inline]
    #[must_use]
    pub const fn is_block(self, b: u8) -> bool {
        match self {
            Self::Word => is_word_byte(b),
            Self::BigWord => is_graphic_byte(b),
        }
    }

    /// Does `b` belong to a separator run (non-block, non-space)?
    ///
    /// Under [`ScanPolicy::BigWord`] only unprintable bytes qualify — there
    /// is no separator category distinct from whitespace for visible text.
    #[inline]
    #[must_use]
    pub const fn is_separator(self, b: u8) -> bool {
        !self.is_block(b) && !is_space_byte(b)
    }
}

// ---------------------------------------------------------------------------
// BlockScan
// ---------------------------------------------------------------------------

/// Result of one block scan. Pure output — offsets are provisional like
/// any [`Location`] and carry no ownership.
///
/// For backward scans the offsets mirror: `first_block` is the far edge of
/// the run in scan order, and "forward" in the field descriptions means
/// "in the scan direction". Offsets are clamped to `[0, store.len()]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockScan {
    /// The (clamped) origin the scan started from.
    pub origin: Location,
    /// Direction the scan ran in.
    pub direction: Direction,
    /// True when the origin sat on a block run, false for a separator run.
    pub start_on_block: bool,
    /// Where the whitespace run containing/preceding the origin begins.
    pub space_before_start: Location,
    /// Whitespace was skipped between the origin and the first block.
    pub space_before: bool,
    /// Whitespace separates the first block from the second.
    pub space_between: bool,
    /// First byte of the first block (the run containing the origin).
    pub first_block: Location,
    /// One past the first block, in scan order.
    pub first_non_block: Location,
    /// First byte of the second block.
    pub second_block: Location,
    /// One past the second block, in scan order.
    pub second_non_block: Location,
}

// ---------------------------------------------------------------------------
// Scan
// ---------------------------------------------------------------------------

/// Classify the runs around `origin`, walking in `direction`.
///
/// Stateless: reads the store, mutates nothing. The origin is clamped into
/// the store (scans of an out-of-range origin start from the last byte).
///
/// # Panics
///
/// Panics if the store is empty — a well-formed document always holds at
/// least its terminator.
#[must_use]
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
pub fn scan(
    store: &GapBuffer,
    origin: Location,
    direction: Direction,
    policy: ScanPolicy,
) -> BlockScan {
    assert!(!store.is_empty(), "scan requires a non-empty store");

    let len = store.len() as isize;
    let origin = (origin as isize).min(len - 1);

    let step = direction.step();
    let (begin, end) = match direction {
        Direction::Forward => (0, len),
        Direction::Backward => (len, 0),
    };

    // Bounds-checked reads: walks guard on begin/end, but the boundary
    // probes after a walk may sit one step outside the store.
    let at = |i: isize| -> Option<u8> { (0..len).contains(&i).then(|| store.byte(i as usize)) };
    let space_at = |i: isize| at(i).is_some_and(is_space_byte);
    let loc = |i: isize| i.clamp(0, len) as usize;

    let mut result = BlockScan {
        origin: origin.max(0) as usize,
        direction,
        start_on_block: false,
        space_before_start: 0,
        space_before: false,
        space_between: false,
        first_block: 0,
        first_non_block: 0,
        second_block: 0,
        second_non_block: 0,
    };

    // Where does the whitespace run containing the origin begin? Walk
    // against the direction without consuming anything into the result.
    let mut cur = origin;
    while cur != begin && space_at(cur) {
        cur -= step;
    }
    if cur != begin {
        cur += step;
    }
    result.space_before_start = loc(cur);

    // Skip leading whitespace in the scan direction; not part of block 1.
    cur = origin;
    while cur != end && space_at(cur) {
        result.space_before = true;
        cur += step;
    }

    // The byte now under the cursor fixes which predicate governs block 1.
    let on_block = at(cur).is_some_and(|b| policy.is_block(b));
    result.start_on_block = on_block;
    let check = |b: u8| {
        if on_block {
            policy.is_block(b)
        } else {
            policy.is_separator(b)
        }
    };

    // Re-center: walk against the direction to the start of the run
    // containing the origin.
    while cur != begin && at(cur).is_some_and(check) {
        cur -= step;
    }
    // Stopped on a byte outside the run — step back onto it. (At the hard
    // boundary with the run still holding, stay put.)
    if at(cur).is_some_and(|b| !check(b)) {
        cur += step;
    }
    result.first_block = loc(cur);

    // Walk with the direction to the end of block 1.
    while cur != end && at(cur).is_some_and(check) {
        cur += step;
    }
    result.first_non_block = loc(cur);

    // Whitespace between the blocks is not part of either.
    while cur != end && space_at(cur) {
        result.space_between = true;
        cur += step;
    }
    result.second_block = loc(cur);

    // Block 2 gets its own predicate from its first byte.
    let on_block2 = at(cur).is_some_and(|b| policy.is_block(b));
    let check2 = |b: u8| {
        if on_block2 {
            policy.is_block(b)
        } else {
            policy.is_separator(b)
        }
    };
    while cur != end && at(cur).is_some_and(check2) {
        cur += step;
    }
    result.second_non_block = loc(cur);

    result
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
