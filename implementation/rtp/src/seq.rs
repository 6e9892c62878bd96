//! Arithmetic in the 31-bit circular sequence-number space.
//!
//! Sequence numbers occupy the lower 31 bits of their storage word (the top
//! bit is reserved as zero on the wire), so the space has size 2^31 and all
//! arithmetic wraps modulo 2^31. Every operation here is branch-free with
//! respect to wraparound; callers never special-case the boundary.

use std::fmt::{Display, Formatter, Result as FmtResult};

/// The modulus mask, `2^31 - 1`.
const SEQ_MASK: u32 = (1 << 31) - 1;

/// A sequence number in the 31-bit circular space.
///
/// The circular space has no total order, so this type deliberately
/// implements neither `Ord` nor `PartialOrd`; positions are compared through
/// [`distance`](SeqNum::distance) and [`in_range`](SeqNum::in_range) instead.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct SeqNum(u32);

impl SeqNum {
    /// The smallest sequence number.
    pub const ZERO: SeqNum = SeqNum(0);

    /// The largest sequence number, `2^31 - 1`. Its successor is `ZERO`.
    pub const MAX: SeqNum = SeqNum(SEQ_MASK);

    /// Creates a sequence number from a raw integer, discarding the top bit.
    pub fn new(raw: u32) -> Self {
        SeqNum(raw & SEQ_MASK)
    }

    /// Returns the raw 31-bit value.
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Adds `k` modulo 2^31. `k` may be negative.
    pub fn add(self, k: i32) -> SeqNum {
        // Two's-complement wrapping addition followed by the mask is exact
        // for negative `k` as well, since 2^32 is a multiple of the modulus.
        SeqNum(self.0.wrapping_add(k as u32) & SEQ_MASK)
    }

    /// The immediate successor, wrapping at the top of the space.
    pub fn next(self) -> SeqNum {
        self.add(1)
    }

    /// The forward circular distance from `self` to `to`, always in
    /// `[0, 2^31)`.
    pub fn distance(self, to: SeqNum) -> u32 {
        to.0.wrapping_sub(self.0) & SEQ_MASK
    }

    /// Checks whether `self` lies in the circular half-open interval
    /// `[lo, hi)`, traversed forward from `lo`.
    ///
    /// When `lo == hi` the interval is empty, never the full space.
    pub fn in_range(self, lo: SeqNum, hi: SeqNum) -> bool {
        lo.distance(self) < lo.distance(hi)
    }
}

impl Display for SeqNum {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        self.0.fmt(fmt)
    }
}
