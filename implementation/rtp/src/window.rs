//! The sliding window over the circular sequence space.

use crate::seq::SeqNum;

/// The largest supported window capacity, `2^30` slots.
///
/// Keeping the capacity well below the sequence-space size guarantees that
/// window offsets fit an `i32` and that the receive-side double window
/// `[base - wsize, base + wsize)` never overlaps itself.
pub(crate) const MAX_CAPACITY: usize = 1 << 30;

/// A fixed-capacity ring of acknowledged/received flags.
///
/// The window always covers the contiguous circular range
/// `[base, base + capacity)`; slot `i` of that range lives at ring position
/// `(head + i) % capacity`. `base` only ever moves forward, either past the
/// maximal contiguous run of marked slots ([`slide`](Window::slide), the
/// selective-repeat discipline) or unconditionally to a cumulative
/// acknowledgment target ([`advance_to`](Window::advance_to), go-back-n,
/// which never sets individual marks). Slots the base moves past are cleared
/// for reuse by the sequence numbers that rotate in.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Window {
    slots: Vec<bool>,
    head: usize,
    base: SeqNum,
}

impl Window {
    /// Creates a window of the given capacity anchored at `base`.
    ///
    /// # Panics
    ///
    /// Panics if the capacity is 0 or exceeds [`MAX_CAPACITY`].
    pub fn new(capacity: usize, base: SeqNum) -> Self {
        assert!(capacity > 0);
        assert!(capacity <= MAX_CAPACITY);

        Window {
            slots: vec![false; capacity],
            head: 0,
            base,
        }
    }

    /// Returns the capacity of the window.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// The oldest sequence number covered by the window.
    pub fn base(&self) -> SeqNum {
        self.base
    }

    /// One past the newest sequence number covered by the window.
    pub fn end(&self) -> SeqNum {
        self.base.add(self.slots.len() as i32)
    }

    /// Checks whether `seq` falls into the covered range.
    pub fn contains(&self, seq: SeqNum) -> bool {
        seq.in_range(self.base, self.end())
    }

    /// Checks whether the slot for `seq` is marked.
    ///
    /// Sequence numbers outside the covered range are never marked.
    pub fn is_marked(&self, seq: SeqNum) -> bool {
        self.contains(seq) && self.slots[self.index_of(seq)]
    }

    /// Marks the slot for `seq`.
    ///
    /// Marking an already-marked slot again is a no-op, so duplicated
    /// acknowledgments and re-deliveries are harmless.
    ///
    /// # Panics
    ///
    /// Panics if `seq` is outside the covered range.
    pub fn mark(&mut self, seq: SeqNum) {
        assert!(self.contains(seq), "sequence number outside the window");

        let ind = self.index_of(seq);
        self.slots[ind] = true;
    }

    /// Advances `base` past the maximal contiguous run of marked slots,
    /// clearing the slots it vacates, and returns how far it moved.
    pub fn slide(&mut self) -> usize {
        let cap = self.capacity();

        let mut run = 0;
        while run < cap && self.slots[(self.head + run) % cap] {
            run += 1;
        }
        for i in 0..run {
            let ind = (self.head + i) % cap;
            self.slots[ind] = false;
        }

        self.head = (self.head + run) % cap;
        self.base = self.base.add(run as i32);
        run
    }

    /// Unconditionally advances `base` to `target`, clearing every slot it
    /// passes, and returns how far it moved.
    ///
    /// This is the cumulative-acknowledgment discipline; `target` itself
    /// remains covered (or becomes the new end when the whole window is
    /// passed).
    ///
    /// # Panics
    ///
    /// Panics if `target` lies outside `[base, base + capacity]`.
    pub fn advance_to(&mut self, target: SeqNum) -> usize {
        let cap = self.capacity();
        let shift = self.base.distance(target) as usize;
        assert!(shift <= cap, "target outside the window");

        for i in 0..shift {
            let ind = (self.head + i) % cap;
            self.slots[ind] = false;
        }

        self.head = (self.head + shift) % cap;
        self.base = target;
        shift
    }

    /// The ring position of the slot covering `seq`.
    ///
    /// Only meaningful while `seq` is inside the covered range.
    fn index_of(&self, seq: SeqNum) -> usize {
        (self.head + self.base.distance(seq) as usize) % self.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_capacity_from_base() {
        let win = Window::new(4, SeqNum::new(10));

        assert_eq!(win.base(), SeqNum::new(10));
        assert_eq!(win.end(), SeqNum::new(14));
        assert!(win.contains(SeqNum::new(10)));
        assert!(win.contains(SeqNum::new(13)));
        assert!(!win.contains(SeqNum::new(14)));
        assert!(!win.contains(SeqNum::new(9)));
    }

    #[test]
    fn slides_past_marked_prefix_only() {
        let mut win = Window::new(4, SeqNum::ZERO);

        // Acknowledgments for 1 and 3 arrive out of order: no movement
        // until 0 is marked as well.
        win.mark(SeqNum::new(1));
        win.mark(SeqNum::new(3));
        assert_eq!(win.slide(), 0);
        assert_eq!(win.base(), SeqNum::ZERO);

        win.mark(SeqNum::ZERO);
        assert_eq!(win.slide(), 2);
        assert_eq!(win.base(), SeqNum::new(2));

        // 3 is still marked from before; marking 2 completes the run.
        win.mark(SeqNum::new(2));
        assert_eq!(win.slide(), 2);
        assert_eq!(win.base(), SeqNum::new(4));
        assert_eq!(win.end(), SeqNum::new(8));
    }

    #[test]
    fn duplicate_marks_are_idempotent() {
        let mut win = Window::new(3, SeqNum::ZERO);

        win.mark(SeqNum::ZERO);
        win.mark(SeqNum::ZERO);
        win.mark(SeqNum::new(1));

        assert_eq!(win.slide(), 2);
        assert_eq!(win.base(), SeqNum::new(2));
        assert_eq!(win.slide(), 0);
    }

    #[test]
    fn vacated_slots_come_back_cleared() {
        let mut win = Window::new(3, SeqNum::ZERO);

        for round in 0..10u32 {
            let base = SeqNum::new(3 * round);
            assert_eq!(win.base(), base);

            win.mark(base.add(2));
            assert_eq!(win.slide(), 0);

            win.mark(base);
            win.mark(base.add(1));
            assert_eq!(win.slide(), 3);
        }
    }

    #[test]
    fn advance_to_ignores_marks() {
        let mut win = Window::new(4, SeqNum::new(10));

        assert_eq!(win.advance_to(SeqNum::new(12)), 2);
        assert_eq!(win.base(), SeqNum::new(12));
        assert_eq!(win.advance_to(SeqNum::new(12)), 0);

        // Jumping the full capacity is legal: the window is drained.
        assert_eq!(win.advance_to(SeqNum::new(16)), 4);
        assert_eq!(win.base(), SeqNum::new(16));
    }

    #[test]
    fn advance_to_clears_passed_slots() {
        let mut win = Window::new(2, SeqNum::ZERO);

        win.mark(SeqNum::new(1));
        win.advance_to(SeqNum::new(2));

        // The ring slot that held the mark for 1 now covers 3.
        assert!(!win.is_marked(SeqNum::new(3)));
        assert_eq!(win.slide(), 0);
    }

    #[test]
    fn wraps_around_the_sequence_space() {
        let mut win = Window::new(4, SeqNum::MAX.add(-1));

        assert!(win.contains(SeqNum::MAX));
        assert!(win.contains(SeqNum::ZERO));
        assert!(win.contains(SeqNum::new(1)));
        assert!(!win.contains(SeqNum::new(2)));

        win.mark(SeqNum::MAX.add(-1));
        win.mark(SeqNum::MAX);
        assert_eq!(win.slide(), 2);
        assert_eq!(win.base(), SeqNum::ZERO);
    }

    #[test]
    fn is_marked_outside_is_false() {
        let mut win = Window::new(2, SeqNum::ZERO);
        win.mark(SeqNum::ZERO);

        assert!(win.is_marked(SeqNum::ZERO));
        assert!(!win.is_marked(SeqNum::new(5)));
        assert!(!win.is_marked(SeqNum::MAX));
    }

    #[test]
    #[should_panic]
    fn mark_outside_panics() {
        let mut win = Window::new(4, SeqNum::ZERO);
        win.mark(SeqNum::new(4));
    }

    #[test]
    #[should_panic]
    fn advance_past_end_panics() {
        let mut win = Window::new(4, SeqNum::ZERO);
        win.advance_to(SeqNum::new(5));
    }
}
