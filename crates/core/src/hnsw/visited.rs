//! Epoch-stamped visited marks for graph traversal.
//!
//! One `u32` stamp per node slot. A slot counts as visited when its stamp equals
//! the current epoch, so starting a new traversal is a counter bump rather
//! than a memset.

#[derive(Debug, Clone, Default)]
pub struct VisitedSet {
    stamps: Vec<u32>,
    epoch: u32,
}

impl VisitedSet {
    /// Starts a new traversal over a graph of `slots` nodes, forgetting all marks.
    pub fn reset(&mut self, slots: usize) {
        if self.stamps.len() < slots {
            self.stamps.resize(slots, 0);
        }
        self.epoch = match self.epoch.checked_add(1) {
            Some(epoch) => epoch,
            None => {
                self.stamps.fill(0);
                1
            }
        };
    }

    /// Marks `slot`. Returns `true` on the first visit in this traversal.
    #[inline]
    pub fn mark(&mut self, slot: u32) -> bool {
        let idx = slot as usize;
        if idx >= self.stamps.len() {
            self.stamps.resize(idx + 1, 0);
        }
        let seen = self.stamps[idx] == self.epoch;
        self.stamps[idx] = self.epoch;
        !seen
    }

    #[inline]
    pub fn is_marked(&self, slot: u32) -> bool {
        self.stamps.get(slot as usize) == Some(&self.epoch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marks_reset_between_traversals() {
        let mut visited = VisitedSet::default();
        visited.reset(8);
        assert!(visited.mark(3));
        assert!(!visited.mark(3));
        assert!(visited.is_marked(3));
        assert!(!visited.is_marked(4));

        visited.reset(8);
        assert!(!visited.is_marked(3));
        assert!(visited.mark(3));
    }

    #[test]
    fn test_slot_beyond_reset_size() {
        let mut visited = VisitedSet::default();
        visited.reset(2);
        assert!(visited.mark(40));
        assert!(!visited.mark(40));
        assert!(!visited.is_marked(100));
    }

    #[test]
    fn test_epoch_wraparound_clears_stamps() {
        let mut visited = VisitedSet::default();
        visited.reset(4);
        visited.epoch = u32::MAX;
        visited.mark(1);
        visited.reset(4);
        assert_eq!(visited.epoch, 1);
        assert!(!visited.is_marked(1));
        assert!(visited.mark(1));
    }
}
