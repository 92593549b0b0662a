//! Fixed-size sliding window of booleans with a running satisfied count.

/// Circular buffer of the last `capacity` row verdicts.
///
/// Push is O(1): the evicted slot's contribution is subtracted from the
/// running count instead of re-summing the window.
#[derive(Debug, Clone)]
pub struct PersistenceWindow {
    slots: Vec<bool>,
    head: usize,
    filled: usize,
    satisfied: usize,
}

impl PersistenceWindow {
    /// Create a window. A zero capacity is treated as 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![false; capacity.max(1)],
            head: 0,
            filled: 0,
            satisfied: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Satisfied rows currently in the window.
    pub fn satisfied(&self) -> usize {
        self.satisfied
    }

    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Push a verdict, evicting the oldest once full. Returns the new count.
    pub fn push(&mut self, ok: bool) -> usize {
        if self.filled == self.slots.len() {
            if self.slots[self.head] {
                self.satisfied -= 1;
            }
        } else {
            self.filled += 1;
        }
        self.slots[self.head] = ok;
        if ok {
            self.satisfied += 1;
        }
        self.head = (self.head + 1) % self.slots.len();
        self.satisfied
    }

    /// Every slot is filled and satisfied.
    pub fn is_complete(&self) -> bool {
        self.filled == self.slots.len() && self.satisfied == self.slots.len()
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = false);
        self.head = 0;
        self.filled = 0;
        self.satisfied = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completes_after_n_satisfied() {
        let mut w = PersistenceWindow::new(3);
        assert_eq!(w.push(true), 1);
        assert_eq!(w.push(true), 2);
        assert!(!w.is_complete());
        assert_eq!(w.push(true), 3);
        assert!(w.is_complete());
    }

    #[test]
    fn test_miss_must_slide_out() {
        let mut w = PersistenceWindow::new(3);
        w.push(true);
        w.push(false);
        w.push(true);
        assert_eq!(w.satisfied(), 2);
        w.push(true);
        assert!(!w.is_complete(), "the miss is still inside the window");
        w.push(true);
        assert!(w.is_complete());
    }

    #[test]
    fn test_running_count_matches_recount() {
        let pattern = [true, false, true, true, false, false, true, true, true, false];
        let mut w = PersistenceWindow::new(4);
        for (i, ok) in pattern.iter().enumerate() {
            let count = w.push(*ok);
            let start = (i + 1).saturating_sub(4);
            let expected = pattern[start..=i].iter().filter(|b| **b).count();
            assert_eq!(count, expected, "index {i}");
        }
    }

    #[test]
    fn test_clear() {
        let mut w = PersistenceWindow::new(2);
        w.push(true);
        w.push(true);
        w.clear();
        assert!(w.is_empty());
        assert_eq!(w.satisfied(), 0);
        assert_eq!(w.capacity(), 2);
    }
}
