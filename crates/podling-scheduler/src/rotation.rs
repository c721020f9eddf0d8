//! Round-robin rotation over a candidate list.
//!
//! The caller's candidate filtering runs under the cursor lock, so
//! concurrent selections see consistent lists and receive distinct
//! rotation slots.

use std::sync::{Mutex, PoisonError};

/// A round-robin selector whose cursor only advances on a successful pick.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: Mutex<usize>,
}

impl RoundRobin {
    /// Create a new rotation starting at slot zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the candidate list with `candidates` and take the element at
    /// `cursor % len`, advancing the cursor by one.
    ///
    /// Returns `None` (cursor unchanged) if the list is empty.
    pub fn pick<T, F>(&self, candidates: F) -> Option<T>
    where
        F: FnOnce() -> Vec<T>,
    {
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        let mut qualifying = candidates();
        if qualifying.is_empty() {
            return None;
        }
        let idx = *cursor % qualifying.len();
        *cursor = cursor.wrapping_add(1);
        Some(qualifying.swap_remove(idx))
    }

    #[cfg(test)]
    pub(crate) fn position(&self) -> usize {
        *self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycles_through_candidates() {
        let rr = RoundRobin::new();
        let picks: Vec<_> = (0..5).map(|_| rr.pick(|| vec!['a', 'b', 'c']).unwrap()).collect();
        assert_eq!(picks, vec!['a', 'b', 'c', 'a', 'b']);
    }

    #[test]
    fn empty_list_does_not_advance() {
        let rr = RoundRobin::new();
        rr.pick(|| vec![1]);
        assert_eq!(rr.pick(Vec::<i32>::new), None);
        assert_eq!(rr.position(), 1);
    }

    #[test]
    fn adapts_to_changing_list_size() {
        let rr = RoundRobin::new();
        assert_eq!(rr.pick(|| vec![0, 1]), Some(0));
        assert_eq!(rr.pick(|| vec![0, 1]), Some(1));

        // List grows to 4.
        assert_eq!(rr.pick(|| vec![0, 1, 2, 3]), Some(2));
        assert_eq!(rr.pick(|| vec![0, 1, 2, 3]), Some(3));

        // Shrinks back to 2.
        assert_eq!(rr.pick(|| vec![0, 1]), Some(0));
    }
}
