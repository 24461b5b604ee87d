//! Deferred save scheduler.
//!
//! Commits enqueue a gate id; the first enqueue after a flush arms a single
//! deadline `delay` ticks ahead. At the deadline every pending id is saved
//! once, whatever number of commits happened in between.

use crate::types::GateId;
use std::collections::HashSet;

#[derive(Debug)]
pub struct SaveScheduler {
    delay: u64,
    pending: HashSet<GateId>,
    flush_at: Option<u64>,
}

impl SaveScheduler {
    pub fn new(delay: u64) -> Self {
        Self {
            delay,
            pending: HashSet::new(),
            flush_at: None,
        }
    }

    pub fn enqueue(&mut self, id: GateId, now: u64) {
        self.pending.insert(id);
        if self.flush_at.is_none() {
            self.flush_at = Some(now + self.delay);
        }
    }

    pub fn is_due(&self, now: u64) -> bool {
        self.flush_at.is_some_and(|at| now >= at)
    }

    pub fn is_pending(&self, id: GateId) -> bool {
        self.pending.contains(&id)
    }

    /// Remove a single id ahead of the flush. Returns whether it was pending.
    pub fn take(&mut self, id: GateId) -> bool {
        let was_pending = self.pending.remove(&id);
        if self.pending.is_empty() {
            self.flush_at = None;
        }
        was_pending
    }

    /// Empty the pending set and disarm the deadline.
    pub fn drain(&mut self) -> Vec<GateId> {
        self.flush_at = None;
        self.pending.drain().collect()
    }

    pub fn flush_at(&self) -> Option<u64> {
        self.flush_at
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn first_enqueue_arms_the_deadline() {
        let mut s = SaveScheduler::new(20);
        let id = Uuid::new_v4();
        s.enqueue(id, 100);
        s.enqueue(id, 110);
        assert_eq!(s.flush_at(), Some(120));
        assert!(!s.is_due(119));
        assert!(s.is_due(120));
    }

    #[test]
    fn repeated_commits_coalesce() {
        let mut s = SaveScheduler::new(20);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        for tick in 0..5 {
            s.enqueue(a, tick);
        }
        s.enqueue(b, 6);

        let mut flushed = s.drain();
        flushed.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(flushed, expected);
        assert!(s.is_empty());
        assert_eq!(s.flush_at(), None);
    }

    #[test]
    fn taking_the_last_id_disarms() {
        let mut s = SaveScheduler::new(20);
        let id = Uuid::new_v4();
        s.enqueue(id, 0);
        assert!(s.take(id));
        assert!(!s.take(id));
        assert_eq!(s.flush_at(), None);
    }
}
