//! Room-owned delayed jobs.
//!
//! Jobs are plain values ordered by due time. A room polls its timers once
//! per server tick; dropping the room drops every pending job with it, so no
//! callback can fire against a torn-down room.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

/// Cancellation token for a scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug)]
struct Entry<J> {
    due: u64,
    id: TimerId,
    job: J,
}

impl<J> PartialEq for Entry<J> {
    fn eq(&self, other: &Self) -> bool {
        (self.due, self.id) == (other.due, other.id)
    }
}

impl<J> Eq for Entry<J> {}

impl<J> PartialOrd for Entry<J> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<J> Ord for Entry<J> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Ties fire in scheduling order.
        (self.due, self.id).cmp(&(other.due, other.id))
    }
}

/// Min-heap of jobs keyed by due time (milliseconds).
#[derive(Debug)]
pub struct Timers<J> {
    heap: BinaryHeap<Reverse<Entry<J>>>,
    cancelled: HashSet<TimerId>,
    next_id: u64,
}

impl<J> Default for Timers<J> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
            cancelled: HashSet::new(),
            next_id: 0,
        }
    }
}

impl<J> Timers<J> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `job` to run at `due`.
    pub fn schedule_at(&mut self, due: u64, job: J) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.heap.push(Reverse(Entry { due, id, job }));
        id
    }

    /// Cancel a pending job. Cancelling a fired or unknown job does nothing.
    pub fn cancel(&mut self, id: TimerId) {
        if self.heap.iter().any(|Reverse(e)| e.id == id) {
            self.cancelled.insert(id);
        }
    }

    /// Pop the next job due at or before `now`, skipping cancelled ones.
    pub fn pop_due(&mut self, now: u64) -> Option<J> {
        loop {
            let due = self.heap.peek().map(|Reverse(e)| e.due)?;
            if due > now {
                return None;
            }
            let Reverse(entry) = self.heap.pop()?;
            if self.cancelled.remove(&entry.id) {
                continue;
            }
            return Some(entry.job);
        }
    }

    /// Number of live (not cancelled) jobs.
    pub fn len(&self) -> usize {
        self.heap.len() - self.cancelled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live jobs matching `pred`.
    pub fn count_matching(&self, pred: impl Fn(&J) -> bool) -> usize {
        self.heap
            .iter()
            .filter(|Reverse(e)| !self.cancelled.contains(&e.id) && pred(&e.job))
            .count()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.cancelled.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jobs_fire_in_due_order() {
        let mut timers = Timers::new();
        timers.schedule_at(30, "c");
        timers.schedule_at(10, "a");
        timers.schedule_at(20, "b");
        timers.schedule_at(10, "a2");

        assert_eq!(timers.pop_due(5), None);
        assert_eq!(timers.pop_due(25), Some("a"));
        assert_eq!(timers.pop_due(25), Some("a2"));
        assert_eq!(timers.pop_due(25), Some("b"));
        assert_eq!(timers.pop_due(25), None);
        assert_eq!(timers.pop_due(30), Some("c"));
        assert!(timers.is_empty());
    }

    #[test]
    fn test_cancelled_job_never_fires() {
        let mut timers = Timers::new();
        let id = timers.schedule_at(10, 1);
        timers.schedule_at(10, 2);
        timers.cancel(id);
        assert_eq!(timers.len(), 1);
        assert_eq!(timers.pop_due(100), Some(2));
        assert_eq!(timers.pop_due(100), None);
    }

    #[test]
    fn test_cancel_after_fire_is_noop() {
        let mut timers = Timers::new();
        let id = timers.schedule_at(10, 1);
        assert_eq!(timers.pop_due(10), Some(1));
        timers.cancel(id);
        assert_eq!(timers.len(), 0);
        timers.schedule_at(20, 2);
        assert_eq!(timers.pop_due(20), Some(2));
    }
}
