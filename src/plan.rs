//! A time-ordered queue of payloads.
//!
//! `Queue<T, P>` holds payloads of type `T` ("plans"), each due at an `f64` time and carrying
//! a priority `P` that orders plans due at the same time. Plans due at the same time and with
//! the same priority come out in insertion order. Adding is *O*(log *n*); cancelling is *O*(1)
//! and leaves a tombstone that is skipped when it reaches the front.
//!
//! Two queues exist per run: the `Context` event queue, whose payloads are callbacks, and the
//! branching engine's exposure queue, whose payloads are `Exposure`s.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::{HashMap, HashMapExt};

pub struct Queue<T, P: Ord> {
    /// Ordering keys. Keys whose payload is gone are tombstones.
    heap: BinaryHeap<Key<P>>,
    payloads: HashMap<u64, T>,
    next_id: u64,
}

impl<T, P: Ord> Queue<T, P> {
    #[must_use]
    pub fn new() -> Queue<T, P> {
        Queue {
            heap: BinaryHeap::new(),
            payloads: HashMap::new(),
            next_id: 0,
        }
    }

    /// Queues `data` at `time`. The returned id can cancel it.
    pub fn add_plan(&mut self, time: f64, data: T, priority: P) -> PlanId {
        let id = self.next_id;
        self.next_id += 1;
        self.heap.push(Key { time, priority, id });
        self.payloads.insert(id, data);
        PlanId(id)
    }

    /// # Panics
    ///
    /// Panics if the plan was already cancelled or retrieved.
    pub fn cancel_plan(&mut self, id: &PlanId) {
        self.payloads.remove(&id.0).expect("Plan does not exist");
    }

    /// Cancels every plan whose payload fails `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        self.payloads.retain(|_, data| keep(data));
    }

    /// Plans still queued, tombstones excluded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    /// Time of the first queued plan. Clears tombstones off the front.
    pub fn peek_time(&mut self) -> Option<f64> {
        while let Some(key) = self.heap.peek() {
            if self.payloads.contains_key(&key.id) {
                return Some(key.time);
            }
            self.heap.pop();
        }
        None
    }

    /// Removes and returns the first queued plan.
    pub fn get_next_plan(&mut self) -> Option<Plan<T>> {
        while let Some(key) = self.heap.pop() {
            if let Some(data) = self.payloads.remove(&key.id) {
                return Some(Plan {
                    time: key.time,
                    data,
                });
            }
        }
        None
    }

    /// Removes and returns, in order, every plan due strictly before `boundary`.
    ///
    /// The batch is fixed when this returns: plans added afterwards are not in it even if they
    /// are due before `boundary`, so callers that add plans while handling a batch call again.
    pub fn drain_before(&mut self, boundary: f64) -> Vec<Plan<T>> {
        let mut due = Vec::new();
        while self.peek_time().is_some_and(|time| time < boundary) {
            due.extend(self.get_next_plan());
        }
        due
    }
}

impl<T, P: Ord> Default for Queue<T, P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Heap key: earliest time first, then lowest priority, then lowest id.
#[derive(Debug)]
struct Key<P> {
    time: f64,
    priority: P,
    id: u64,
}

impl<P: Ord> Ord for Key<P> {
    fn cmp(&self, other: &Self) -> Ordering {
        // `BinaryHeap` is a max-heap, so every comparison is reversed. Times are never NaN.
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.priority.cmp(&self.priority))
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl<P: Ord> PartialOrd for Key<P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<P: Ord> PartialEq for Key<P> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<P: Ord> Eq for Key<P> {}

/// Identifies a queued plan.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PlanId(pub(crate) u64);

/// A plan taken off the queue.
pub struct Plan<T> {
    pub time: f64,
    pub data: T,
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    fn drain<T, P: Ord>(queue: &mut Queue<T, P>) -> Vec<(f64, T)> {
        std::iter::from_fn(|| queue.get_next_plan())
            .map(|plan| (plan.time, plan.data))
            .collect()
    }

    #[test]
    fn empty() {
        let mut queue = Queue::<u8, ()>::new();
        assert!(queue.is_empty());
        assert!(queue.peek_time().is_none());
        assert!(queue.get_next_plan().is_none());
        assert!(queue.drain_before(10.0).is_empty());
    }

    #[test]
    fn plans_come_out_by_time() {
        let mut queue = Queue::new();
        for (time, label) in [(3.0, 'c'), (0.5, 'a'), (2.0, 'b'), (7.25, 'd')] {
            queue.add_plan(time, label, ());
        }
        assert_eq!(queue.len(), 4);
        assert_eq!(
            drain(&mut queue),
            vec![(0.5, 'a'), (2.0, 'b'), (3.0, 'c'), (7.25, 'd')]
        );
    }

    #[test]
    fn same_time_orders_by_priority_then_insertion() {
        let mut queue = Queue::new();
        queue.add_plan(1.0, "late", 2);
        queue.add_plan(1.0, "first", 0);
        queue.add_plan(1.0, "second", 0);
        queue.add_plan(0.0, "earlier", 9);
        let order: Vec<&str> = drain(&mut queue).into_iter().map(|(_, data)| data).collect();
        assert_eq!(order, vec!["earlier", "first", "second", "late"]);
    }

    #[test]
    fn plans_added_after_retrieval_still_sort() {
        let mut queue = Queue::new();
        queue.add_plan(1.0, 1, ());
        queue.add_plan(4.0, 4, ());
        assert_eq!(queue.get_next_plan().unwrap().data, 1);
        queue.add_plan(2.0, 2, ());
        assert_eq!(drain(&mut queue), vec![(2.0, 2), (4.0, 4)]);
    }

    #[test]
    fn cancelled_plans_are_skipped() {
        let mut queue = Queue::new();
        let first = queue.add_plan(1.0, 1, ());
        queue.add_plan(2.0, 2, ());
        queue.cancel_plan(&first);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.peek_time(), Some(2.0));
        assert_eq!(drain(&mut queue), vec![(2.0, 2)]);
    }

    #[test]
    #[should_panic(expected = "Plan does not exist")]
    fn cancelling_a_retrieved_plan_panics() {
        let mut queue = Queue::new();
        let id = queue.add_plan(1.0, (), ());
        queue.get_next_plan();
        queue.cancel_plan(&id);
    }

    #[test]
    fn retain_filters_payloads() {
        let mut queue = Queue::new();
        for serial in 0..6_u64 {
            #[allow(clippy::cast_precision_loss)]
            queue.add_plan(serial as f64 * 0.5, serial, ());
        }
        queue.retain(|serial| serial % 3 != 0);
        assert_eq!(queue.len(), 4);
        assert_eq!(queue.peek_time(), Some(0.5));
        let kept: Vec<u64> = drain(&mut queue).into_iter().map(|(_, s)| s).collect();
        assert_eq!(kept, vec![1, 2, 4, 5]);
    }

    #[test]
    fn drain_before_excludes_the_boundary() {
        let mut queue = Queue::new();
        for time in [2.5, 0.25, 3.0, 1.0, 2.999] {
            queue.add_plan(time, time, ());
        }
        let times: Vec<f64> = queue.drain_before(3.0).iter().map(|plan| plan.time).collect();
        assert_eq!(times, vec![0.25, 1.0, 2.5, 2.999]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.peek_time(), Some(3.0));

        // A plan added behind the cursor is picked up by the next call
        queue.add_plan(2.0, 2.0, ());
        assert_eq!(queue.drain_before(3.0).len(), 1);
    }
}
