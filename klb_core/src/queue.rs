use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// Shared state behind a `BoundedQueue`: the item ring plus a `closed` flag
/// that unblocks any waiter once the producer or consumer side is done,
/// instead of the two sides deadlocking against each other.
struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// A bounded MPMC queue used to hand blocks between the pipeline's worker
/// threads and its single ordered writer/scatter thread (spec.md §4.3, C3).
///
/// Mirrors the mutex-plus-condvar shape of `TPool`'s `PoolState`/`Condvar`
/// pair, with two condvars (not-full, not-empty) instead of one, since here
/// both `push` and `pop` can block.
pub struct BoundedQueue<T> {
    state: Mutex<QueueState<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "BoundedQueue capacity must be positive");
        BoundedQueue {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
        }
    }

    /// Capacity formula from spec.md §4.4: `clamp(ceil(Nb/W), max(W, 5),
    /// 20)`, i.e. the per-worker share of the block count, floored at
    /// `max(W, 5)` so a queue is never starved of slack, and capped at 20
    /// so memory doesn't grow with the block count. `lo` is additionally
    /// capped at the same 20 ceiling so the clamp's bounds never invert
    /// when `W` is itself large.
    pub fn capacity_for(num_workers: usize, total_blocks: u64) -> usize {
        let w = num_workers.max(1);
        let per_worker = ((total_blocks as usize) + w - 1) / w;
        let lo = w.max(5).min(20);
        per_worker.clamp(lo, 20)
    }

    /// Blocks until there is room, then enqueues `item`. Returns `Err(item)`
    /// without enqueueing if the queue has been closed.
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut state = self.state.lock().unwrap();
        while state.items.len() >= self.capacity && !state.closed {
            state = self.not_full.wait(state).unwrap();
        }
        if state.closed {
            return Err(item);
        }
        state.items.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Blocks until an item is available or the queue is closed and
    /// drained, in which case it returns `None`.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(item) = state.items.pop_front() {
                self.not_full.notify_one();
                return Some(item);
            }
            if state.closed {
                return None;
            }
            state = self.not_empty.wait(state).unwrap();
        }
    }

    /// Wakes every blocked `push`/`pop`. Already-queued items remain
    /// poppable; `push` after this starts failing and `pop` returns `None`
    /// once drained.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn push_then_pop_preserves_order() {
        let q: BoundedQueue<u32> = BoundedQueue::new(4);
        q.push(1).unwrap();
        q.push(2).unwrap();
        q.push(3).unwrap();
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
    }

    #[test]
    fn close_unblocks_waiting_pop() {
        let q: Arc<BoundedQueue<u32>> = Arc::new(BoundedQueue::new(2));
        let q2 = Arc::clone(&q);
        let handle = thread::spawn(move || q2.pop());
        thread::sleep(std::time::Duration::from_millis(20));
        q.close();
        assert_eq!(handle.join().unwrap(), None);
    }

    #[test]
    fn close_unblocks_waiting_push() {
        let q: Arc<BoundedQueue<u32>> = Arc::new(BoundedQueue::new(1));
        q.push(1).unwrap();
        let q2 = Arc::clone(&q);
        let handle = thread::spawn(move || q2.push(2));
        thread::sleep(std::time::Duration::from_millis(20));
        q.close();
        assert_eq!(handle.join().unwrap(), Err(2));
    }

    #[test]
    fn capacity_for_is_bounded_between_num_workers_and_20() {
        assert_eq!(BoundedQueue::<()>::capacity_for(4, 3), 5);
        assert!(BoundedQueue::<()>::capacity_for(4, 1000) <= 20);
        assert!(BoundedQueue::<()>::capacity_for(8, 1000) >= 8);
    }
}
