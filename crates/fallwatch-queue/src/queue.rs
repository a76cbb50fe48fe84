use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use fallwatch_types::FrameJob;

struct Inner {
    deque: VecDeque<FrameJob>,
    stopped: bool,
}

/// Bounded FIFO of [`FrameJob`]s between the ingress thread and the worker.
/// On enqueue when full, drops the oldest element first — producers
/// (`push`) never block. Not built on `channellib`/`crossbeam-channel`: a
/// bounded crossbeam channel blocks the sender on a full channel, which is
/// the opposite of this queue's contract.
pub struct FrameQueue {
    capacity: usize,
    state: Mutex<Inner>,
    not_empty: Condvar,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(Inner {
                deque: VecDeque::with_capacity(capacity),
                stopped: false,
            }),
            not_empty: Condvar::new(),
        }
    }

    /// Enqueue a job, dropping the oldest one first if already at capacity.
    /// Never blocks. Returns `true` if a job was dropped to make room, so
    /// the caller can report backpressure through its own throttled
    /// diagnostic path.
    pub fn push(&self, job: FrameJob) -> bool {
        let mut inner = self.state.lock().unwrap();
        let dropped = if inner.deque.len() >= self.capacity {
            inner.deque.pop_front().is_some()
        } else {
            false
        };
        inner.deque.push_back(job);
        self.not_empty.notify_one();
        dropped
    }

    /// Block until a job is available or the queue has been stopped and
    /// drained. Returns `None` only once stopped with nothing left.
    pub fn pop_blocking(&self) -> Option<FrameJob> {
        let mut inner = self.state.lock().unwrap();
        loop {
            if let Some(job) = inner.deque.pop_front() {
                return Some(job);
            }
            if inner.stopped {
                return None;
            }
            inner = self.not_empty.wait(inner).unwrap();
        }
    }

    /// Signal shutdown: no more jobs will be accepted as "live"; the worker
    /// drains whatever remains, then `pop_blocking` returns `None`.
    pub fn stop(&self) {
        let mut inner = self.state.lock().unwrap();
        inner.stopped = true;
        self.not_empty.notify_all();
    }

    /// Current number of buffered jobs. Mainly useful for diagnostics and
    /// tests; the value is stale the instant the lock is released.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().deque.len()
    }
}
