use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use super::thread::ThreadId;

/// Shared handle to a scheduling policy, compared by identity when swapped.
pub type SchedulerRef = Rc<RefCell<dyn Scheduler>>;

/// Ordering policy over the ready threads.
///
/// The runtime admits a thread once when it becomes ready and removes it when
/// it blocks or exits; the running thread stays admitted. Implementations must
/// not call back into the runtime.
pub trait Scheduler {
    fn init(&mut self) {}

    fn admit(&mut self, tid: ThreadId);

    /// Removing a thread that is not admitted does nothing.
    fn remove(&mut self, tid: ThreadId);

    /// Picks the next thread to run, `None` when nothing is ready.
    fn next(&mut self) -> Option<ThreadId>;

    /// Number of admitted threads.
    fn qlen(&self) -> usize;

    fn shutdown(&mut self) {}

    /// Empties the policy, yielding threads in the order it would have run them.
    fn drain(&mut self) -> Vec<ThreadId> {
        let mut threads = Vec::with_capacity(self.qlen());
        while let Some(tid) = self.next() {
            self.remove(tid);
            threads.push(tid);
        }
        threads
    }
}

/// Strict FIFO rotation over the ready threads.
#[derive(Debug, Default)]
pub struct RoundRobin {
    ready_threads: VecDeque<ThreadId>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SchedulerRef {
        Rc::new(RefCell::new(Self::new()))
    }
}

impl Scheduler for RoundRobin {
    #[inline]
    fn admit(&mut self, tid: ThreadId) {
        self.ready_threads.push_back(tid);
    }

    fn remove(&mut self, tid: ThreadId) {
        if let Some(index) = self.ready_threads.iter().position(|other| *other == tid) {
            self.ready_threads.remove(index);
        }
    }

    fn next(&mut self) -> Option<ThreadId> {
        let tid = self.ready_threads.pop_front()?;
        self.ready_threads.push_back(tid);
        Some(tid)
    }

    #[inline]
    fn qlen(&self) -> usize {
        self.ready_threads.len()
    }

    fn drain(&mut self) -> Vec<ThreadId> {
        self.ready_threads.drain(..).collect()
    }
}
