use std::collections::{BTreeMap, VecDeque};

use super::thread::{Thread, ThreadId};

/// Every thread that has been created and not yet reaped.
///
/// Ids are handed out in increasing order, so iteration follows creation order.
#[derive(Default)]
pub struct Registry {
    threads: BTreeMap<ThreadId, Box<Thread>>,
}

impl Registry {
    #[inline]
    pub fn add(&mut self, thread: Box<Thread>) {
        self.threads.insert(thread.id, thread);
    }

    #[inline]
    pub fn remove(&mut self, id: ThreadId) -> Option<Box<Thread>> {
        self.threads.remove(&id)
    }

    #[inline]
    pub fn get(&self, id: ThreadId) -> Option<&Thread> {
        self.threads.get(&id).map(|thread| &**thread)
    }

    #[inline]
    pub fn get_mut(&mut self, id: ThreadId) -> Option<&mut Thread> {
        self.threads.get_mut(&id).map(|thread| &mut **thread)
    }

    #[cfg(test)]
    pub fn ids(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.threads.keys().copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}

/// FIFO of thread ids used for the terminated and waiting lists.
#[derive(Debug, Default)]
pub struct ThreadQueue {
    threads: VecDeque<ThreadId>,
}

impl ThreadQueue {
    #[inline]
    pub fn push(&mut self, id: ThreadId) {
        self.threads.push_back(id);
    }

    #[inline]
    pub fn pop(&mut self) -> Option<ThreadId> {
        self.threads.pop_front()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn registry_keeps_creation_order() {
        let mut registry = Registry::default();
        let threads: Vec<_> = (0..3).map(|_| Thread::new_init_thread()).collect();
        let ids: Vec<_> = threads.iter().map(|thread| thread.id).collect();

        for thread in threads.into_iter().rev() {
            registry.add(thread);
        }

        assert_eq!(registry.ids().collect::<Vec<_>>(), ids);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn removed_thread_is_no_longer_found() {
        let mut registry = Registry::default();
        let thread = Thread::new_init_thread();
        let id = thread.id;
        registry.add(thread);

        assert_eq!(registry.get(id).map(|thread| thread.id), Some(id));
        assert_eq!(registry.remove(id).map(|thread| thread.id), Some(id));
        assert!(registry.get(id).is_none());
        assert!(registry.remove(id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn queue_is_first_in_first_out() {
        let mut queue = ThreadQueue::default();
        queue.push(ThreadId(3));
        queue.push(ThreadId(1));
        queue.push(ThreadId(2));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop(), Some(ThreadId(3)));
        assert_eq!(queue.pop(), Some(ThreadId(1)));
        assert_eq!(queue.pop(), Some(ThreadId(2)));
        assert_eq!(queue.pop(), None);
        assert!(queue.is_empty());
    }
}
