use core::sync::atomic::{AtomicU64, Ordering};
use derive_more::Display;

use super::context::{Context, EntryFn};
use super::stack::{StackResult, ThreadStack};

const LIVE_TAG: i32 = 0;
const TERMINATED_TAG: i32 = 1;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display("{_0}")]
pub struct ThreadId(pub u64);

impl ThreadId {
    /// Numeric sentinel for "no thread"; never handed out to a real thread.
    pub const NONE: ThreadId = ThreadId(0);

    pub(super) fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        ThreadId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Liveness of a thread, with the exit code once it has terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadStatus {
    #[default]
    Live,
    Terminated(u8),
}

impl ThreadStatus {
    /// Only the low 8 bits of `code` are kept, like a process exit status.
    pub fn terminated(code: i32) -> Self {
        ThreadStatus::Terminated((code & 0xff) as u8)
    }

    #[inline]
    pub fn is_terminated(&self) -> bool {
        matches!(self, ThreadStatus::Terminated(_))
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            ThreadStatus::Live => 0,
            ThreadStatus::Terminated(code) => *code,
        }
    }

    /// Packs the status as `tag << 8 | code`, tag 0 for live and 1 for terminated.
    pub fn packed(&self) -> i32 {
        match self {
            ThreadStatus::Live => LIVE_TAG << 8,
            ThreadStatus::Terminated(code) => (TERMINATED_TAG << 8) | *code as i32,
        }
    }

    pub fn from_packed(status: i32) -> Self {
        match (status >> 8) & 0xff {
            TERMINATED_TAG => ThreadStatus::terminated(status),
            _ => ThreadStatus::Live,
        }
    }
}

/// Copy of a thread's externally visible state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: ThreadId,
    pub status: ThreadStatus,
    pub stack_size: Option<usize>,
}

pub struct Thread {
    pub id: ThreadId,
    pub status: ThreadStatus,
    pub context: Context,
    pub stack: Option<ThreadStack>,
    pub exited: Option<ThreadId>,
}

impl Thread {
    fn new(stack: Option<ThreadStack>) -> Box<Self> {
        Box::new(Thread {
            id: ThreadId::new(),
            status: ThreadStatus::Live,
            context: Context::default(),
            stack,
            exited: None,
        })
    }

    /// Thread record for the flow that called `start`; it keeps its own stack.
    pub fn new_init_thread() -> Box<Self> {
        Self::new(None)
    }

    pub fn new_lwp(entry: EntryFn, arg: *mut u8) -> StackResult<Box<Self>> {
        let stack = ThreadStack::allocate()?;
        let stack_end = stack.end_address();
        let mut thread = Self::new(Some(stack));

        unsafe { thread.context.init(entry, arg, stack_end) };

        Ok(thread)
    }

    pub fn info(&self) -> ThreadInfo {
        ThreadInfo {
            id: self.id,
            status: self.status,
            stack_size: self.stack.as_ref().map(ThreadStack::size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn entry(_arg: *mut u8) -> i32 {
        0
    }

    #[test]
    fn exit_code_keeps_low_byte() {
        assert_eq!(ThreadStatus::terminated(42), ThreadStatus::Terminated(42));
        assert_eq!(ThreadStatus::terminated(0x1ff), ThreadStatus::Terminated(0xff));
        assert_eq!(ThreadStatus::terminated(-1), ThreadStatus::Terminated(0xff));
        assert_eq!(ThreadStatus::terminated(256).exit_code(), 0);
    }

    #[test]
    fn packed_status_decodes_back() {
        let status = ThreadStatus::terminated(42);
        assert_eq!(status.packed(), 0x100 | 42);
        assert_eq!(ThreadStatus::from_packed(status.packed()), status);
        assert_eq!(ThreadStatus::from_packed(ThreadStatus::Live.packed()), ThreadStatus::Live);
        assert!(!ThreadStatus::Live.is_terminated());
    }

    #[test]
    fn ids_increase_and_skip_sentinel() {
        let first = Thread::new_init_thread();
        let second = Thread::new_init_thread();

        assert_ne!(first.id, ThreadId::NONE);
        assert!(second.id > first.id);
    }

    #[test]
    fn lwp_owns_stack_and_init_thread_does_not() {
        let lwp = Thread::new_lwp(entry, core::ptr::null_mut()).unwrap();
        let init = Thread::new_init_thread();

        assert!(lwp.info().stack_size.is_some_and(|size| size > 0));
        assert_eq!(init.info().stack_size, None);
        assert_eq!(lwp.info().status, ThreadStatus::Live);
    }
}
