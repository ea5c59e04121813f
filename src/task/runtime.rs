use core::{mem, ptr};
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::process;
use std::rc::Rc;
use thiserror::Error;

use super::context::{Context, swap_rfiles};
use super::registry::{Registry, ThreadQueue};
use super::scheduler::{RoundRobin, SchedulerRef};
use super::stack::StackError;
use super::thread::{Thread, ThreadId, ThreadInfo, ThreadStatus};

/// Exit code given to a thread whose body panicked.
pub const PANIC_EXIT_CODE: i32 = 101;

thread_local! {
    static RUNTIME: RefCell<Runtime> = RefCell::new(Runtime::default());
}

#[derive(Debug, Error)]
pub enum LwpError {
    #[error("Failed to allocate thread stack: {0}")]
    Stack(#[from] StackError),
}

pub type LwpResult<T> = Result<T, LwpError>;

enum Switch {
    Stay,
    Exit(i32),
    To {
        old: *mut Context,
        new: *const Context,
    },
}

enum WaitStep {
    Reaped(ThreadId, ThreadStatus),
    NoThread,
    Block,
}

/// All state of the threads multiplexed onto one OS thread.
struct Runtime {
    threads: Registry,
    current: Option<ThreadId>,
    scheduler: SchedulerRef,
    round_robin: SchedulerRef,
    terminated: ThreadQueue,
    waiting: ThreadQueue,
    switches: u64,
}

impl Default for Runtime {
    fn default() -> Self {
        let round_robin = RoundRobin::shared();

        Self {
            threads: Registry::default(),
            current: None,
            scheduler: Rc::clone(&round_robin),
            round_robin,
            terminated: ThreadQueue::default(),
            waiting: ThreadQueue::default(),
            switches: 0,
        }
    }
}

impl Runtime {
    fn spawn(&mut self, thread: Box<Thread>) -> ThreadId {
        let id = thread.id;
        self.threads.add(thread);
        self.scheduler.borrow_mut().admit(id);
        id
    }

    fn start(&mut self) -> bool {
        if let Some(current) = self.current {
            log::error!("Called start while thread {} is active", current);
            return false;
        }

        let id = self.spawn(Thread::new_init_thread());
        self.current = Some(id);
        log::debug!("Thread {} converted from the calling flow", id);
        true
    }

    fn prepare_switch(&mut self) -> Switch {
        let Some(current) = self.current else {
            log::warn!("Called yield before start");
            return Switch::Stay;
        };

        let Some(next) = self.scheduler.borrow_mut().next() else {
            let code = self.threads.get(current).map_or(0, |thread| thread.status.exit_code());
            log::debug!("No thread left to run, exiting with {}", code);
            self.detach_running_stack(current);
            return Switch::Exit(code as i32);
        };

        let old = match self.threads.get_mut(current) {
            Some(thread) => ptr::addr_of_mut!(thread.context),
            None => {
                log::error!("Running thread {} is missing from the registry", current);
                return Switch::Stay;
            }
        };
        let new = match self.threads.get(next) {
            Some(thread) => ptr::addr_of!(thread.context),
            None => {
                log::error!("Scheduler picked unknown thread {}", next);
                return Switch::Stay;
            }
        };

        self.current = Some(next);
        self.switches += 1;
        log::trace!("Switching from thread {} to thread {}", current, next);

        Switch::To { old, new }
    }

    /// The process is about to exit on this stack, and thread-local teardown
    /// must not unmap it underneath the exit path.
    fn detach_running_stack(&mut self, current: ThreadId) {
        if let Some(stack) = self
            .threads
            .get_mut(current)
            .and_then(|thread| thread.stack.take())
        {
            mem::forget(stack);
        }
    }

    fn terminate_current(&mut self, code: i32) -> Option<ThreadId> {
        let current = self.current?;

        if let Some(thread) = self.threads.get_mut(current) {
            thread.status = ThreadStatus::terminated(code);
        }
        self.scheduler.borrow_mut().remove(current);
        self.terminated.push(current);
        log::debug!("Thread {} exited with {}", current, code & 0xff);

        if let Some(waiter) = self.waiting.pop() {
            let exited = self.terminated.pop();
            if let Some(thread) = self.threads.get_mut(waiter) {
                thread.exited = exited;
            }
            self.scheduler.borrow_mut().admit(waiter);
        }

        Some(current)
    }

    fn begin_wait(&mut self) -> WaitStep {
        if let Some(id) = self.terminated.pop() {
            return match self.reap(id) {
                Some((id, status)) => WaitStep::Reaped(id, status),
                None => WaitStep::NoThread,
            };
        }

        let Some(current) = self.current else {
            log::warn!("Called wait before start");
            return WaitStep::NoThread;
        };

        if self.scheduler.borrow().qlen() <= 1 {
            return WaitStep::NoThread;
        }

        self.scheduler.borrow_mut().remove(current);
        self.waiting.push(current);
        log::debug!("Thread {} waiting, {} waiter(s) queued", current, self.waiting.len());
        WaitStep::Block
    }

    fn finish_wait(&mut self) -> Option<(ThreadId, ThreadStatus)> {
        let exited = self
            .current
            .and_then(|current| self.threads.get_mut(current))
            .and_then(|thread| thread.exited.take());

        match exited {
            Some(id) => self.reap(id),
            None => {
                log::error!("Woke from wait without a terminated thread to reap");
                None
            }
        }
    }

    fn reap(&mut self, id: ThreadId) -> Option<(ThreadId, ThreadStatus)> {
        let thread = self.threads.remove(id)?;
        log::debug!("Reaped thread {} ({:?})", thread.id, thread.status);
        Some((thread.id, thread.status))
    }

    fn set_scheduler(&mut self, scheduler: SchedulerRef) {
        if Rc::ptr_eq(&self.scheduler, &scheduler) {
            return;
        }

        scheduler.borrow_mut().init();
        {
            let mut old = self.scheduler.borrow_mut();
            let mut new = scheduler.borrow_mut();
            let threads = old.drain();
            log::debug!("Moving {} ready threads to the new scheduler", threads.len());
            threads.into_iter().for_each(|tid| new.admit(tid));
            old.shutdown();
        }
        self.scheduler = scheduler;
    }
}

#[inline]
fn with_runtime<R>(f: impl FnOnce(&mut Runtime) -> R) -> R {
    RUNTIME.with_borrow_mut(f)
}

/// Creates a thread running `function`, admitted to the active scheduler.
///
/// The value `function` returns becomes the thread's exit code, exactly as if
/// it had called [`exit`] with it.
pub fn create<F>(function: F) -> LwpResult<ThreadId>
where
    F: FnOnce() -> i32 + 'static,
{
    extern "C" fn entry_point<F: FnOnce() -> i32>(arg: *mut u8) -> i32 {
        let function = unsafe { *Box::from_raw(arg.cast::<F>()) };
        panic::catch_unwind(AssertUnwindSafe(function)).unwrap_or_else(|_| {
            log::error!("Thread {} panicked", gettid().unwrap_or(ThreadId::NONE));
            PANIC_EXIT_CODE
        })
    }

    let arg = Box::into_raw(Box::new(function)).cast::<u8>();
    let thread = match Thread::new_lwp(entry_point::<F>, arg) {
        Ok(thread) => thread,
        Err(err) => {
            drop(unsafe { Box::from_raw(arg.cast::<F>()) });
            return Err(err.into());
        }
    };

    let id = with_runtime(|runtime| runtime.spawn(thread));
    log::debug!("Created thread {}", id);
    Ok(id)
}

/// Turns the calling flow into a thread and hands control to the scheduler.
pub fn start() {
    if with_runtime(Runtime::start) {
        r#yield();
    }
}

/// Gives up the processor to the next ready thread.
///
/// When the scheduler has nothing to run the whole process exits with the
/// current thread's exit code, which is 0 for a thread that has not exited.
pub fn r#yield() {
    match with_runtime(Runtime::prepare_switch) {
        Switch::Stay => {}
        Switch::Exit(code) => process::exit(code),
        Switch::To { old, new } => unsafe { swap_rfiles(old, new) },
    }
}

/// Terminates the calling thread with the low 8 bits of `code`.
pub fn exit(code: i32) -> ! {
    let Some(id) = with_runtime(|runtime| runtime.terminate_current(code)) else {
        process::exit(code & 0xff)
    };

    r#yield();

    log::error!("Terminated thread {} was resumed", id);
    process::abort()
}

/// Reaps a terminated thread, blocking until one exits if needed.
///
/// Returns `None` without blocking when no other thread could ever terminate.
pub fn wait() -> Option<(ThreadId, ThreadStatus)> {
    match with_runtime(Runtime::begin_wait) {
        WaitStep::Reaped(id, status) => Some((id, status)),
        WaitStep::NoThread => None,
        WaitStep::Block => {
            r#yield();
            with_runtime(Runtime::finish_wait)
        }
    }
}

pub fn gettid() -> Option<ThreadId> {
    with_runtime(|runtime| runtime.current)
}

pub fn thread_for(id: ThreadId) -> Option<ThreadInfo> {
    if id == ThreadId::NONE {
        return None;
    }
    with_runtime(|runtime| runtime.threads.get(id).map(Thread::info))
}

/// Installs `scheduler`, moving every ready thread over to it.
///
/// `None` goes back to the built-in round-robin policy.
pub fn set_scheduler(scheduler: Option<SchedulerRef>) {
    with_runtime(|runtime| {
        let scheduler = scheduler.unwrap_or_else(|| Rc::clone(&runtime.round_robin));
        runtime.set_scheduler(scheduler);
    });
}

pub fn get_scheduler() -> SchedulerRef {
    with_runtime(|runtime| Rc::clone(&runtime.scheduler))
}

/// Number of context switches performed on this OS thread so far.
pub fn switch_count() -> u64 {
    with_runtime(|runtime| runtime.switches)
}

/// Number of threads created and not yet reaped, including the started flow.
pub fn thread_count() -> usize {
    with_runtime(|runtime| runtime.threads.len())
}
