//! Cooperative lightweight threads multiplexed onto a single OS thread.
//!
//! Threads run until they yield, block in [`wait`] or [`exit`]. Which ready
//! thread runs next is decided by a pluggable [`Scheduler`], round-robin by
//! default.

#[cfg(not(all(target_arch = "x86_64", unix)))]
compile_error!("lwp only supports x86_64 Unix targets");

pub mod console;
pub mod task;

pub use task::runtime::{
    LwpError, LwpResult, PANIC_EXIT_CODE, create, exit, get_scheduler, gettid, r#yield,
    set_scheduler, start, switch_count, thread_count, thread_for, wait,
};
pub use task::stack::StackError;
pub use task::{RoundRobin, Scheduler, SchedulerRef, ThreadId, ThreadInfo, ThreadStatus};
