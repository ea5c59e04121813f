pub mod context;
pub mod registry;
pub mod runtime;
pub mod scheduler;
pub mod stack;
pub mod thread;

pub use scheduler::{RoundRobin, Scheduler, SchedulerRef};
pub use thread::{Thread, ThreadId, ThreadInfo, ThreadStatus};
