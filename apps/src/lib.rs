use lwp::{ThreadId, ThreadStatus};

/// Reaps every thread that is left and prints how each one ended.
pub fn reap_all() -> usize {
    let mut count = 0;
    while let Some((tid, status)) = lwp::wait() {
        report(tid, status);
        count += 1;
    }
    count
}

pub fn report(tid: ThreadId, status: ThreadStatus) {
    match status {
        ThreadStatus::Terminated(code) => println!("Thread {} exited with {}", tid, code),
        ThreadStatus::Live => log::warn!("Thread {} reaped while still live", tid),
    }
}
