use std::cell::{Cell, RefCell};
use std::rc::Rc;

use lwp::{Scheduler, SchedulerRef, ThreadId};

const COUNTERS: i32 = 4;

/// Always picks the newest ready thread, so counters finish one at a time
/// starting from the last one created.
#[derive(Default)]
struct Newest(Vec<ThreadId>);

impl Scheduler for Newest {
    fn admit(&mut self, tid: ThreadId) {
        let index = self.0.partition_point(|other| *other < tid);
        self.0.insert(index, tid);
    }

    fn remove(&mut self, tid: ThreadId) {
        self.0.retain(|other| *other != tid);
    }

    fn next(&mut self) -> Option<ThreadId> {
        self.0.last().copied()
    }

    fn qlen(&self) -> usize {
        self.0.len()
    }
}

fn main() {
    lwp::console::log::init();

    let total = Rc::new(Cell::new(0));
    for limit in 1..=COUNTERS {
        let total = Rc::clone(&total);
        let created = lwp::create(move || {
            for count in 1..=limit {
                total.set(total.get() + 1);
                let tid = lwp::gettid().unwrap_or(ThreadId::NONE);
                println!("[{}] count {}/{}", tid, count, limit);
                lwp::r#yield();
            }
            limit
        });
        if let Err(err) = created {
            log::error!("{}", err);
            return;
        }
    }

    if std::env::args().any(|arg| arg == "--newest") {
        let scheduler: SchedulerRef = Rc::new(RefCell::new(Newest::default()));
        lwp::set_scheduler(Some(scheduler));
    }

    lwp::start();
    apps::reap_all();
    println!("Counted to {} across {} threads", total.get(), COUNTERS);
}
