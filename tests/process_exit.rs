use std::env;
use std::process::{Command, ExitStatus};

use lwp::ThreadStatus;
use pretty_assertions::assert_eq;

/// Set in the child process to the name of the test it should act out.
const CASE_ENV: &str = "LWP_PROCESS_EXIT_CASE";

fn is_child(case: &str) -> bool {
    env::var(CASE_ENV).is_ok_and(|value| value == case)
}

/// Runs `case` in a fresh copy of this test binary, where the LWP world is
/// allowed to end the process.
fn run_child(case: &str) -> ExitStatus {
    let exe = env::current_exe().unwrap();
    Command::new(exe)
        .args([case, "--exact", "--test-threads=1", "--nocapture"])
        .env(CASE_ENV, case)
        .status()
        .unwrap()
}

#[test]
fn last_worker_exit_code_ends_process() {
    const CASE: &str = "last_worker_exit_code_ends_process";

    if is_child(CASE) {
        lwp::create(|| {
            lwp::r#yield();
            9
        })
        .unwrap();
        lwp::start();
        lwp::exit(0x121);
    }

    assert_eq!(run_child(CASE).code(), Some(9));
}

#[test]
fn worker_reaping_main_flow_ends_process() {
    const CASE: &str = "worker_reaping_main_flow_ends_process";

    if is_child(CASE) {
        lwp::create(|| match lwp::wait() {
            Some((_, ThreadStatus::Terminated(4))) => 5,
            _ => 1,
        })
        .unwrap();
        lwp::start();
        lwp::exit(4);
    }

    assert_eq!(run_child(CASE).code(), Some(5));
}

#[test]
fn main_flow_exiting_last_ends_process() {
    const CASE: &str = "main_flow_exiting_last_ends_process";

    if is_child(CASE) {
        lwp::create(|| 7).unwrap();
        lwp::start();
        while lwp::wait().is_some() {}
        lwp::exit(3);
    }

    assert_eq!(run_child(CASE).code(), Some(3));
}
