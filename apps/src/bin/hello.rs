use lwp::ThreadId;

const THREADS: usize = 5;
const ROUNDS: usize = 3;

fn main() {
    lwp::console::log::init();

    for index in 0..THREADS {
        let greeting = format!("Hello from thread {index}");
        if let Err(err) = lwp::create(move || {
            for round in 0..ROUNDS {
                let tid = lwp::gettid().unwrap_or(ThreadId::NONE);
                println!("[{}] {} (round {})", tid, greeting, round);
                lwp::r#yield();
            }
            index as i32
        }) {
            log::error!("{}", err);
        }
    }

    lwp::start();
    let reaped = apps::reap_all();
    println!("Reaped {} threads", reaped);
}
