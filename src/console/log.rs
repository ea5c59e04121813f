use log::{Level, LevelFilter, Log, Metadata, Record};
use std::io::{self, Write};

/// Environment variable holding the maximum level, e.g. `LWP_LOG=debug`.
pub const LOG_ENV: &str = "LWP_LOG";

const DEFAULT_LEVEL: LevelFilter = LevelFilter::Info;

/// Installs the stderr logger. Later calls, or another logger already being
/// installed, leave the existing one in place.
pub fn init() {
    static LOGGER: Logger = Logger;

    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(parse_level(std::env::var(LOG_ENV).ok().as_deref()));
    }
}

fn parse_level(value: Option<&str>) -> LevelFilter {
    value
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(DEFAULT_LEVEL)
}

struct Logger;

impl Logger {
    fn log_message(&self, record: &Record) -> io::Result<()> {
        let mut stderr = io::stderr().lock();
        write!(
            stderr,
            "[\x1b[{}m{}\x1b[0m] {}",
            record.level().color(),
            record.level(),
            record.args()
        )?;

        if record.level() == Level::Debug {
            write!(
                stderr,
                ", {}:{}",
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0)
            )?;
        }
        writeln!(stderr)
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let _ = self.log_message(record);
        }
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

trait LogLevel {
    fn color(&self) -> &'static str;
}

impl LogLevel for Level {
    fn color(&self) -> &'static str {
        match self {
            Level::Error => "31",
            Level::Warn => "33",
            Level::Info => "32",
            Level::Debug => "34",
            Level::Trace => "35",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_comes_from_value() {
        assert_eq!(parse_level(Some("debug")), LevelFilter::Debug);
        assert_eq!(parse_level(Some(" TRACE ")), LevelFilter::Trace);
        assert_eq!(parse_level(Some("off")), LevelFilter::Off);
    }

    #[test]
    fn missing_or_invalid_level_uses_default() {
        assert_eq!(parse_level(None), DEFAULT_LEVEL);
        assert_eq!(parse_level(Some("loud")), DEFAULT_LEVEL);
    }

    #[test]
    fn init_twice_keeps_first_logger() {
        init();
        init();
        log::info!("logger installed");
    }
}
