//! Minimal logger.
//!
//! The logger prints `[elapsed LEVEL thread target] message` to stderr.
//! Inspections may run on several threads at once, so the thread name is part
//! of every line. Use `init_with_level` (or `init_from_env`) once at startup.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

struct SimpleLogger {
    level: LevelFilter,
    started: Instant,
}

impl Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        let thread = std::thread::current();
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(
            stderr,
            "[{:7.3}s {:>5} {} {}] {}",
            elapsed,
            record.level(),
            thread.name().unwrap_or("-"),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

static LOGGER: OnceLock<SimpleLogger> = OnceLock::new();

/// Install the simple logger with the provided level filter.
///
/// Calling this more than once is a no-op after the first successful
/// initialization.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| SimpleLogger {
            level,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}

/// Environment variable read by [`init_from_env`].
pub const LOG_LEVEL_ENV: &str = "STAMPCHECK_LOG";

/// Parse a level name (`off`, `error`, `warn`, `info`, `debug`, `trace`).
///
/// Unknown names fall back to `default`.
pub fn parse_level(name: &str, default: LevelFilter) -> LevelFilter {
    name.trim().parse().unwrap_or(default)
}

/// Install the logger with the level taken from `STAMPCHECK_LOG`.
pub fn init_from_env(default: LevelFilter) -> Result<(), log::SetLoggerError> {
    let level = std::env::var(LOG_LEVEL_ENV)
        .map(|v| parse_level(&v, default))
        .unwrap_or(default);
    init_with_level(level)
}

/// Install a `tracing` subscriber. `RUST_LOG` wins over `default_filter`.
#[cfg(feature = "tracing")]
pub fn init_tracing(default_filter: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    if json {
        let _ = fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .json()
            .flatten_event(true)
            .finish()
            .try_init();
    } else {
        let _ = fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_level_accepts_names_case_insensitively() {
        assert_eq!(parse_level("DEBUG", LevelFilter::Info), LevelFilter::Debug);
        assert_eq!(parse_level(" warn ", LevelFilter::Info), LevelFilter::Warn);
    }

    #[test]
    fn parse_level_falls_back_on_garbage() {
        assert_eq!(parse_level("loud", LevelFilter::Error), LevelFilter::Error);
    }
}
