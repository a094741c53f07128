//! Leveled stderr logger for the shell.

use std::io::Write;

use log::{Level, LevelFilter, Log};
use owo_colors::OwoColorize;

struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level = record.level();
        let tag = format!("{level:5}");
        let stderr = std::io::stderr();
        let mut out = stderr.lock();
        let _ = match level {
            Level::Error => writeln!(out, "{} {}", tag.bright_red(), record.args()),
            Level::Warn => writeln!(out, "{} {}", tag.bright_yellow(), record.args()),
            Level::Info => writeln!(out, "{} {}", tag.bright_blue(), record.args()),
            Level::Debug => writeln!(out, "{} {}", tag.bright_cyan(), record.args()),
            Level::Trace => writeln!(out, "{} {}", tag.bright_magenta(), record.args()),
        };
    }

    fn flush(&self) {}
}

pub fn init() {
    let level = match std::env::var("FATSHELL_LOG").as_deref() {
        Ok("trace") => LevelFilter::Trace,
        Ok("debug") => LevelFilter::Debug,
        Ok("warn") => LevelFilter::Warn,
        Ok("error") => LevelFilter::Error,
        _ => LevelFilter::Info,
    };
    log::set_max_level(level);
    let _ = log::set_logger(&LOGGER);
}
