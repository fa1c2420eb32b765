//! Diagnostics go to stderr; stdout carries packet output only.

use std::io::IsTerminal;

use clap::ValueEnum;
use tracing::level_filters::LevelFilter;

/// Shape of log lines on stderr.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines, coloured when stderr is a terminal.
    Text,
    /// Text without span context, one short line per event.
    Compact,
    /// One JSON object per event with fields at the top level.
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    /// Adds open/close and read-size events.
    Debug,
    /// Adds one event per read delivery and per packet.
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LogSetup {
    format: LogFormat,
    filter: LevelFilter,
    ansi: bool,
    /// Module targets separate transport, framing and device events; only
    /// worth the width once debug output is on.
    targets: bool,
}

impl LogSetup {
    fn new(format: LogFormat, level: LogLevel, stderr_is_terminal: bool) -> Self {
        Self {
            format,
            filter: level.into(),
            ansi: format == LogFormat::Text && stderr_is_terminal,
            targets: level >= LogLevel::Debug,
        }
    }
}

pub fn init_logging(format: LogFormat, level: LogLevel) {
    let setup = LogSetup::new(format, level, std::io::stderr().is_terminal());
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(setup.filter)
        .with_ansi(setup.ansi)
        .with_target(setup.targets);

    let installed = match setup.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
    };
    if let Err(err) = installed {
        eprintln!("warning: logging not initialised: {err}");
    }
}
