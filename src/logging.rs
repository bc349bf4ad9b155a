use std::fs::OpenOptions;
use std::io::{self, Write};
use std::process::exit;

use log::{LevelFilter, SetLoggerError};
use simplelog::{ColorChoice, ConfigBuilder, SharedLogger, TermLogger, TerminalMode, WriteLogger};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("set_logger error: {0}")]
    Init(#[from] SetLoggerError),
}

/// Installs the global logger: stderr when `log_stream` is `-`, otherwise
/// the named file, truncated.
pub fn set_logger(log_stream: &str, log_level: LevelFilter) -> Result<(), LoggingError> {
    let log_conf = ConfigBuilder::new()
        .set_thread_level(LevelFilter::Debug)
        .set_target_level(LevelFilter::Trace)
        .build();

    let logger: Box<dyn SharedLogger> = if log_stream == "-" {
        TermLogger::new(log_level, log_conf, TerminalMode::Stderr, ColorChoice::Auto)
    } else {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(log_stream)?;
        WriteLogger::new(log_level, log_conf, file)
    };

    simplelog::CombinedLogger::init(vec![logger])?;

    Ok(())
}

pub fn set_logger_or_exit(log_stream: &str, log_level: LevelFilter) {
    if let Err(err) = set_logger(log_stream, log_level) {
        let stderr = io::stderr();
        let _ = writeln!(stderr.lock(), "can't start logging to \"{}\": {}", log_stream, err);
        exit(-1);
    }
}
