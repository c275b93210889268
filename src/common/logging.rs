//! logging.rs -- logger setup for the server.
//!
//! Always logs to the terminal. Also logs to a file if one is configured.
//
use anyhow::{Error, anyhow};
use log::LevelFilter;
use simplelog::{ColorChoice, CombinedLogger, SharedLogger, TermLogger, TerminalMode, WriteLogger};
use std::path::Path;

/// Set up logging. Verbose means Debug, otherwise Info.
pub fn init_logger(verbose: bool, log_file: Option<&Path>) -> Result<(), Error> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        simplelog::Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];
    if let Some(log_file) = log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .map_err(|e| anyhow!("Unable to open log file {:?}: {}", log_file, e))?;
        loggers.push(WriteLogger::new(level, simplelog::Config::default(), file));
    }
    CombinedLogger::init(loggers).map_err(|e| anyhow!("Logger already set up: {}", e))?;
    if let Some(log_file) = log_file {
        log::info!("Logging to {:?}", log_file); // where the log is going
    }
    Ok(())
}

/// Logger for cargo test. Debug level, terminal only.
/// Repeated calls are harmless; only the first one installs a logger.
pub fn test_logger() {
    let _ = init_logger(true, None);
}
