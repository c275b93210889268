//! Web front end for the edict device query tool.
//!
//! Serves the query form and its assets from a document root.
//! A form POST is checked, handed to the external query tool
//! as an argument vector, and the tool's START ... END result
//! comes back rendered into the reply template.
//!
//! Usage:
//!
//!     edictserver [-c edict.conf] [-p PORT] [-d DOCROOT] [-q QUERYTOOL] [-t TIMEOUT_MS] [-v]
//!
//!     License: LGPL.
//!     October, 2026.
//
#![forbid(unsafe_code)]
use anyhow::{Error, anyhow};
use common::{Dispatcher, ServerConfig, TemplateRenderer};
use common::{init_logger, run_server};
use getopts::Options;
use std::path::PathBuf;
use std::time::Duration;

/// Used if no -c option and this file exists.
const DEFAULT_CONFIG_FILE: &str = "edict.conf";

fn print_usage(program: &str, opts: Options) {
    let brief = format!("Usage: {} [options]", program);
    print!("{}", opts.usage(&brief));
}

/// Program name and the options after it. Argv can be empty.
fn split_args(args: &[String]) -> (String, &[String]) {
    let program = args
        .first()
        .cloned()
        .unwrap_or_else(|| "edictserver".to_string());
    (program, args.get(1..).unwrap_or(&[]))
}

/// Options, configuration file, and logging.
/// Returns None if only help was wanted.
fn setup() -> Result<Option<ServerConfig>, Error> {
    //  Usual options processing
    let args: Vec<String> = std::env::args().collect();
    let (program, option_args) = split_args(&args);
    //  The options
    let mut opts = Options::new();
    opts.optopt("c", "config", "Read configuration from this file.", "FILE");
    opts.optopt("p", "port", "Listen on this port.", "PORT");
    opts.optopt("d", "docroot", "Serve static files from this directory.", "DIR");
    opts.optopt("q", "query", "Path to the query tool.", "PATH");
    opts.optopt("t", "timeout", "Query tool timeout, milliseconds.", "MS");
    opts.optflag("h", "help", "Print this help menu.");
    opts.optflag("v", "verbose", "Verbose mode.");
    let matches = opts
        .parse(option_args)
        .map_err(|f| anyhow!("{}", f))?;
    if matches.opt_present("h") {
        print_usage(&program, opts);
        return Ok(None);
    }
    //  Configuration file, if any
    let mut config = match matches.opt_str("c") {
        Some(configfile) => ServerConfig::load(&PathBuf::from(configfile))?,
        None => {
            let default_file = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default_file.exists() {
                ServerConfig::load(&default_file)?
            } else {
                ServerConfig::defaults()?
            }
        }
    };
    //  Command line overrides
    if let Some(port) = matches.opt_str("p") {
        config.port = port
            .parse::<u16>()
            .map_err(|e| anyhow!("Port {:?} is not a port number: {}", port, e))?;
    }
    if let Some(docroot) = matches.opt_str("d") {
        //  Template follows the document root unless it was set explicitly.
        if config.template_file == config.base_dir.join(ServerConfig::DEFAULT_TEMPLATE) {
            config.template_file = PathBuf::from(&docroot).join(ServerConfig::DEFAULT_TEMPLATE);
        }
        config.base_dir = PathBuf::from(docroot);
    }
    if let Some(query) = matches.opt_str("q") {
        config.query_binary = PathBuf::from(query);
    }
    if let Some(timeout) = matches.opt_str("t") {
        let ms = timeout
            .parse::<u64>()
            .map_err(|e| anyhow!("Timeout {:?} is not a number: {}", timeout, e))?;
        if ms == 0 {
            return Err(anyhow!("Timeout must be greater than zero"));
        }
        config.query_timeout = Duration::from_millis(ms);
    }
    init_logger(matches.opt_present("v"), config.log_file.as_deref())?;
    log::info!("Configuration: {:?}", config);
    Ok(Some(config))
}

/// Load the template, build the dispatcher, serve.
fn run(config: ServerConfig) -> Result<(), Error> {
    if !config.base_dir.is_dir() {
        return Err(anyhow!(
            "Document root {:?} is not a directory",
            config.base_dir
        ));
    }
    if !config.query_binary.exists() {
        //  Not fatal. Queries will fail with 502 until it shows up.
        log::warn!("Query tool {:?} not found", config.query_binary);
    }
    let renderer = TemplateRenderer::load(&config.template_file)?;
    let dispatcher = Dispatcher::new(&config, renderer);
    run_server(&config, dispatcher)
}

/// Main program.
/// Setup, then run.
fn main() {
    match setup() {
        Ok(Some(config)) => {
            if let Err(e) = run(config) {
                log::error!("Edict server failed: {:?}", e);
                eprintln!("Edict server failed: {:?}", e);
                std::process::exit(1);
            }
        }
        Ok(None) => {}
        Err(e) => {
            eprintln!("Unable to start: {:?}", e);
            std::process::exit(2);
        }
    }
}

#[test]
fn split_args_handles_empty_argv() {
    let (program, rest) = split_args(&[]);
    assert_eq!(program, "edictserver");
    assert!(rest.is_empty());
    let args = vec!["/usr/bin/edictserver".to_string(), "-v".to_string()];
    let (program, rest) = split_args(&args);
    assert_eq!(program, "/usr/bin/edictserver");
    assert_eq!(rest, ["-v".to_string()]);
}
