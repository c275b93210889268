//! config.rs -- server configuration.
//!
//! Configuration comes from a key/value file, with command line
//! overrides. The file looks like
//!
//! ```text
//! BASE_DIR = /srv/edict/www
//! PORT = 8000
//! QUERY_BINARY = /srv/edict/query/query
//! QUERY_TIMEOUT_MS = 5000
//! ```
//!
//! All keys are optional. See `ServerConfig` for the full list and defaults.
//!
//! ```text
//! License: LGPL.
//! ```
//
use anyhow::{Error, anyhow};
use envie::Envie;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything the server needs to know. Built once at startup, then shared read-only.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Static document root. (BASE_DIR)
    pub base_dir: PathBuf,
    /// Served for "/". (DEFAULT_DOCUMENT)
    pub default_document: String,
    /// Reply template. (TEMPLATE_FILE, default BASE_DIR/reply.html)
    pub template_file: PathBuf,
    /// Listen address. (BIND_ADDRESS)
    pub bind_address: String,
    /// Listen port. (PORT)
    pub port: u16,
    /// External query tool. (QUERY_BINARY)
    pub query_binary: PathBuf,
    /// Fixed arguments ahead of the query fields. (QUERY_FLAGS, whitespace separated)
    pub query_flags: Vec<String>,
    /// Query tool gets killed after this. (QUERY_TIMEOUT_MS)
    pub query_timeout: Duration,
    /// Number of request worker threads. (WORKER_THREADS)
    pub worker_threads: usize,
    /// Largest POST body accepted. (MAX_BODY_BYTES)
    pub max_body_bytes: usize,
    /// Log file, in addition to the terminal. (LOG_FILE)
    pub log_file: Option<PathBuf>,
}

impl ServerConfig {
    pub const DEFAULT_BASE_DIR: &'static str = "www";
    pub const DEFAULT_DOCUMENT: &'static str = "index.html";
    pub const DEFAULT_TEMPLATE: &'static str = "reply.html";
    pub const DEFAULT_BIND_ADDRESS: &'static str = "0.0.0.0";
    pub const DEFAULT_PORT: u16 = 8000;
    pub const DEFAULT_QUERY_BINARY: &'static str = "../query/query";
    pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 5000;
    pub const DEFAULT_WORKER_THREADS: usize = 4;
    pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024;

    /// Build from any key lookup. Missing keys get defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        //  Treat blank values as missing.
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let base_dir = expand_path(&get("BASE_DIR").unwrap_or_else(|| Self::DEFAULT_BASE_DIR.to_string()));
        let default_document =
            get("DEFAULT_DOCUMENT").unwrap_or_else(|| Self::DEFAULT_DOCUMENT.to_string());
        if default_document.contains('/') || default_document == ".." || default_document == "." {
            return Err(anyhow!(
                "DEFAULT_DOCUMENT must be a plain file name, not {:?}",
                default_document
            ));
        }
        let template_file = match get("TEMPLATE_FILE") {
            Some(t) => expand_path(&t),
            None => base_dir.join(Self::DEFAULT_TEMPLATE),
        };
        let bind_address =
            get("BIND_ADDRESS").unwrap_or_else(|| Self::DEFAULT_BIND_ADDRESS.to_string());
        let port = match get("PORT") {
            Some(p) => p
                .parse::<u16>()
                .map_err(|e| anyhow!("PORT {:?} is not a port number: {}", p, e))?,
            None => Self::DEFAULT_PORT,
        };
        let query_binary = expand_path(
            &get("QUERY_BINARY").unwrap_or_else(|| Self::DEFAULT_QUERY_BINARY.to_string()),
        );
        let query_flags = get("QUERY_FLAGS")
            .map(|f| f.split_whitespace().map(|s| s.to_string()).collect())
            .unwrap_or_default();
        let query_timeout_ms = match get("QUERY_TIMEOUT_MS") {
            Some(t) => t
                .parse::<u64>()
                .map_err(|e| anyhow!("QUERY_TIMEOUT_MS {:?} is not a number: {}", t, e))?,
            None => Self::DEFAULT_QUERY_TIMEOUT_MS,
        };
        if query_timeout_ms == 0 {
            return Err(anyhow!("QUERY_TIMEOUT_MS must be greater than zero"));
        }
        let worker_threads = match get("WORKER_THREADS") {
            Some(w) => w
                .parse::<usize>()
                .map_err(|e| anyhow!("WORKER_THREADS {:?} is not a number: {}", w, e))?,
            None => Self::DEFAULT_WORKER_THREADS,
        };
        if worker_threads == 0 {
            return Err(anyhow!("WORKER_THREADS must be at least 1"));
        }
        let max_body_bytes = match get("MAX_BODY_BYTES") {
            Some(m) => m
                .parse::<usize>()
                .map_err(|e| anyhow!("MAX_BODY_BYTES {:?} is not a number: {}", m, e))?,
            None => Self::DEFAULT_MAX_BODY_BYTES,
        };
        if max_body_bytes == 0 {
            return Err(anyhow!("MAX_BODY_BYTES must be greater than zero"));
        }
        let log_file = get("LOG_FILE").map(|f| expand_path(&f));
        Ok(Self {
            base_dir,
            default_document,
            template_file,
            bind_address,
            port,
            query_binary,
            query_flags,
            query_timeout: Duration::from_millis(query_timeout_ms),
            worker_threads,
            max_body_bytes,
            log_file,
        })
    }

    /// Load from a KEY = value file.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let configfile = path.to_string_lossy().to_string();
        let vars = match Envie::load_with_path(&configfile) {
            Ok(vars) => vars,
            Err(e) => {
                //  Envie returns a string and we need an Error
                return Err(anyhow!(
                    "Unable to open configuration file {:?}: {:?}",
                    path,
                    e
                ));
            }
        };
        log::info!("Configuration from {:?}", path);
        Self::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    /// All defaults. No file.
    pub fn defaults() -> Result<Self, Error> {
        Self::from_lookup(|_| None)
    }
}

/// Tilde and environment expansion for paths from the config file.
fn expand_path(s: &str) -> PathBuf {
    match shellexpand::full(s) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(e) => {
            log::warn!("Unable to expand path {:?}: {}", s, e);
            PathBuf::from(s)
        }
    }
}
