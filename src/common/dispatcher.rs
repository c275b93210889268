//! dispatcher.rs -- the single entry point for a request.
//!
//! Method decides the route:
//!
//! ```text
//! GET, HEAD -> static file
//! POST      -> form fields -> validate -> query tool -> payload -> template
//! other     -> 405
//! ```
//!
//! Every path, including every failure, ends in exactly one `Reply`.
//! Nothing here knows about sockets. The serving loop turns a `Reply`
//! into bytes on the wire.
//!
//! ```text
//! License: LGPL.
//! ```
//
use crate::config::ServerConfig;
use crate::error::{EdictError, reason_phrase};
use crate::fieldextractor::extract_fields;
use crate::outputextractor::extract_payload;
use crate::pathresolver::resolve_path;
use crate::queryinvoker::{QueryInvoker, QueryRunner};
use crate::sanitize::escape_html;
use crate::staticfile::{content_type_for, open_static};
use crate::templaterenderer::TemplateRenderer;
use crate::validator::validate;
use std::fs::File;
use std::path::PathBuf;

/// One incoming request, independent of the HTTP library.
#[derive(Debug, Clone)]
pub struct ServerRequest {
    /// HTTP method, e.g. "GET"
    pub method: String,
    /// Raw request target, e.g. "/css/site.css?v=2"
    pub path: String,
    /// Content-Type header, if any
    pub content_type: Option<String>,
    /// Request body. Usually from a POST.
    pub body: Vec<u8>,
}

/// What goes back to the client.
#[derive(Debug)]
pub enum Reply {
    /// A regular file, already open. Streamed with status 200.
    File {
        file: File,
        content_type: &'static str,
    },
    /// An HTML page with a status.
    Page { status: u16, body: String },
}

impl Reply {
    pub fn status(&self) -> u16 {
        match self {
            Reply::File { .. } => 200,
            Reply::Page { status, .. } => *status,
        }
    }
}

/// Route chosen by method.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Route {
    StaticServe,
    FormPipeline,
    Unsupported,
}

impl Route {
    fn classify(method: &str) -> Self {
        match method.to_ascii_uppercase().as_str() {
            "GET" | "HEAD" => Route::StaticServe,
            "POST" => Route::FormPipeline,
            _ => Route::Unsupported,
        }
    }
}

/// Request dispatcher. Shared by all workers, read-only.
pub struct Dispatcher {
    /// Static document root
    base_dir: PathBuf,
    /// Served for "/"
    default_document: String,
    /// POST bodies larger than this are refused
    max_body_bytes: usize,
    /// Compiled reply template
    renderer: TemplateRenderer,
    /// Answers queries
    runner: Box<dyn QueryRunner>,
}

impl Dispatcher {
    /// Usual new. Queries go to the configured external tool.
    pub fn new(config: &ServerConfig, renderer: TemplateRenderer) -> Self {
        let invoker = QueryInvoker::new(
            config.query_binary.clone(),
            config.query_flags.clone(),
            config.query_timeout,
        );
        Self::with_runner(config, renderer, Box::new(invoker))
    }

    /// New, with some other way to answer queries.
    pub fn with_runner(
        config: &ServerConfig,
        renderer: TemplateRenderer,
        runner: Box<dyn QueryRunner>,
    ) -> Self {
        Self {
            base_dir: config.base_dir.clone(),
            default_document: config.default_document.clone(),
            max_body_bytes: config.max_body_bytes,
            renderer,
            runner,
        }
    }

    /// Largest POST body accepted.
    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Handle one request. Always produces a reply.
    pub fn dispatch(&self, request: &ServerRequest) -> Reply {
        log::info!("HTTP {} {}", request.method, request.path);
        let result = match Route::classify(&request.method) {
            Route::StaticServe => self.serve_static(&request.path),
            Route::FormPipeline => self.run_form_pipeline(request),
            Route::Unsupported => Err(EdictError::MethodNotAllowed(request.method.clone())),
        };
        match result {
            Ok(reply) => reply,
            Err(e) => Self::error_reply(&e),
        }
    }

    /// Resolve and open. The file is known to be openable before the 200 is committed.
    fn serve_static(&self, raw_path: &str) -> Result<Reply, EdictError> {
        let path = resolve_path(&self.base_dir, raw_path, &self.default_document);
        log::debug!("Static {} -> {:?}", raw_path, path);
        let file = open_static(&path)?;
        Ok(Reply::File {
            file,
            content_type: content_type_for(&path),
        })
    }

    /// The POST pipeline. Validation failures stop it before any query runs.
    fn run_form_pipeline(&self, request: &ServerRequest) -> Result<Reply, EdictError> {
        if request.body.len() > self.max_body_bytes {
            return Err(EdictError::PayloadTooLarge(self.max_body_bytes));
        }
        let fields = extract_fields(request.content_type.as_deref(), &request.body);
        log::debug!("Request fields: {:?}", fields);
        let sanitized = validate(&fields)?;
        let stdout = self.runner.query(&sanitized)?;
        let payload = extract_payload(&stdout)?;
        log::debug!("Reply payload: {:?}", payload);
        let body = self.renderer.render(&payload)?;
        Ok(Reply::Page { status: 200, body })
    }

    /// Turn an error into a page. Detail goes to the log, not the client.
    pub fn error_reply(e: &EdictError) -> Reply {
        if e.is_client_error() {
            log::warn!("Request refused: {}", e);
        } else {
            log::error!("Request failed: {}", e);
        }
        Reply::Page {
            status: e.status(),
            body: error_page(e.status(), &e.public_message()),
        }
    }
}

/// Minimal error page
pub fn error_page(status: u16, message: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{status} {reason}</title></head>\n<body><h1>{status} {reason}</h1>\n<p>{message}</p>\n</body></html>\n",
        status = status,
        reason = reason_phrase(status),
        message = escape_html(message)
    )
}
