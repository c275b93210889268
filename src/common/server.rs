//! server.rs -- the HTTP serving loop.
//!
//! A tiny_http server shared by a fixed number of worker threads.
//! Each worker takes a request, reads the body (capped), dispatches,
//! and responds. `Request::respond` consumes the request, so each
//! request gets exactly one response.
//!
//! ```text
//! License: LGPL.
//! ```
//
use crate::config::ServerConfig;
use crate::dispatcher::{Dispatcher, Reply, ServerRequest};
use crate::error::EdictError;
use anyhow::{Error, anyhow};
use std::io::Read;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread;
use tiny_http::{Header, Request, Response, Server};

/// Bind and serve forever.
pub fn run_server(config: &ServerConfig, dispatcher: Dispatcher) -> Result<(), Error> {
    let server = Server::http((config.bind_address.as_str(), config.port)).map_err(|e| {
        anyhow!(
            "Unable to listen on {}:{}: {}",
            config.bind_address,
            config.port,
            e
        )
    })?;
    log::info!(
        "Web server listening on {}:{} with {} workers",
        config.bind_address,
        config.port,
        config.worker_threads
    );
    serve(Arc::new(server), Arc::new(dispatcher), config.worker_threads)
}

/// Run worker threads on an already bound server. Returns when the server shuts down.
pub fn serve(
    server: Arc<Server>,
    dispatcher: Arc<Dispatcher>,
    worker_threads: usize,
) -> Result<(), Error> {
    let mut workers = Vec::with_capacity(worker_threads);
    for n in 0..worker_threads.max(1) {
        let server = server.clone();
        let dispatcher = dispatcher.clone();
        let worker = thread::Builder::new()
            .name(format!("edict-worker-{}", n))
            .spawn(move || {
                for request in server.incoming_requests() {
                    handle_request(request, &dispatcher);
                }
                log::debug!("Worker {} done", n);
            })?;
        workers.push(worker);
    }
    for worker in workers {
        if worker.join().is_err() {
            log::error!("Worker thread panicked");
        }
    }
    Ok(())
}

/// Read, dispatch, respond. Never leaves the request unanswered.
fn handle_request(mut request: Request, dispatcher: &Dispatcher) {
    let content_type = request
        .headers()
        .iter()
        .find(|h| h.field.equiv("Content-Type"))
        .map(|h| h.value.as_str().to_string());
    //  One byte past the limit, so the dispatcher can tell the body was too big.
    let limit = dispatcher.max_body_bytes() as u64 + 1;
    let mut body = Vec::new();
    let reply = match request.as_reader().take(limit).read_to_end(&mut body) {
        Ok(_) => {
            let server_request = ServerRequest {
                method: request.method().to_string(),
                path: request.url().to_string(),
                content_type,
                body,
            };
            match catch_unwind(AssertUnwindSafe(|| dispatcher.dispatch(&server_request))) {
                Ok(reply) => reply,
                Err(_) => Dispatcher::error_reply(&EdictError::Internal(anyhow!(
                    "Panic while handling {} {}",
                    server_request.method,
                    server_request.path
                ))),
            }
        }
        Err(e) => Dispatcher::error_reply(&EdictError::Internal(anyhow!(
            "Reading request body: {}",
            e
        ))),
    };
    respond(request, reply);
}

/// Send the reply. A client that went away just gets logged.
fn respond(request: Request, reply: Reply) {
    let result = match reply {
        Reply::File { file, content_type } => {
            let mut response = Response::from_file(file);
            if let Some(header) = content_type_header(content_type) {
                response.add_header(header);
            }
            request.respond(response)
        }
        Reply::Page { status, body } => {
            let mut response = Response::from_string(body).with_status_code(status);
            if let Some(header) = content_type_header("text/html; charset=utf-8") {
                response.add_header(header);
            }
            request.respond(response)
        }
    };
    if let Err(e) = result {
        log::warn!("Failed to write response to client: {:?}", e);
    }
}

fn content_type_header(value: &str) -> Option<Header> {
    match Header::from_bytes(&b"Content-Type"[..], value.as_bytes()) {
        Ok(header) => Some(header),
        Err(_) => {
            log::error!("Bad Content-Type header value {:?}", value);
            None
        }
    }
}
