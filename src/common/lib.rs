//!     Parts common to the edict web server and its tests
mod config;
mod dispatcher;
mod error;
mod fieldextractor;
mod logging;
mod outputextractor;
mod pathresolver;
mod queryinvoker;
mod sanitize;
mod server;
mod staticfile;
mod templaterenderer;
mod validator;

pub use config::ServerConfig;
pub use dispatcher::{Dispatcher, Reply, ServerRequest, error_page};
pub use error::EdictError;
pub use fieldextractor::{FormFields, extract_fields};
pub use logging::{init_logger, test_logger};
pub use outputextractor::{END_MARKER, START_MARKER, extract_payload};
pub use pathresolver::resolve_path;
pub use queryinvoker::{QueryCommand, QueryInvoker, QueryRunner};
pub use sanitize::{argument_safe, escape_html};
pub use server::{run_server, serve};
pub use staticfile::{content_type_for, open_static};
pub use templaterenderer::{PAYLOAD_PLACEHOLDER, TemplateRenderer};
pub use validator::{FieldName, ProtocolVersion, SanitizedFields, validate};
