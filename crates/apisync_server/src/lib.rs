//! # API-Sync Server
//!
//! On-demand pull and push endpoints.
//!
//! A scheduler or an administrator calls these with the shared cron key.
//! Pull requests populate and drain the pull queue; push requests run the
//! push queue. A finished request answers 204, or 302 when a destination
//! was given. A bad key or a disabled scope answers 403 and an unknown
//! mapping 404. Failures during processing are only logged.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod auth;
mod config;
mod error;
mod handler;

pub use auth::CronKeyValidator;
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{EndpointResponse, HandlerContext, RequestHandler, StandaloneRequest};
