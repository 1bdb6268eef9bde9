//! Standalone pull and push request handlers.

use crate::auth::CronKeyValidator;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use apisync_engine::{MappingRegistry, PullQueue, PushQueue};
use apisync_protocol::{Mapping, MappingId, RemoteId};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// An on-demand sync request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StandaloneRequest {
    /// Restrict to one mapping.
    pub mapping: Option<MappingId>,
    /// Shared secret.
    pub key: String,
    /// Sync a single remote record (pull only, requires a mapping).
    pub remote_id: Option<RemoteId>,
    /// Redirect here when done.
    pub destination: Option<String>,
}

impl StandaloneRequest {
    /// Creates a request carrying `key`.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// Restricts the request to one mapping.
    pub fn with_mapping(mut self, mapping: impl Into<MappingId>) -> Self {
        self.mapping = Some(mapping.into());
        self
    }

    /// Targets a single remote record.
    pub fn with_remote_id(mut self, remote_id: impl Into<RemoteId>) -> Self {
        self.remote_id = Some(remote_id.into());
        self
    }

    /// Redirects to `destination` on completion.
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }
}

/// Coarse endpoint response. Details only go to the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointResponse {
    /// 204.
    NoContent,
    /// 302 to the requested destination.
    Redirect(String),
    /// 403.
    Forbidden,
    /// 404.
    NotFound,
}

impl EndpointResponse {
    /// HTTP status code.
    pub fn status(&self) -> u16 {
        match self {
            EndpointResponse::NoContent => 204,
            EndpointResponse::Redirect(_) => 302,
            EndpointResponse::Forbidden => 403,
            EndpointResponse::NotFound => 404,
        }
    }
}

/// Shared state for the handlers.
pub struct HandlerContext {
    /// Endpoint configuration.
    pub config: ServerConfig,
    /// Configured mappings.
    pub mappings: Arc<MappingRegistry>,
    /// Pull runner.
    pub pull: Arc<PullQueue>,
    /// Push runner.
    pub push: Arc<PushQueue>,
    validator: CronKeyValidator,
}

impl HandlerContext {
    /// Creates a handler context.
    pub fn new(
        config: ServerConfig,
        mappings: Arc<MappingRegistry>,
        pull: Arc<PullQueue>,
        push: Arc<PushQueue>,
    ) -> Self {
        let validator = CronKeyValidator::new(&config.cron_key);
        Self {
            config,
            mappings,
            pull,
            push,
            validator,
        }
    }
}

#[derive(Clone, Copy)]
enum Scope {
    Pull,
    Push,
}

/// Handles standalone requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Populates and drains the pull queue.
    pub fn handle_pull(&self, request: &StandaloneRequest) -> EndpointResponse {
        self.respond(request, Scope::Pull, |mapping| {
            let queued = self
                .context
                .pull
                .populate_queue(mapping.map(|m| &m.id), request.remote_id.as_ref())?;
            let report = self.context.pull.process_queue()?;
            info!(queued, processed = report.count, elapsed_ms = report.elapsed.as_millis() as u64, "standalone pull finished");
            Ok(())
        })
    }

    /// Processes the push queue.
    pub fn handle_push(&self, request: &StandaloneRequest) -> EndpointResponse {
        self.respond(request, Scope::Push, |mapping| {
            let report = match mapping {
                Some(mapping) => self.context.push.process_mapping(&mapping.id)?,
                None => self.context.push.process_queues()?,
            };
            info!(done = report.done, failed = report.failed, "standalone push finished");
            Ok(())
        })
    }

    fn respond(
        &self,
        request: &StandaloneRequest,
        scope: Scope,
        run: impl FnOnce(Option<&Mapping>) -> ServerResult<()>,
    ) -> EndpointResponse {
        let mapping = match self.authorize(request, scope) {
            Ok(mapping) => mapping,
            Err(ServerError::MappingNotFound(id)) => {
                debug!(mapping = %id, "standalone request for unknown mapping");
                return EndpointResponse::NotFound;
            }
            Err(e) => {
                warn!(error = %e, "standalone request rejected");
                return EndpointResponse::Forbidden;
            }
        };

        if let Err(e) = run(mapping) {
            error!(error = %e, "standalone request failed");
        }

        match &request.destination {
            Some(destination) => EndpointResponse::Redirect(destination.clone()),
            None => EndpointResponse::NoContent,
        }
    }

    fn authorize(&self, request: &StandaloneRequest, scope: Scope) -> ServerResult<Option<&Mapping>> {
        if !self.context.validator.validate(&request.key) {
            return Err(ServerError::Forbidden("cron key mismatch".to_string()));
        }

        let Some(id) = &request.mapping else {
            let enabled = match scope {
                Scope::Pull => self.context.config.standalone_pull,
                Scope::Push => self.context.config.standalone_push,
            };
            return if enabled {
                Ok(None)
            } else {
                Err(ServerError::Forbidden("standalone processing disabled".to_string()))
            };
        };

        let mapping = self
            .context
            .mappings
            .get(id)
            .ok_or_else(|| ServerError::MappingNotFound(id.clone()))?;

        let enabled = match scope {
            Scope::Pull => mapping.pull_standalone,
            Scope::Push => mapping.push_standalone,
        };
        if !enabled {
            return Err(ServerError::Forbidden(format!(
                "standalone processing disabled for {id}"
            )));
        }
        Ok(Some(mapping))
    }
}
