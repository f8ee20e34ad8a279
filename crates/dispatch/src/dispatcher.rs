//! The outermost dispatch boundary.
//!
//! [`Dispatcher::dispatch`] takes the head of an inbound request, finds the first matching
//! route, runs its filter chain and resolves the outcome into either a response the transport
//! writes right away or [`Dispatched::Suspended`], when the response will reach the
//! transport's [`ResponseSink`] later.

use crate::body::ResponseBody;
use crate::completion::{ResponseSink, completion_for};
use crate::config::DispatchConfig;
use crate::context::Context;
use crate::error::{BoxError, RouterError};
use crate::reply::{Reply, responses};
use crate::router::Router;
use http::Response;
use http::request::Parts;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

/// Maps a failure raised by a filter or handler to the response sent instead.
pub trait ErrorHandler: Send + Sync {
    fn handle(&self, ctx: &Context, error: BoxError) -> Response<ResponseBody>;
}

/// Logs the cause and answers `500 Internal Server Error`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultErrorHandler;

impl ErrorHandler for DefaultErrorHandler {
    fn handle(&self, ctx: &Context, error: BoxError) -> Response<ResponseBody> {
        error!(method = %ctx.method(), path = ctx.path(), cause = %error, "request failed");
        responses::internal_error()
    }
}

/// What the transport should do once [`Dispatcher::dispatch`] returns.
#[derive(Debug)]
pub enum Dispatched {
    /// Write this response.
    Complete(Response<ResponseBody>),
    /// Keep the connection open; the response will be written through the sink.
    Suspended,
}

impl Dispatched {
    pub fn into_response(self) -> Option<Response<ResponseBody>> {
        match self {
            Dispatched::Complete(response) => Some(response),
            Dispatched::Suspended => None,
        }
    }
}

pub struct Dispatcher {
    router: Router,
    config: DispatchConfig,
    error_handler: Arc<dyn ErrorHandler>,
}

impl Dispatcher {
    /// Fails with [`RouterError::NotCompiled`] unless `router` has been compiled.
    pub fn new(router: Router, config: DispatchConfig) -> Result<Self, RouterError> {
        if !router.is_compiled() {
            return Err(RouterError::NotCompiled);
        }
        Ok(Self { router, config, error_handler: Arc::new(DefaultErrorHandler) })
    }

    pub fn with_error_handler(mut self, error_handler: impl ErrorHandler + 'static) -> Self {
        self.error_handler = Arc::new(error_handler);
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Routes and runs one request.
    ///
    /// `sink` is only used under native completion, for responses published after this call
    /// returned [`Dispatched::Suspended`].
    pub async fn dispatch(&self, parts: Parts, sink: Box<dyn ResponseSink>) -> Dispatched {
        let matched = match self.router.at(&parts.method, parts.uri.path()) {
            Ok(Some(matched)) => matched,
            Ok(None) => {
                debug!(method = %parts.method, path = parts.uri.path(), "no route matched");
                return Dispatched::Complete(responses::not_found());
            }
            Err(e) => {
                error!(cause = %e, "dispatching through an unusable router");
                return Dispatched::Complete(responses::internal_error());
            }
        };

        let route = matched.route();
        debug!(
            method = %parts.method,
            path = parts.uri.path(),
            controller = route.controller_name(),
            handler = route.handler_name(),
            "route matched"
        );

        let chain = route.chain();
        let completion = completion_for(self.config.completion(), sink);
        let mut ctx = Context::new(parts, matched.into_params(), completion);

        let reply = match chain.next(&mut ctx).await {
            Ok(reply) => reply,
            Err(e) => return Dispatched::Complete(self.error_handler.handle(&ctx, e)),
        };

        match reply {
            Reply::Ready(response) => Dispatched::Complete(response),
            Reply::Async => match ctx.controller_returned().await {
                Some(response) => Dispatched::Complete(response),
                None => Dispatched::Suspended,
            },
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher").field("router", &self.router).field("config", &self.config).finish_non_exhaustive()
    }
}
