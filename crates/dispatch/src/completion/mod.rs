//! Delivery of results that a handler produces asynchronously.
//!
//! A handler that cannot answer right away calls [`Context::handle_async`], returns
//! [`Reply::Async`] and later publishes its response through an [`AsyncHandle`]. How the
//! waiting side behaves is decided once, at startup, by the [`CompletionMode`]:
//!
//! - [`CompletionMode::Blocking`]: the request task waits in
//!   [`Context::controller_returned`] until the response is published, then returns it
//!   like any synchronous result.
//! - [`CompletionMode::Native`]: the request task returns immediately and the response is
//!   written to the transport's [`ResponseSink`] by whoever publishes it.
//!
//! In both modes a response is published exactly once. A second publish is reported as
//! [`CompletionError::AlreadyPublished`].
//!
//! [`Context::handle_async`]: crate::Context::handle_async
//! [`Context::controller_returned`]: crate::Context::controller_returned
//! [`Reply::Async`]: crate::Reply::Async

mod blocking;
mod native;
mod slot;

pub mod queue;

pub use blocking::BlockingCompletion;
pub use native::{ChannelSink, NativeCompletion, ResponseSink, channel_sink};
pub use slot::CompletionSlot;

#[cfg(test)]
pub use native::MockResponseSink;

use crate::body::ResponseBody;
use crate::error::{CompletionError, ConfigError};
use async_trait::async_trait;
use http::Response;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Selects how asynchronously produced results reach the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionMode {
    /// The transport cannot park a connection without a task holding it.
    #[default]
    Blocking,
    /// The transport can hold a connection open and be completed out of band.
    Native,
}

impl FromStr for CompletionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blocking" => Ok(CompletionMode::Blocking),
            "native" => Ok(CompletionMode::Native),
            _ => Err(ConfigError::UnknownCompletionMode(s.to_string())),
        }
    }
}

impl fmt::Display for CompletionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionMode::Blocking => f.write_str("blocking"),
            CompletionMode::Native => f.write_str("native"),
        }
    }
}

/// The per-request hooks behind [`CompletionMode`].
#[async_trait]
pub trait CompletionStrategy: Send + Sync + fmt::Debug {
    /// Called by a handler that is about to return [`Reply::Async`](crate::Reply::Async).
    fn handle_async(&self);

    /// Called once the chain returned without a concrete result.
    ///
    /// Returns the published response, or `None` when it will be delivered out of band.
    async fn controller_returned(&self) -> Option<Response<ResponseBody>>;

    /// Publishes the result of an async handler. Must be called exactly once.
    fn return_result_async(&self, response: Response<ResponseBody>) -> Result<(), CompletionError>;
}

/// Builds the strategy for one request.
pub fn completion_for(mode: CompletionMode, sink: Box<dyn ResponseSink>) -> Arc<dyn CompletionStrategy> {
    match mode {
        CompletionMode::Blocking => Arc::new(BlockingCompletion::new()),
        CompletionMode::Native => Arc::new(NativeCompletion::new(sink)),
    }
}

/// A cloneable handle an async handler moves to the thread that finishes its work.
#[derive(Debug, Clone)]
pub struct AsyncHandle {
    strategy: Arc<dyn CompletionStrategy>,
}

impl AsyncHandle {
    pub(crate) fn new(strategy: Arc<dyn CompletionStrategy>) -> Self {
        Self { strategy }
    }

    /// Publishes the deferred response.
    pub fn return_result_async(&self, response: Response<ResponseBody>) -> Result<(), CompletionError> {
        self.strategy.return_result_async(response)
    }
}
