//! Request dispatch: ordered routing with reverse routing, argument binding, filter chains
//! and asynchronous completion with a load-shedding worker queue.
//!
//! Transport code hands a request head to a [`Dispatcher`] and writes back whatever it
//! returns. Everything in between, from matching the route to waiting for a deferred result,
//! happens here.

mod body;
mod config;
mod context;
mod dispatcher;
mod error;
mod handler;
mod reply;

pub mod binder;
pub mod completion;
pub mod filter;
pub mod router;

pub use body::ResponseBody;
pub use completion::queue::{AsyncQueue, AsyncQueueFilter, AsyncTask};
pub use completion::{AsyncHandle, CompletionMode, ResponseSink, channel_sink};
pub use config::{DispatchConfig, QueueConfig};
pub use context::Context;
pub use dispatcher::{DefaultErrorHandler, Dispatched, Dispatcher, ErrorHandler};
pub use error::{BoxError, CompletionError, ConfigError, RouterError};
pub use filter::{Filter, FilterChain, LoggingFilter};
pub use handler::{Controller, FnHandler, Handler, HandlerMethod, handler_fn};
pub use reply::{Reply, responses};
pub use router::{PathParams, Router};
