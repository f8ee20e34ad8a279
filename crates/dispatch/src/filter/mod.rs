//! Decorator chains around handler invocation.
//!
//! Every compiled route owns one [`RouteTarget`]: the controller's filters followed by the
//! handler's filters, and a terminal step that binds the arguments and calls the handler.
//! A request walks it through a [`FilterChain`], a cursor into that list. Each filter gets
//! the chain positioned after itself and decides whether to continue:
//!
//! ```
//! use async_trait::async_trait;
//! use micro_dispatch::{BoxError, Context, Filter, FilterChain, Reply};
//! use http::StatusCode;
//!
//! struct RequireToken;
//!
//! #[async_trait]
//! impl Filter for RequireToken {
//!     async fn filter(&self, chain: FilterChain, ctx: &mut Context) -> Result<Reply, BoxError> {
//!         if ctx.header("x-token").is_none() {
//!             // the rest of the chain and the handler never run
//!             return Ok(Reply::text(StatusCode::UNAUTHORIZED, "missing token"));
//!         }
//!         chain.next(ctx).await
//!     }
//! }
//! ```
//!
//! A filter only runs once per request: when the handler fails the error unwinds through the
//! filters already entered and nothing is retried.

mod logging;

pub use logging::LoggingFilter;

use crate::binder::{ArgumentBinder, ExtractorRegistry};
use crate::context::Context;
use crate::error::{BoxError, RouterError};
use crate::handler::{Controller, Handler, HandlerMethod};
use crate::reply::Reply;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A link of the decorator chain.
///
/// A filter may call [`FilterChain::next`] and transform its reply, call it only for a side
/// effect, or return its own reply without calling it, which skips every later filter and
/// the handler.
#[async_trait]
pub trait Filter: Send + Sync {
    async fn filter(&self, chain: FilterChain, ctx: &mut Context) -> Result<Reply, BoxError>;
}

#[async_trait]
impl<T: Filter + ?Sized> Filter for Arc<T> {
    async fn filter(&self, chain: FilterChain, ctx: &mut Context) -> Result<Reply, BoxError> {
        (**self).filter(chain, ctx).await
    }
}

/// The ordered filters of one route plus its bound handler.
pub struct RouteTarget {
    controller: String,
    handler_name: String,
    filters: Vec<Arc<dyn Filter>>,
    binder: ArgumentBinder,
    handler: Arc<dyn Handler>,
}

impl RouteTarget {
    /// Collects the controller's filters then the handler's, and resolves the handler's
    /// binding markers against `extractors`.
    pub fn build(controller: &Controller, method: &HandlerMethod, extractors: &ExtractorRegistry) -> Result<Self, RouterError> {
        let binder = extractors.resolve(method.declared_params(), controller.name(), method.name())?;
        let filters = controller.filters().iter().chain(method.filters()).cloned().collect();

        Ok(Self {
            controller: controller.name().to_string(),
            handler_name: method.name().to_string(),
            filters,
            binder,
            handler: Arc::clone(method.handler()),
        })
    }

    pub fn binder(&self) -> &ArgumentBinder {
        &self.binder
    }

    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }

    /// The terminal link: binds arguments, calls the handler and, when the handler deferred
    /// its result, enters the completion strategy's suspend path.
    async fn invoke(&self, ctx: &mut Context) -> Result<Reply, BoxError> {
        let args = self.binder.bind(ctx);
        if ctx.has_violations() && !self.binder.accepts_violations() {
            debug!(
                controller = %self.controller,
                handler = %self.handler_name,
                violations = ctx.violations().len(),
                "rejecting request with invalid arguments"
            );
            return Ok(Reply::validation_failure(ctx.violations()));
        }

        let reply = self.handler.invoke(ctx, args).await.inspect_err(|e| {
            debug!(controller = %self.controller, handler = %self.handler_name, cause = %e, "handler failed");
        })?;

        // on a queue worker the handler publishes for itself, nobody waits here
        if !reply.is_async() || ctx.runs_on_worker() {
            return Ok(reply);
        }

        Ok(match ctx.controller_returned().await {
            Some(response) => Reply::Ready(response),
            None => Reply::Async,
        })
    }
}

impl fmt::Debug for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTarget")
            .field("controller", &self.controller)
            .field("handler", &self.handler_name)
            .field("filters", &self.filters.len())
            .field("binder", &self.binder)
            .finish()
    }
}

/// A cursor into a [`RouteTarget`], consumed by every step.
#[derive(Clone)]
pub struct FilterChain {
    target: Arc<RouteTarget>,
    position: usize,
}

impl FilterChain {
    pub fn new(target: Arc<RouteTarget>) -> Self {
        Self { target, position: 0 }
    }

    /// Runs the rest of the chain: the next filter, or the handler once no filter is left.
    pub async fn next(mut self, ctx: &mut Context) -> Result<Reply, BoxError> {
        match self.target.filters.get(self.position).cloned() {
            Some(filter) => {
                self.position += 1;
                filter.filter(self, ctx).await
            }
            None => self.target.invoke(ctx).await,
        }
    }

    /// Number of filters still ahead of the handler.
    pub fn remaining(&self) -> usize {
        self.target.filters.len().saturating_sub(self.position)
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterChain")
            .field("controller", &self.target.controller)
            .field("handler", &self.target.handler_name)
            .field("position", &self.position)
            .field("remaining", &self.remaining())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{Filter, FilterChain, RouteTarget};
    use crate::binder::{ExtractorRegistry, Param, ParamType};
    use crate::completion::{NativeCompletion, channel_sink};
    use crate::context::Context;
    use crate::error::BoxError;
    use crate::handler::{Controller, HandlerMethod, handler_fn};
    use crate::reply::{Reply, responses};
    use crate::router::PathParams;
    use async_trait::async_trait;
    use http::{HeaderValue, Request, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Journal(Arc<Mutex<Vec<String>>>);

    impl Journal {
        fn push(&self, entry: impl Into<String>) {
            self.0.lock().unwrap().push(entry.into());
        }

        fn entries(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    struct Recording {
        name: &'static str,
        journal: Journal,
    }

    #[async_trait]
    impl Filter for Recording {
        async fn filter(&self, chain: FilterChain, ctx: &mut Context) -> Result<Reply, BoxError> {
            self.journal.push(format!("{}:before", self.name));
            let reply = chain.next(ctx).await;
            self.journal.push(format!("{}:after", self.name));
            reply
        }
    }

    struct Deny;

    #[async_trait]
    impl Filter for Deny {
        async fn filter(&self, _chain: FilterChain, _ctx: &mut Context) -> Result<Reply, BoxError> {
            Ok(Reply::text(StatusCode::FORBIDDEN, "denied"))
        }
    }

    struct Stamp;

    #[async_trait]
    impl Filter for Stamp {
        async fn filter(&self, chain: FilterChain, ctx: &mut Context) -> Result<Reply, BoxError> {
            match chain.next(ctx).await? {
                Reply::Ready(mut response) => {
                    response.headers_mut().insert("x-stamped", HeaderValue::from_static("yes"));
                    Ok(Reply::Ready(response))
                }
                Reply::Async => Ok(Reply::Async),
            }
        }
    }

    fn counting_handler(name: &'static str, calls: &Arc<AtomicUsize>) -> HandlerMethod {
        let calls = Arc::clone(calls);
        HandlerMethod::new(
            name,
            handler_fn(move |_ctx, _args| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(Reply::ok("handled")) }
            }),
        )
    }

    fn chain(controller: &Controller, handler: &str) -> FilterChain {
        let method = controller.handler_method(handler).unwrap();
        let target = RouteTarget::build(controller, method, &ExtractorRegistry::default()).unwrap();
        FilterChain::new(Arc::new(target))
    }

    fn context(path_params: &[(&str, &str)]) -> Context {
        let (parts, ()) = Request::get("/x").body(()).unwrap().into_parts();
        Context::standalone(parts, PathParams::from_pairs(path_params.iter().map(|(k, v)| (k.to_string(), v.to_string()))))
    }

    #[tokio::test]
    async fn controller_filters_run_before_handler_filters() {
        let journal = Journal::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let controller = Controller::new("c")
            .with(Recording { name: "outer", journal: journal.clone() })
            .handler(counting_handler("h", &calls).with(Recording { name: "inner", journal: journal.clone() }));

        let chain = chain(&controller, "h");
        assert_eq!(chain.remaining(), 2);
        let reply = chain.next(&mut context(&[])).await.unwrap();

        assert_eq!(reply.into_response().unwrap().status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(journal.entries(), ["outer:before", "inner:before", "inner:after", "outer:after"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_the_rest() {
        let journal = Journal::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let controller = Controller::new("c")
            .with(Recording { name: "outer", journal: journal.clone() })
            .with(Deny)
            .handler(counting_handler("h", &calls).with(Recording { name: "inner", journal: journal.clone() }));

        let reply = chain(&controller, "h").next(&mut context(&[])).await.unwrap();

        assert_eq!(reply.into_response().unwrap().status(), StatusCode::FORBIDDEN);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(journal.entries(), ["outer:before", "outer:after"]);
    }

    #[tokio::test]
    async fn filters_transform_the_reply() {
        let calls = Arc::new(AtomicUsize::new(0));
        let controller = Controller::new("c").with(Stamp).handler(counting_handler("h", &calls));

        let response = chain(&controller, "h").next(&mut context(&[])).await.unwrap().into_response().unwrap();
        assert_eq!(response.headers()["x-stamped"], "yes");
    }

    #[tokio::test]
    async fn handler_errors_unwind_without_reentry() {
        let journal = Journal::default();
        let controller = Controller::new("c")
            .with(Recording { name: "outer", journal: journal.clone() })
            .handler(HandlerMethod::new("h", handler_fn(|_ctx, _args| async { Err::<Reply, BoxError>("boom".into()) })));

        let err = chain(&controller, "h").next(&mut context(&[])).await.unwrap_err();

        assert_eq!(err.to_string(), "boom");
        assert_eq!(journal.entries(), ["outer:before", "outer:after"]);
    }

    #[tokio::test]
    async fn invalid_arguments_yield_a_validation_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let controller =
            Controller::new("c").handler(counting_handler("h", &calls).param(Param::path("id", ParamType::Integer)));

        let reply = chain(&controller, "h").next(&mut context(&[("id", "abc")])).await.unwrap();

        assert_eq!(reply.into_response().unwrap().status(), StatusCode::BAD_REQUEST);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn validation_param_lets_the_handler_decide() {
        let calls = Arc::new(AtomicUsize::new(0));
        let controller = Controller::new("c").handler(
            counting_handler("h", &calls).params([Param::path("id", ParamType::Integer), Param::Validation]),
        );

        let reply = chain(&controller, "h").next(&mut context(&[("id", "abc")])).await.unwrap();

        assert_eq!(reply.into_response().unwrap().status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    fn deferring_handler() -> HandlerMethod {
        HandlerMethod::new(
            "deferred",
            handler_fn(|ctx: Context, _args| async move {
                ctx.handle_async();
                let handle = ctx.async_handle();
                tokio::spawn(async move { handle.return_result_async(responses::not_found()) });
                Ok(Reply::Async)
            }),
        )
    }

    #[tokio::test]
    async fn blocking_completion_resolves_inside_the_chain() {
        let controller = Controller::new("c").with(Stamp).handler(deferring_handler());

        let response = chain(&controller, "deferred").next(&mut context(&[])).await.unwrap().into_response().unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["x-stamped"], "yes");
    }

    #[tokio::test]
    async fn native_completion_returns_async_and_writes_to_the_sink() {
        let controller = Controller::new("c").handler(deferring_handler());
        let (sink, receiver) = channel_sink();
        let (parts, ()) = Request::get("/x").body(()).unwrap().into_parts();
        let mut ctx = Context::new(parts, PathParams::empty(), Arc::new(NativeCompletion::new(Box::new(sink))));

        let reply = chain(&controller, "deferred").next(&mut ctx).await.unwrap();

        assert!(reply.is_async());
        assert_eq!(receiver.await.unwrap().status(), StatusCode::NOT_FOUND);
    }
}
