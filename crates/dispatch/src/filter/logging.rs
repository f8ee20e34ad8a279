use crate::context::Context;
use crate::error::BoxError;
use crate::filter::{Filter, FilterChain};
use crate::reply::Reply;
use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{info, warn};

/// Logs every request passing through it with the outcome of the rest of the chain.
///
/// The reply is passed through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingFilter;

#[async_trait]
impl Filter for LoggingFilter {
    async fn filter(&self, chain: FilterChain, ctx: &mut Context) -> Result<Reply, BoxError> {
        let start = Instant::now();
        let result = chain.next(ctx).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(Reply::Ready(response)) => {
                info!(method = %ctx.method(), path = ctx.path(), status = response.status().as_u16(), elapsed_ms, "request handled")
            }
            Ok(Reply::Async) => info!(method = %ctx.method(), path = ctx.path(), elapsed_ms, "request continues asynchronously"),
            Err(e) => warn!(method = %ctx.method(), path = ctx.path(), cause = %e, elapsed_ms, "request failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::LoggingFilter;
    use crate::binder::ExtractorRegistry;
    use crate::context::Context;
    use crate::filter::{FilterChain, RouteTarget};
    use crate::handler::{Controller, HandlerMethod, handler_fn};
    use crate::reply::Reply;
    use crate::router::PathParams;
    use http::{Request, StatusCode};
    use std::sync::Arc;

    #[tokio::test]
    async fn passes_the_reply_through() {
        let controller = Controller::new("c")
            .with(LoggingFilter)
            .handler(HandlerMethod::new("h", handler_fn(|_ctx, _args| async { Ok(Reply::text(StatusCode::ACCEPTED, "ok")) })));
        let method = controller.handler_method("h").unwrap();
        let target = RouteTarget::build(&controller, method, &ExtractorRegistry::default()).unwrap();

        let (parts, ()) = Request::get("/logged").body(()).unwrap().into_parts();
        let mut ctx = Context::standalone(parts, PathParams::empty());
        let reply = FilterChain::new(Arc::new(target)).next(&mut ctx).await.unwrap();

        assert_eq!(reply.into_response().unwrap().status(), StatusCode::ACCEPTED);
    }
}
