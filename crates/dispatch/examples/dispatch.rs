//! Drives a dispatcher the way a transport would, without opening a socket.
//!
//! ```text
//! DISPATCH_COMPLETION_MODE=native cargo run --example dispatch
//! ```

use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use micro_dispatch::binder::{Arguments, Param, ParamType};
use micro_dispatch::{
    AsyncQueue, AsyncQueueFilter, BoxError, Context, Controller, DefaultErrorHandler, DispatchConfig, Dispatched,
    Dispatcher, HandlerMethod, LoggingFilter, Reply, Router, channel_sink, handler_fn,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

async fn show_user(_ctx: Context, args: Arguments) -> Result<Reply, BoxError> {
    let id = args.named::<i64>("id").unwrap_or_default();
    let tab = args.named::<String>("tab").unwrap_or_else(|| "profile".to_string());
    Ok(Reply::ok(format!("user {id}, tab {tab}")))
}

async fn slow_lookup(ctx: Context, _args: Arguments) -> Result<Reply, BoxError> {
    ctx.handle_async();
    let handle = ctx.async_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        if let Err(e) = handle.return_result_async(Reply::ok("looked up later").into_response().unwrap_or_default()) {
            warn!(cause = %e, "could not publish");
        }
    });
    Ok(Reply::Async)
}

async fn build_report(ctx: Context, _args: Arguments) -> Result<Reply, BoxError> {
    Ok(Reply::text(StatusCode::CREATED, format!("report built on worker: {}", ctx.runs_on_worker())))
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config = DispatchConfig::from_env().expect("invalid dispatch configuration");
    let queue = AsyncQueue::new(config.queue(), Arc::new(DefaultErrorHandler));
    queue.start();

    let users = Arc::new(
        Controller::new("users")
            .with(LoggingFilter)
            .handler(
                HandlerMethod::new("show", handler_fn(show_user))
                    .params([Param::path("id", ParamType::Integer), Param::query("tab", ParamType::String)]),
            )
            .handler(HandlerMethod::new("lookup", handler_fn(slow_lookup))),
    );
    let reports = Arc::new(
        Controller::new("reports")
            .with(LoggingFilter)
            .with(AsyncQueueFilter::new(queue.clone()).with_timeout(Duration::from_millis(500)))
            .handler(HandlerMethod::new("build", handler_fn(build_report))),
    );

    let mut router = Router::new();
    router.route(Method::GET, "/user/{id}").bind(&users, "show").expect("valid route");
    router.route(Method::GET, "/lookup").bind(&users, "lookup").expect("valid route");
    router.route(Method::POST, "/reports").bind(&reports, "build").expect("valid route");
    router.compile().expect("routes should compile");

    info!(url = ?router.reverse("users", "show", [("id", "7"), ("tab", "billing")]), "reverse routed");

    let dispatcher = Dispatcher::new(router, config).expect("router is compiled");

    for (method, uri) in [
        (Method::GET, "/user/7?tab=billing"),
        (Method::GET, "/user/seven"),
        (Method::GET, "/lookup"),
        (Method::POST, "/reports"),
        (Method::GET, "/missing"),
    ] {
        let (parts, ()) = Request::builder().method(method.clone()).uri(uri).body(()).expect("valid request").into_parts();
        let (sink, receiver) = channel_sink();

        let response = match dispatcher.dispatch(parts, Box::new(sink)).await {
            Dispatched::Complete(response) => response,
            Dispatched::Suspended => match receiver.await {
                Ok(response) => response,
                Err(_) => {
                    warn!(%method, uri, "suspended request was never completed");
                    continue;
                }
            },
        };

        let status = response.status();
        let body = response.into_body().collect().await.map(|body| body.to_bytes()).unwrap_or_default();
        info!(%method, uri, status = status.as_u16(), body = %String::from_utf8_lossy(&body), "dispatched");
    }
}
