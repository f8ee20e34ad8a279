use crate::binder::{Arguments, Param};
use crate::context::Context;
use crate::error::BoxError;
use crate::filter::Filter;
use crate::reply::Reply;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// The terminal of a filter chain: the code a route ultimately runs.
///
/// Returning [`Reply::Async`] defers the result; the handler must then call
/// [`Context::handle_async`] and later publish through [`Context::async_handle`].
#[async_trait]
pub trait Handler: Send + Sync {
    async fn invoke(&self, ctx: &mut Context, args: Arguments) -> Result<Reply, BoxError>;
}

/// A handler backed by a closure taking an owned context and the bound arguments.
pub struct FnHandler<F> {
    f: F,
}

pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Context, Arguments) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Reply, BoxError>> + Send + 'static,
{
    FnHandler { f }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnHandler")
    }
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Context, Arguments) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Reply, BoxError>> + Send + 'static,
{
    async fn invoke(&self, ctx: &mut Context, args: Arguments) -> Result<Reply, BoxError> {
        (self.f)(ctx.clone(), args).await
    }
}

/// A named handler together with its declared parameters and handler-level filters.
#[derive(Clone)]
pub struct HandlerMethod {
    name: String,
    params: Vec<Param>,
    filters: Vec<Arc<dyn Filter>>,
    handler: Arc<dyn Handler>,
}

impl HandlerMethod {
    pub fn new(name: impl Into<String>, handler: impl Handler + 'static) -> Self {
        Self { name: name.into(), params: Vec::new(), filters: Vec::new(), handler: Arc::new(handler) }
    }

    /// Declares the next handler parameter.
    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    pub fn params(mut self, params: impl IntoIterator<Item = Param>) -> Self {
        self.params.extend(params);
        self
    }

    /// Adds a filter that runs after the controller's filters.
    pub fn with<F: Filter + 'static>(mut self, filter: F) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn with_shared(mut self, filter: Arc<dyn Filter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declared_params(&self) -> &[Param] {
        &self.params
    }

    pub(crate) fn filters(&self) -> &[Arc<dyn Filter>] {
        &self.filters
    }

    pub(crate) fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }
}

impl fmt::Debug for HandlerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerMethod")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("filters", &self.filters.len())
            .finish_non_exhaustive()
    }
}

/// A named group of handlers sharing controller-level filters.
///
/// Routes and reverse routing refer to handlers as `(controller name, handler name)`.
pub struct Controller {
    name: String,
    filters: Vec<Arc<dyn Filter>>,
    methods: Vec<HandlerMethod>,
}

impl Controller {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), filters: Vec::new(), methods: Vec::new() }
    }

    /// Adds a filter wrapping every handler of this controller.
    pub fn with<F: Filter + 'static>(mut self, filter: F) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn with_shared(mut self, filter: Arc<dyn Filter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Adds a handler. Names should be unique, lookups return the first match.
    pub fn handler(mut self, method: HandlerMethod) -> Self {
        self.methods.push(method);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handler_method(&self, name: &str) -> Option<&HandlerMethod> {
        self.methods.iter().find(|method| method.name == name)
    }

    pub(crate) fn filters(&self) -> &[Arc<dyn Filter>] {
        &self.filters
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("name", &self.name)
            .field("filters", &self.filters.len())
            .field("methods", &self.methods)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{Controller, Handler, HandlerMethod, handler_fn};
    use crate::binder::{Arguments, Param, ParamType};
    use crate::context::Context;
    use crate::reply::Reply;
    use crate::router::PathParams;
    use http::{Request, StatusCode};

    fn assert_is_handler<T: Handler>(_handler: &T) {
        // no op
    }

    #[test]
    fn closure_is_handler() {
        let handler = handler_fn(|_ctx, _args| async { Ok(Reply::ok("hi")) });
        assert_is_handler(&handler);
    }

    #[tokio::test]
    async fn fn_handler_receives_arguments() {
        let handler = handler_fn(|ctx: Context, args: Arguments| async move {
            let id = args.value::<i64>(0).unwrap_or_default();
            Ok(Reply::ok(format!("{} {id}", ctx.path())))
        });

        let (parts, ()) = Request::get("/user/3").body(()).unwrap().into_parts();
        let mut ctx = Context::standalone(parts, PathParams::empty());
        let args = crate::binder::ExtractorRegistry::default()
            .resolve(&[Param::path("id", ParamType::Integer)], "c", "h")
            .unwrap()
            .bind(&mut ctx);

        let reply = handler.invoke(&mut ctx, args).await.unwrap();
        let response = reply.into_response().unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn controller_lookup() {
        let controller = Controller::new("users")
            .handler(HandlerMethod::new("show", handler_fn(|_ctx, _args| async { Ok(Reply::ok("show")) })).param(Param::Context))
            .handler(HandlerMethod::new("list", handler_fn(|_ctx, _args| async { Ok(Reply::ok("list")) })));

        assert_eq!(controller.name(), "users");
        assert_eq!(controller.handler_method("show").unwrap().declared_params(), &[Param::Context]);
        assert!(controller.handler_method("edit").is_none());
    }
}
