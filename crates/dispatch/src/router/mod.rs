//! The route table.
//!
//! A [`Router`] starts open: routes are registered in order, each binding an HTTP method and
//! a URI template to a handler of a [`Controller`]. [`Router::compile`] turns the registered
//! routes into an immutable table exactly once; only then can it answer [`Router::at`] and
//! [`Router::reverse`].
//!
//! Lookup is first-match in registration order. There is no "most specific wins" rule, so
//! narrow patterns must be registered before broad ones:
//!
//! ```
//! use http::Method;
//! use micro_dispatch::{Controller, HandlerMethod, Reply, Router, handler_fn};
//! use std::sync::Arc;
//!
//! let assets = Arc::new(
//!     Controller::new("assets")
//!         .handler(HandlerMethod::new("favicon", handler_fn(|_ctx, _args| async { Ok(Reply::ok("icon")) })))
//!         .handler(HandlerMethod::new("serve", handler_fn(|_ctx, _args| async { Ok(Reply::ok("file")) }))),
//! );
//!
//! let mut router = Router::new();
//! router.route(Method::GET, "/assets/favicon.ico").bind(&assets, "favicon").unwrap();
//! router.route(Method::GET, "/assets/{file: .*}").bind(&assets, "serve").unwrap();
//! router.compile().unwrap();
//!
//! let matched = router.at(&Method::GET, "/assets/favicon.ico").unwrap().unwrap();
//! assert_eq!(matched.route().handler_name(), "favicon");
//! ```

mod params;
mod pattern;

pub use params::PathParams;
pub use pattern::RoutePattern;

use crate::binder::ExtractorRegistry;
use crate::error::RouterError;
use crate::filter::{FilterChain, RouteTarget};
use crate::handler::Controller;
use http::Method;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// A route as declared by configuration code, before compilation.
#[derive(Debug, Clone)]
pub struct RouteSpec {
    method: Method,
    pattern: String,
    controller: Arc<Controller>,
    handler_name: String,
    registration_index: usize,
}

impl RouteSpec {
    pub fn new(method: Method, pattern: impl Into<String>, controller: &Arc<Controller>, handler_name: impl Into<String>) -> Self {
        Self {
            method,
            pattern: pattern.into(),
            controller: Arc::clone(controller),
            handler_name: handler_name.into(),
            registration_index: 0,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn registration_index(&self) -> usize {
        self.registration_index
    }
}

/// The matchable, reversible form of a route.
#[derive(Debug)]
pub struct CompiledRoute {
    method: Method,
    pattern: RoutePattern,
    controller: Arc<Controller>,
    handler_name: String,
    registration_index: usize,
    target: Arc<RouteTarget>,
}

impl CompiledRoute {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn pattern(&self) -> &RoutePattern {
        &self.pattern
    }

    pub fn controller_name(&self) -> &str {
        self.controller.name()
    }

    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    pub fn registration_index(&self) -> usize {
        self.registration_index
    }

    /// A fresh filter chain positioned before the first filter of this route.
    pub fn chain(&self) -> FilterChain {
        FilterChain::new(Arc::clone(&self.target))
    }

    fn is_for(&self, controller: &str, handler: &str) -> bool {
        self.controller.name() == controller && self.handler_name == handler
    }
}

/// Result of a successful lookup: the route and the path parameters it captured.
#[derive(Debug)]
pub struct RouteMatch<'router> {
    route: &'router CompiledRoute,
    params: PathParams,
}

impl<'router> RouteMatch<'router> {
    pub fn route(&self) -> &'router CompiledRoute {
        self.route
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    pub fn into_params(self) -> PathParams {
        self.params
    }
}

enum RouterState {
    Open(Vec<RouteSpec>),
    Compiled(Vec<CompiledRoute>),
}

/// Main router structure that maps `(method, path)` to routes and routes back to URLs.
pub struct Router {
    state: RouterState,
    extractors: ExtractorRegistry,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            RouterState::Open(specs) => f.debug_struct("Router").field("open", specs).finish(),
            RouterState::Compiled(routes) => f.debug_struct("Router").field("compiled", routes).finish(),
        }
    }
}

impl Router {
    /// Creates an open router using the default extractors for path, query and header markers.
    pub fn new() -> Self {
        Self::with_extractors(ExtractorRegistry::default())
    }

    pub fn with_extractors(extractors: ExtractorRegistry) -> Self {
        Self { state: RouterState::Open(Vec::new()), extractors }
    }

    /// Starts a route declaration: `router.route(Method::GET, "/x").bind(&controller, "handler")`.
    pub fn route(&mut self, method: Method, pattern: impl Into<String>) -> RouteDeclaration<'_> {
        RouteDeclaration { router: self, method, pattern: pattern.into() }
    }

    /// Appends a route. Fails once the router has been compiled, or when the controller has no
    /// handler with the given name.
    pub fn register(&mut self, mut spec: RouteSpec) -> Result<(), RouterError> {
        let RouterState::Open(specs) = &mut self.state else {
            return Err(RouterError::AlreadyCompiled);
        };

        if spec.controller.handler_method(&spec.handler_name).is_none() {
            return Err(RouterError::UnknownHandler {
                controller: spec.controller.name().to_string(),
                handler: spec.handler_name,
            });
        }

        spec.registration_index = specs.len();
        specs.push(spec);
        Ok(())
    }

    /// Compiles every registered route in registration order and freezes the table.
    pub fn compile(&mut self) -> Result<(), RouterError> {
        let RouterState::Open(specs) = &self.state else {
            return Err(RouterError::AlreadyCompiled);
        };

        let routes = specs.iter().map(|spec| self.compile_route(spec)).collect::<Result<Vec<_>, _>>()?;
        self.state = RouterState::Compiled(routes);
        Ok(())
    }

    fn compile_route(&self, spec: &RouteSpec) -> Result<CompiledRoute, RouterError> {
        let pattern = RoutePattern::compile(&spec.pattern)?;
        let handler = spec.controller.handler_method(&spec.handler_name).ok_or_else(|| RouterError::UnknownHandler {
            controller: spec.controller.name().to_string(),
            handler: spec.handler_name.clone(),
        })?;

        let target = RouteTarget::build(&spec.controller, handler, &self.extractors)?;
        if target.binder().unmarked_count() > 0 {
            warn!(
                controller = spec.controller.name(),
                handler = %spec.handler_name,
                unmarked = target.binder().unmarked_count(),
                "handler declares parameters without a binding marker, they will always be absent"
            );
        }

        info!(
            method = %spec.method,
            pattern = %spec.pattern,
            controller = spec.controller.name(),
            handler = %spec.handler_name,
            filters = target.filter_count(),
            "compiled route"
        );

        Ok(CompiledRoute {
            method: spec.method.clone(),
            pattern,
            controller: Arc::clone(&spec.controller),
            handler_name: spec.handler_name.clone(),
            registration_index: spec.registration_index,
            target: Arc::new(target),
        })
    }

    pub fn is_compiled(&self) -> bool {
        matches!(self.state, RouterState::Compiled(_))
    }

    /// The compiled routes in registration order; empty before compilation.
    pub fn routes(&self) -> &[CompiledRoute] {
        match &self.state {
            RouterState::Compiled(routes) => routes,
            RouterState::Open(_) => &[],
        }
    }

    /// Returns the first route, in registration order, whose method equals `method` and whose
    /// pattern accepts `path`.
    pub fn at(&self, method: &Method, path: &str) -> Result<Option<RouteMatch<'_>>, RouterError> {
        let RouterState::Compiled(routes) = &self.state else {
            return Err(RouterError::NotCompiled);
        };

        Ok(routes
            .iter()
            .filter(|route| route.method == *method)
            .find_map(|route| route.pattern.matches(path).map(|params| RouteMatch { route, params })))
    }

    /// Builds a URL for the first route registered for `controller::handler`.
    ///
    /// Every path parameter of the pattern is taken from `params` and percent-encoded; the
    /// remaining entries become the query string, in iteration order. Escaped characters in
    /// the pattern's literal text (`\.`) are written unescaped.
    ///
    /// Returns `None` when no such route exists, a path parameter is missing, or the
    /// pattern's literal text is itself a regex such as `/assets/.*`.
    pub fn reverse<I, K, V>(&self, controller: &str, handler: &str, params: I) -> Option<String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let RouterState::Compiled(routes) = &self.state else {
            error!(controller, handler, "reverse routing requested before the router was compiled");
            return None;
        };

        let route = routes.iter().find(|route| route.is_for(controller, handler))?;
        let params = params.into_iter().collect::<Vec<_>>();
        let lookup = |name: &str| params.iter().find(|(key, _)| key.as_ref() == name).map(|(_, value)| value.as_ref());

        let mut url = route.pattern.expand(lookup)?;

        let path_names = route.pattern.param_names();
        let mut separator = '?';
        for (key, value) in &params {
            if path_names.iter().any(|name| name == key.as_ref()) {
                continue;
            }
            url.push(separator);
            url.push_str(&urlencoding::encode(key.as_ref()));
            url.push('=');
            url.push_str(&urlencoding::encode(value.as_ref()));
            separator = '&';
        }

        Some(url)
    }

    /// Like [`Router::reverse`], with parameters given as `name, value, name, value, ...`.
    ///
    /// An odd number of entries yields `None`.
    pub fn reverse_flat(&self, controller: &str, handler: &str, params: &[&str]) -> Option<String> {
        if params.len() % 2 != 0 {
            return None;
        }
        self.reverse(controller, handler, params.chunks_exact(2).map(|pair| (pair[0], pair[1])))
    }
}

/// Second half of the registration DSL started by [`Router::route`].
#[derive(Debug)]
pub struct RouteDeclaration<'router> {
    router: &'router mut Router,
    method: Method,
    pattern: String,
}

impl RouteDeclaration<'_> {
    pub fn bind(self, controller: &Arc<Controller>, handler_name: impl Into<String>) -> Result<(), RouterError> {
        self.router.register(RouteSpec::new(self.method, self.pattern, controller, handler_name))
    }
}
