//! The per-request state handed through the filter chain.

use crate::binder::Violation;
use crate::body::ResponseBody;
use crate::completion::{AsyncHandle, BlockingCompletion, CompletionStrategy};
use crate::error::CompletionError;
use crate::router::PathParams;
use http::request::Parts;
use http::{Extensions, HeaderMap, HeaderValue, Method, Response, Uri, Version};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug)]
struct RequestHead {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    query: Vec<(String, String)>,
}

/// Everything a filter or handler may read about the request it serves.
///
/// The request head is shared, so cloning a context is cheap. A clone carries the same
/// completion strategy, which is how a context handed to another task can still publish the
/// result of the original request.
#[derive(Debug, Clone)]
pub struct Context {
    head: Arc<RequestHead>,
    path_params: PathParams,
    violations: Vec<Violation>,
    attributes: Extensions,
    completion: Arc<dyn CompletionStrategy>,
    on_worker: bool,
}

impl Context {
    pub fn new(parts: Parts, path_params: PathParams, completion: Arc<dyn CompletionStrategy>) -> Self {
        let query = parts.uri.query().map(parse_query).unwrap_or_default();
        let head = RequestHead { method: parts.method, uri: parts.uri, version: parts.version, headers: parts.headers, query };

        Self {
            head: Arc::new(head),
            path_params,
            violations: Vec::new(),
            attributes: parts.extensions,
            completion,
            on_worker: false,
        }
    }

    /// A context using [`BlockingCompletion`], for code that runs a chain outside a dispatcher.
    pub fn standalone(parts: Parts, path_params: PathParams) -> Self {
        Self::new(parts, path_params, Arc::new(BlockingCompletion::new()))
    }

    pub fn method(&self) -> &Method {
        &self.head.method
    }

    pub fn uri(&self) -> &Uri {
        &self.head.uri
    }

    pub fn path(&self) -> &str {
        self.head.uri.path()
    }

    pub fn version(&self) -> Version {
        self.head.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.head.headers.get(name)
    }

    pub fn path_params(&self) -> &PathParams {
        &self.path_params
    }

    pub fn path_parameter(&self, name: &str) -> Option<&str> {
        self.path_params.get(name)
    }

    /// The first value of the query parameter `name`, decoded.
    pub fn query_parameter(&self, name: &str) -> Option<&str> {
        self.head.query.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    /// Every decoded query pair, in request order.
    pub fn query_parameters(&self) -> impl Iterator<Item = (&str, &str)> {
        self.head.query.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }

    pub(crate) fn add_violation(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    /// A value previously stored by a filter, or carried in the request extensions.
    pub fn attribute<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.attributes.get::<T>()
    }

    /// Stores a typed value for later filters and the handler, returning the value it replaces.
    pub fn set_attribute<T: Clone + Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.attributes.insert(value)
    }

    /// Announces that the handler will return [`Reply::Async`](crate::Reply::Async).
    pub fn handle_async(&self) {
        self.completion.handle_async();
    }

    /// Called once the chain returned [`Reply::Async`](crate::Reply::Async).
    ///
    /// With blocking completion this waits for the published response; with native completion
    /// it returns `None` at once.
    pub async fn controller_returned(&self) -> Option<Response<ResponseBody>> {
        self.completion.controller_returned().await
    }

    pub fn return_result_async(&self, response: Response<ResponseBody>) -> Result<(), CompletionError> {
        self.completion.return_result_async(response)
    }

    /// A handle that can publish the deferred response from any task.
    pub fn async_handle(&self) -> AsyncHandle {
        AsyncHandle::new(Arc::clone(&self.completion))
    }

    pub(crate) fn mark_on_worker(&mut self) {
        self.on_worker = true;
    }

    /// Whether this context is being served by a queue worker rather than the request task.
    pub fn runs_on_worker(&self) -> bool {
        self.on_worker
    }
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    serde_urlencoded::from_str::<Vec<(String, String)>>(query).unwrap_or_else(|e| {
        warn!(cause = %e, query, "ignoring malformed query string");
        Vec::new()
    })
}
