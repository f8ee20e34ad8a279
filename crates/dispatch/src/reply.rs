//! The value a filter chain produces.
//!
//! A [`Reply`] is either a finished response or the [`Reply::Async`] sentinel, which tells
//! the dispatcher that the handler deferred its result and will publish it later through
//! the request's completion strategy. Apart from telling those two apart, the dispatch core
//! treats a response as opaque and leaves writing it to the transport.

use crate::binder::Violation;
use crate::body::ResponseBody;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Response, StatusCode};
use mime::Mime;

#[derive(Debug)]
pub enum Reply {
    /// A finished response.
    Ready(Response<ResponseBody>),
    /// The handler will publish its response later.
    Async,
}

impl Reply {
    pub fn is_async(&self) -> bool {
        matches!(self, Reply::Async)
    }

    /// Returns the response, or `None` for the async sentinel.
    pub fn into_response(self) -> Option<Response<ResponseBody>> {
        match self {
            Reply::Ready(response) => Some(response),
            Reply::Async => None,
        }
    }

    pub fn text(status: StatusCode, body: impl Into<ResponseBody>) -> Self {
        Reply::Ready(text_response(status, body))
    }

    pub fn ok(body: impl Into<ResponseBody>) -> Self {
        Self::text(StatusCode::OK, body)
    }

    pub fn not_found() -> Self {
        Reply::Ready(responses::not_found())
    }

    pub fn bad_request(body: impl Into<ResponseBody>) -> Self {
        Self::text(StatusCode::BAD_REQUEST, body)
    }
}

impl From<Response<ResponseBody>> for Reply {
    fn from(response: Response<ResponseBody>) -> Self {
        Reply::Ready(response)
    }
}

fn header_value(mime: &Mime) -> HeaderValue {
    HeaderValue::from_str(mime.as_ref()).unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"))
}

pub(crate) fn text_response(status: StatusCode, body: impl Into<ResponseBody>) -> Response<ResponseBody> {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, header_value(&mime::TEXT_PLAIN_UTF_8));
    response
}

/// Canonical responses synthesized by the dispatch core itself.
pub mod responses {
    use super::{header_value, text_response};
    use crate::binder::Violation;
    use crate::body::ResponseBody;
    use http::header::CONTENT_TYPE;
    use http::{Response, StatusCode};

    pub fn not_found() -> Response<ResponseBody> {
        text_response(StatusCode::NOT_FOUND, "404 not found")
    }

    pub fn internal_error() -> Response<ResponseBody> {
        text_response(StatusCode::INTERNAL_SERVER_ERROR, "500 internal server error")
    }

    /// Sent when the async queue refuses a task because it is full.
    pub fn service_unavailable() -> Response<ResponseBody> {
        text_response(StatusCode::SERVICE_UNAVAILABLE, "503 service unavailable")
    }

    /// Sent instead of running a queued task that waited longer than its budget.
    pub fn queue_timeout() -> Response<ResponseBody> {
        text_response(StatusCode::SERVICE_UNAVAILABLE, "503 request timed out while queued")
    }

    /// Lists the parameters that could not be converted, as a json array.
    pub fn validation_failure(violations: &[Violation]) -> Response<ResponseBody> {
        let body = serde_json::to_string(violations).unwrap_or_else(|_| String::from("[]"));
        let mut response = Response::new(ResponseBody::from(body));
        *response.status_mut() = StatusCode::BAD_REQUEST;
        response.headers_mut().insert(CONTENT_TYPE, header_value(&mime::APPLICATION_JSON));
        response
    }
}

impl Reply {
    pub fn validation_failure(violations: &[Violation]) -> Self {
        Reply::Ready(responses::validation_failure(violations))
    }
}

#[cfg(test)]
mod tests {
    use super::{Reply, responses};
    use crate::binder::Violation;
    use http::StatusCode;
    use http::header::CONTENT_TYPE;
    use http_body_util::BodyExt;

    #[test]
    fn async_sentinel_has_no_response() {
        assert!(Reply::Async.is_async());
        assert!(Reply::Async.into_response().is_none());
        assert!(!Reply::ok("hi").is_async());
    }

    #[test]
    fn text_reply_sets_content_type() {
        let response = Reply::text(StatusCode::CREATED, "made").into_response().unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "text/plain; charset=utf-8");
    }

    #[tokio::test]
    async fn validation_failure_lists_violations() {
        let violations = vec![Violation::new("id", "invalid digit found in string")];
        let response = responses::validation_failure(&violations);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "application/json");

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value[0]["param"], "id");
    }
}
