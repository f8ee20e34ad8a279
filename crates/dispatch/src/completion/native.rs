use crate::body::ResponseBody;
use crate::completion::CompletionStrategy;
use crate::completion::slot::lock;
use crate::error::CompletionError;
use async_trait::async_trait;
use http::Response;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

/// The transport's side of a connection that can be completed out of band.
#[cfg_attr(test, mockall::automock)]
pub trait ResponseSink: Send {
    /// Writes the deferred response to the client.
    fn write_response(&mut self, response: Response<ResponseBody>);

    /// Tells the transport the exchange is finished and the connection may be reused.
    fn complete(&mut self);
}

/// Completion for transports that can hold a connection without a task attached.
///
/// `handle_async` detaches the request from its task, `controller_returned` never waits, and
/// `return_result_async` writes straight to the [`ResponseSink`].
pub struct NativeCompletion {
    detached: AtomicBool,
    published: AtomicBool,
    sink: Mutex<Option<Box<dyn ResponseSink>>>,
}

impl NativeCompletion {
    pub fn new(sink: Box<dyn ResponseSink>) -> Self {
        Self { detached: AtomicBool::new(false), published: AtomicBool::new(false), sink: Mutex::new(Some(sink)) }
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }
}

impl fmt::Debug for NativeCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeCompletion")
            .field("detached", &self.detached)
            .field("published", &self.published)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CompletionStrategy for NativeCompletion {
    fn handle_async(&self) {
        if !self.detached.swap(true, Ordering::AcqRel) {
            debug!("request detached from its task");
        }
    }

    async fn controller_returned(&self) -> Option<Response<ResponseBody>> {
        if !self.is_detached() {
            warn!("async result pending but handle_async was never called");
        }
        None
    }

    fn return_result_async(&self, response: Response<ResponseBody>) -> Result<(), CompletionError> {
        if self.published.swap(true, Ordering::AcqRel) {
            error!("failed to publish async result: result has already been published");
            return Err(CompletionError::AlreadyPublished);
        }

        let Some(mut sink) = lock(&self.sink).take() else {
            error!("failed to publish async result: the response sink is gone");
            return Err(CompletionError::Detached);
        };
        sink.write_response(response);
        sink.complete();
        Ok(())
    }
}

/// A [`ResponseSink`] backed by a oneshot channel, for transports built on tokio tasks.
#[derive(Debug)]
pub struct ChannelSink {
    sender: Option<oneshot::Sender<Response<ResponseBody>>>,
}

pub fn channel_sink() -> (ChannelSink, oneshot::Receiver<Response<ResponseBody>>) {
    let (sender, receiver) = oneshot::channel();
    (ChannelSink { sender: Some(sender) }, receiver)
}

impl ResponseSink for ChannelSink {
    fn write_response(&mut self, response: Response<ResponseBody>) {
        if let Some(sender) = self.sender.take()
            && sender.send(response).is_err()
        {
            warn!("connection closed before the async response was written");
        }
    }

    fn complete(&mut self) {
        self.sender = None;
    }
}

#[cfg(test)]
mod tests {
    use super::{MockResponseSink, NativeCompletion, channel_sink};
    use crate::completion::CompletionStrategy;
    use crate::error::CompletionError;
    use crate::reply::responses;
    use http::StatusCode;

    #[tokio::test]
    async fn controller_returned_never_waits() {
        let (sink, _receiver) = channel_sink();
        let completion = NativeCompletion::new(Box::new(sink));
        completion.handle_async();

        assert!(completion.is_detached());
        assert!(completion.controller_returned().await.is_none());
    }

    #[tokio::test]
    async fn result_is_written_and_completed_once() {
        let mut sink = MockResponseSink::new();
        sink.expect_write_response().times(1).returning(|response| assert_eq!(response.status(), StatusCode::NOT_FOUND));
        sink.expect_complete().times(1).return_const(());

        let completion = NativeCompletion::new(Box::new(sink));
        completion.handle_async();
        completion.return_result_async(responses::not_found()).unwrap();

        let second = completion.return_result_async(responses::internal_error());
        assert_eq!(second.unwrap_err(), CompletionError::AlreadyPublished);
    }

    #[tokio::test]
    async fn channel_sink_delivers_response() {
        let (sink, receiver) = channel_sink();
        let completion = NativeCompletion::new(Box::new(sink));
        completion.handle_async();

        std::thread::spawn(move || completion.return_result_async(responses::not_found()).unwrap());

        let response = receiver.await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
