use crate::body::ResponseBody;
use crate::completion::{CompletionSlot, CompletionStrategy};
use crate::error::CompletionError;
use async_trait::async_trait;
use http::Response;
use tracing::{error, warn};

/// Completion for transports that keep a task attached to every open request.
///
/// `handle_async` does nothing; `controller_returned` parks the request task until the
/// response is published.
#[derive(Debug, Default)]
pub struct BlockingCompletion {
    slot: CompletionSlot<Response<ResponseBody>>,
}

impl BlockingCompletion {
    pub fn new() -> Self {
        Self { slot: CompletionSlot::new() }
    }
}

#[async_trait]
impl CompletionStrategy for BlockingCompletion {
    fn handle_async(&self) {}

    async fn controller_returned(&self) -> Option<Response<ResponseBody>> {
        let response = self.slot.wait().await;
        if response.is_none() {
            warn!("controller returned without a published result to wait for");
        }
        response
    }

    fn return_result_async(&self, response: Response<ResponseBody>) -> Result<(), CompletionError> {
        self.slot.publish(response).inspect_err(|e| error!(cause = %e, "failed to publish async result"))
    }
}

#[cfg(test)]
mod tests {
    use super::BlockingCompletion;
    use crate::completion::CompletionStrategy;
    use crate::error::CompletionError;
    use crate::reply::responses;
    use http::StatusCode;
    use std::sync::Arc;

    #[tokio::test]
    async fn result_published_before_controller_returned() {
        let completion = BlockingCompletion::new();
        completion.handle_async();
        completion.return_result_async(responses::not_found()).unwrap();

        let response = completion.controller_returned().await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn result_published_after_controller_returned() {
        let completion = Arc::new(BlockingCompletion::new());
        let worker = Arc::clone(&completion);

        let waiting = tokio::spawn(async move { completion.controller_returned().await });
        tokio::task::yield_now().await;
        worker.return_result_async(responses::not_found()).unwrap();

        let response = waiting.await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn double_publish_is_an_error() {
        let completion = BlockingCompletion::new();
        completion.return_result_async(responses::not_found()).unwrap();
        let second = completion.return_result_async(responses::internal_error());
        assert_eq!(second.unwrap_err(), CompletionError::AlreadyPublished);

        let response = completion.controller_returned().await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
