//! A bounded FIFO of deferred work with age-based admission control.
//!
//! An [`AsyncQueueFilter`] placed in a route's chain hands the rest of the chain to a small
//! pool of workers. Each task remembers when it was queued; when a worker picks up a task
//! that waited longer than its budget, the task is answered with
//! [`responses::queue_timeout`] and its chain is never run. The check happens only when a
//! task is dequeued, a task that has started always runs to completion.
//!
//! The queue is bounded. A task that does not fit is answered with
//! [`responses::service_unavailable`] straight away.
//!
//! A handler that panics on a worker is answered through the queue's [`ErrorHandler`] and
//! the worker moves on to the next task.

use crate::body::ResponseBody;
use crate::config::QueueConfig;
use crate::context::Context;
use crate::dispatcher::ErrorHandler;
use crate::error::BoxError;
use crate::filter::{Filter, FilterChain};
use crate::reply::{Reply, responses};
use async_trait::async_trait;
use futures::FutureExt;
use http::Response;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, trace, warn};

/// The remainder of a request's chain, waiting for a worker.
pub struct AsyncTask {
    ctx: Context,
    chain: FilterChain,
    enqueued_at: Instant,
    timeout: Option<Duration>,
}

impl AsyncTask {
    pub fn new(mut ctx: Context, chain: FilterChain, timeout: Option<Duration>) -> Self {
        ctx.mark_on_worker();
        Self { ctx, chain, enqueued_at: Instant::now(), timeout }
    }

    /// Time spent since the task was created.
    pub fn age(&self) -> Duration {
        self.enqueued_at.elapsed()
    }

    pub fn is_expired(&self) -> bool {
        self.timeout.is_some_and(|timeout| self.age() > timeout)
    }
}

impl fmt::Debug for AsyncTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncTask")
            .field("path", &self.ctx.path())
            .field("chain", &self.chain)
            .field("enqueued_at", &self.enqueued_at)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Handle to the queue; clones share the same queue and workers.
#[derive(Clone)]
pub struct AsyncQueue {
    sender: mpsc::Sender<AsyncTask>,
    receiver: Arc<Mutex<mpsc::Receiver<AsyncTask>>>,
    workers: usize,
    timeout: Option<Duration>,
    started: Arc<AtomicBool>,
    error_handler: Arc<dyn ErrorHandler>,
}

impl AsyncQueue {
    /// Creates the queue without workers, see [`AsyncQueue::start`].
    pub fn new(config: &QueueConfig, error_handler: Arc<dyn ErrorHandler>) -> Self {
        let (sender, receiver) = mpsc::channel(config.capacity().max(1));
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            workers: config.workers().max(1),
            timeout: config.timeout(),
            started: Arc::new(AtomicBool::new(false)),
            error_handler,
        }
    }

    /// Spawns the workers on the current tokio runtime. Only the first call has an effect.
    ///
    /// Workers stop once every handle to the queue has been dropped and the queue drained.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        if self.started.swap(true, Ordering::AcqRel) {
            warn!("async queue already started");
            return Vec::new();
        }

        (0..self.workers)
            .map(|worker| {
                let receiver = Arc::clone(&self.receiver);
                let error_handler = Arc::clone(&self.error_handler);
                tokio::spawn(async move {
                    debug!(worker, "async queue worker started");
                    loop {
                        let task = receiver.lock().await.recv().await;
                        match task {
                            Some(task) => process(task, error_handler.as_ref()).await,
                            None => break,
                        }
                    }
                    debug!(worker, "async queue worker stopped");
                })
            })
            .collect()
    }

    /// Default budget of tasks created by [`AsyncQueue::enqueue`].
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Number of tasks waiting for a worker.
    pub fn depth(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// Queues the rest of `chain` with the queue's default budget.
    ///
    /// Returns `false` when the task was refused; the request has then already been answered
    /// with `503 Service Unavailable`.
    pub fn enqueue(&self, ctx: Context, chain: FilterChain) -> bool {
        self.submit(AsyncTask::new(ctx, chain, self.timeout))
    }

    pub fn submit(&self, task: AsyncTask) -> bool {
        match self.sender.try_send(task) {
            Ok(()) => {
                trace!(depth = self.depth(), "task queued");
                true
            }
            Err(mpsc::error::TrySendError::Full(task)) => {
                warn!(path = task.ctx.path(), capacity = self.sender.max_capacity(), "async queue full, rejecting task");
                publish(&task.ctx, responses::service_unavailable());
                false
            }
            Err(mpsc::error::TrySendError::Closed(task)) => {
                warn!(path = task.ctx.path(), "async queue closed, rejecting task");
                publish(&task.ctx, responses::service_unavailable());
                false
            }
        }
    }
}

impl fmt::Debug for AsyncQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncQueue")
            .field("capacity", &self.sender.max_capacity())
            .field("depth", &self.depth())
            .field("workers", &self.workers)
            .field("timeout", &self.timeout)
            .field("started", &self.started.load(Ordering::Acquire))
            .finish()
    }
}

/// Runs one dequeued task, or sheds it when it waited too long.
pub(crate) async fn process(task: AsyncTask, error_handler: &dyn ErrorHandler) {
    let age = task.age();
    let AsyncTask { mut ctx, chain, timeout, .. } = task;

    if let Some(timeout) = timeout
        && age > timeout
    {
        warn!(path = ctx.path(), ?age, ?timeout, "shedding queued task that outlived its budget");
        publish(&ctx, responses::queue_timeout());
        return;
    }

    let outcome = match AssertUnwindSafe(chain.next(&mut ctx)).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => {
            let cause = panic_message(panic.as_ref());
            error!(path = ctx.path(), cause, "queued handler panicked");
            Err(format!("handler panicked: {cause}").into())
        }
    };

    match outcome {
        Ok(Reply::Ready(response)) => publish(&ctx, response),
        Ok(Reply::Async) => trace!(path = ctx.path(), "queued handler publishes its own result"),
        Err(e) => {
            let response = error_handler.handle(&ctx, e);
            publish(&ctx, response);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

fn publish(ctx: &Context, response: Response<ResponseBody>) {
    if let Err(e) = ctx.return_result_async(response) {
        debug!(path = ctx.path(), cause = %e, "queued task result dropped");
    }
}

/// Hands the rest of the chain to an [`AsyncQueue`] and returns [`Reply::Async`].
#[derive(Debug, Clone)]
pub struct AsyncQueueFilter {
    queue: AsyncQueue,
    timeout: Option<Duration>,
}

impl AsyncQueueFilter {
    pub fn new(queue: AsyncQueue) -> Self {
        let timeout = queue.timeout();
        Self { queue, timeout }
    }

    /// Overrides the queue's default budget for the routes using this filter.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Filter for AsyncQueueFilter {
    async fn filter(&self, chain: FilterChain, ctx: &mut Context) -> Result<Reply, BoxError> {
        ctx.handle_async();
        self.queue.submit(AsyncTask::new(ctx.clone(), chain, self.timeout));
        Ok(Reply::Async)
    }
}
