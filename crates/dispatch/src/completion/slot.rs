use crate::error::CompletionError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

/// One-shot hand-off of a value between the thread that produces a result and the party
/// waiting for it.
///
/// `publish` succeeds exactly once; the `published` flag is flipped with an atomic swap
/// before the value is released, so a second publish is detected even if it races the
/// first. Publishing before anyone waits is fine: the value stays in the channel until
/// [`CompletionSlot::wait`] picks it up.
#[derive(Debug)]
pub struct CompletionSlot<T> {
    published: AtomicBool,
    sender: Mutex<Option<oneshot::Sender<T>>>,
    receiver: Mutex<Option<oneshot::Receiver<T>>>,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> CompletionSlot<T> {
    pub fn new() -> Self {
        let (sender, receiver) = oneshot::channel();
        Self { published: AtomicBool::new(false), sender: Mutex::new(Some(sender)), receiver: Mutex::new(Some(receiver)) }
    }

    pub fn is_published(&self) -> bool {
        self.published.load(Ordering::Acquire)
    }

    pub fn publish(&self, value: T) -> Result<(), CompletionError> {
        if self.published.swap(true, Ordering::AcqRel) {
            return Err(CompletionError::AlreadyPublished);
        }

        let sender = lock(&self.sender).take();
        match sender {
            Some(sender) => sender.send(value).map_err(|_unsent| CompletionError::Detached),
            None => Err(CompletionError::Detached),
        }
    }

    /// Waits for the published value.
    ///
    /// Only the first caller receives it; later callers, and callers on a slot whose sender
    /// went away unpublished, get `None`.
    pub async fn wait(&self) -> Option<T> {
        let receiver = lock(&self.receiver).take()?;
        receiver.await.ok()
    }
}

impl<T> Default for CompletionSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
