//! Handles for waiting on submitted work.

use crate::errors::{JoinError, PanicPayload};
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use uuid::Uuid;

pub(crate) type Outcome<R> = std::thread::Result<R>;

/// A handle to a task submitted through a [`ContextPool`](super::ContextPool).
///
/// The task's own return value comes back verbatim, `Err` included. A panic
/// in the task is reported as [`JoinError::Panicked`] with its payload.
pub struct TaskHandle<R> {
    snapshot_id: Uuid,
    receiver: oneshot::Receiver<Outcome<R>>,
}

impl<R> TaskHandle<R> {
    pub(crate) fn new(snapshot_id: Uuid, receiver: oneshot::Receiver<Outcome<R>>) -> Self {
        Self {
            snapshot_id,
            receiver,
        }
    }

    /// Returns the id of the snapshot the task runs with.
    #[must_use]
    pub fn snapshot_id(&self) -> Uuid {
        self.snapshot_id
    }

    /// Blocks the current thread until the task finishes.
    ///
    /// Must not be called from inside an async runtime; use
    /// [`join_async`](Self::join_async) there.
    ///
    /// # Errors
    ///
    /// Returns [`JoinError::Panicked`] if the task panicked, or
    /// [`JoinError::Closed`] if it was dropped without running.
    pub fn join(self) -> Result<R, JoinError> {
        Self::settle(self.receiver.blocking_recv())
    }

    /// Waits asynchronously for the task to finish.
    ///
    /// # Errors
    ///
    /// Same as [`join`](Self::join).
    pub async fn join_async(self) -> Result<R, JoinError> {
        Self::settle(self.receiver.await)
    }

    /// Returns the result if the task already finished.
    ///
    /// # Errors
    ///
    /// Same as [`join`](Self::join).
    pub fn try_join(&mut self) -> Option<Result<R, JoinError>> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(Self::settle(Ok(outcome))),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(JoinError::Closed)),
        }
    }

    fn settle(received: Result<Outcome<R>, oneshot::error::RecvError>) -> Result<R, JoinError> {
        match received {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => Err(JoinError::Panicked(PanicPayload::new(payload))),
            Err(_) => Err(JoinError::Closed),
        }
    }
}

/// Awaiting a handle is the same as [`TaskHandle::join_async`].
impl<R> Future for TaskHandle<R> {
    type Output = Result<R, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.receiver.poll_unpin(cx).map(Self::settle)
    }
}

/// Waits for every handle, returning results in submission order.
pub async fn join_all<R>(handles: impl IntoIterator<Item = TaskHandle<R>>) -> Vec<Result<R, JoinError>> {
    futures::future::join_all(handles).await
}

impl<R> fmt::Debug for TaskHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("snapshot_id", &self.snapshot_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_value() {
        let (tx, rx) = oneshot::channel();
        let handle = TaskHandle::new(Uuid::new_v4(), rx);
        tx.send(Ok(3_u8)).unwrap();
        assert_eq!(handle.join().unwrap(), 3);
    }

    #[test]
    fn test_join_panic() {
        let (tx, rx) = oneshot::channel::<Outcome<u8>>();
        let handle = TaskHandle::new(Uuid::new_v4(), rx);
        let _ = tx.send(Err(Box::new("boom")));

        let err = handle.join().unwrap_err();
        assert!(err.is_panic());
        assert_eq!(err.to_string(), "Task panicked: boom");
    }

    #[test]
    fn test_join_closed() {
        let (tx, rx) = oneshot::channel::<Outcome<u8>>();
        let handle = TaskHandle::new(Uuid::new_v4(), rx);
        drop(tx);
        assert!(matches!(handle.join(), Err(JoinError::Closed)));
    }

    #[test]
    fn test_try_join() {
        let (tx, rx) = oneshot::channel();
        let mut handle = TaskHandle::new(Uuid::new_v4(), rx);
        assert!(handle.try_join().is_none());
        tx.send(Ok("done")).unwrap();
        assert_eq!(handle.try_join().unwrap().unwrap(), "done");
    }

    #[tokio::test]
    async fn test_join_async() {
        let (tx, rx) = oneshot::channel();
        let handle = TaskHandle::new(Uuid::new_v4(), rx);
        tokio::spawn(async move {
            let _ = tx.send(Ok(vec![1, 2]));
        });
        assert_eq!(handle.join_async().await.unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_join_all_keeps_order() {
        let (tx_a, rx_a) = oneshot::channel();
        let (tx_b, rx_b) = oneshot::channel::<Outcome<&str>>();
        let handles = vec![
            TaskHandle::new(Uuid::new_v4(), rx_a),
            TaskHandle::new(Uuid::new_v4(), rx_b),
        ];
        drop(tx_b);
        tx_a.send(Ok("first")).unwrap();

        let results = tokio_test::block_on(join_all(handles));
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap(), &"first");
        assert!(matches!(results[1], Err(JoinError::Closed)));
    }

    #[tokio::test]
    async fn test_handle_is_a_future() {
        let (tx, rx) = oneshot::channel();
        let handle = TaskHandle::new(Uuid::new_v4(), rx);
        tx.send(Ok(5_u16)).unwrap();
        assert_eq!(handle.await.unwrap(), 5);
    }
}
