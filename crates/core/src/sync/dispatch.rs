//! Ordered fire-and-forget queue for native sync calls
//!
//! Calls are executed one at a time by a single worker task, in the order
//! they were submitted, so a grant followed by a revoke reaches the host in
//! that order. Submitting never waits on the host.

use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};

use super::SyncError;

/// Default number of queued sync calls before new ones are dropped
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// A queued sync call
pub type SyncCall = BoxFuture<'static, Result<(), SyncError>>;

enum SyncJob {
    Call { op: &'static str, call: SyncCall },
    Barrier(oneshot::Sender<()>),
}

/// Handle to the sync worker
pub struct SyncDispatcher {
    sender: Option<mpsc::Sender<SyncJob>>,
}

impl SyncDispatcher {
    /// Start the worker on the current tokio runtime
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    pub fn spawn(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        tokio::spawn(run_worker(receiver));
        Self {
            sender: Some(sender),
        }
    }

    /// A dispatcher that silently drops every call
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    /// Queue a sync call
    ///
    /// # Returns
    /// - `true` if the call was queued
    /// - `false` if the dispatcher is disabled or the queue is full (call is dropped)
    pub fn submit<F>(&self, op: &'static str, call: F) -> bool
    where
        F: Future<Output = Result<(), SyncError>> + Send + 'static,
    {
        let Some(sender) = &self.sender else {
            return false;
        };

        match sender.try_send(SyncJob::Call {
            op,
            call: call.boxed(),
        }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("Native sync queue full, dropping {}", op);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::error!("Native sync worker stopped, dropping {}", op);
                false
            }
        }
    }

    /// Wait until every call queued before this one has finished
    pub async fn flush(&self) {
        let Some(sender) = &self.sender else {
            return;
        };

        let (done, wait) = oneshot::channel();
        if sender.send(SyncJob::Barrier(done)).await.is_ok() {
            let _ = wait.await;
        }
    }
}

async fn run_worker(mut receiver: mpsc::Receiver<SyncJob>) {
    while let Some(job) = receiver.recv().await {
        match job {
            SyncJob::Call { op, call } => {
                if let Err(e) = call.await {
                    tracing::warn!("Native sync {} failed: {}", op, e);
                }
            }
            SyncJob::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("Native sync worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;

    #[tokio::test]
    async fn test_calls_run_in_order() {
        let dispatcher = SyncDispatcher::spawn(16);
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10 {
            let log = Arc::clone(&log);
            assert!(dispatcher.submit("record", async move {
                tokio::task::yield_now().await;
                log.lock().push(i);
                Ok(())
            }));
        }
        dispatcher.flush().await;

        assert_eq!(*log.lock(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_worker() {
        let dispatcher = SyncDispatcher::spawn(16);
        let ran = Arc::new(Mutex::new(false));

        dispatcher.submit("fail", async { Err(SyncError::Unavailable) });
        let flag = Arc::clone(&ran);
        dispatcher.submit("after", async move {
            *flag.lock() = true;
            Ok(())
        });
        dispatcher.flush().await;

        assert!(*ran.lock());
    }

    #[tokio::test]
    async fn test_full_queue_drops_call() {
        let dispatcher = SyncDispatcher::spawn(1);
        let (release, blocked) = oneshot::channel::<()>();

        // Occupies the worker until released
        dispatcher.submit("block", async move {
            let _ = blocked.await;
            Ok(())
        });
        tokio::task::yield_now().await;

        let mut accepted = 0;
        for _ in 0..4 {
            if dispatcher.submit("extra", async { Ok(()) }) {
                accepted += 1;
            }
        }
        assert!(accepted < 4);

        let _ = release.send(());
        dispatcher.flush().await;
    }

    #[tokio::test]
    async fn test_disabled_drops_everything() {
        let dispatcher = SyncDispatcher::disabled();
        assert!(!dispatcher.is_enabled());
        assert!(!dispatcher.submit("noop", async { Ok(()) }));
        dispatcher.flush().await;
    }
}
