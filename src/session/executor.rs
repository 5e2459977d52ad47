//! Serial executor: one worker task per session draining a FIFO queue.
//!
//! Operations submitted to the same executor run strictly one at a time in submission order.
//! Separate executors share nothing, so different sessions run fully concurrently.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::{ParleyError, Result};

type Job<C> = Box<dyn FnOnce(C) -> BoxFuture<'static, ()> + Send>;

/// FIFO, run-one-at-a-time executor bound to a single session.
///
/// Each operation receives a context value `C` built when the operation starts running.
/// An operation must not enqueue onto its own executor and await the result; that deadlocks.
pub struct SerialExecutor<C> {
    label: String,
    tx: mpsc::UnboundedSender<Job<C>>,
    cancel: CancellationToken,
    queued: Arc<AtomicUsize>,
}

impl<C: Send + 'static> SerialExecutor<C> {
    /// Spawn the worker task.
    ///
    /// `context` is called right before each operation runs; `on_complete` right after each
    /// operation finishes, whether it succeeded, failed or panicked.
    pub fn spawn<F, D>(label: impl Into<String>, mut context: F, mut on_complete: D) -> Self
    where
        F: FnMut() -> C + Send + 'static,
        D: FnMut() + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job<C>>();
        let cancel = CancellationToken::new();
        let queued = Arc::new(AtomicUsize::new(0));

        let worker_cancel = cancel.clone();
        let worker_queued = queued.clone();
        tokio::spawn(async move {
            loop {
                let job = tokio::select! {
                    biased;
                    _ = worker_cancel.cancelled() => break,
                    job = rx.recv() => match job {
                        Some(job) => job,
                        None => break,
                    },
                };
                worker_queued.fetch_sub(1, Ordering::SeqCst);
                job(context()).await;
                on_complete();
            }

            // Jobs that never started are dropped here; their callers see `Disposed`.
            rx.close();
            while let Ok(job) = rx.try_recv() {
                worker_queued.fetch_sub(1, Ordering::SeqCst);
                drop(job);
            }
        });

        Self {
            label: label.into(),
            tx,
            cancel,
            queued,
        }
    }

    /// Queue an operation and wait for its result.
    ///
    /// Errors (and panics) raised by `op` are returned to this caller only; the queue moves on
    /// to the next operation. Fails with [`ParleyError::Disposed`] if the executor is closed
    /// before `op` starts.
    pub async fn enqueue<T, Op, Fut>(&self, op: Op) -> Result<T>
    where
        T: Send + 'static,
        Op: FnOnce(C) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            return Err(ParleyError::disposed(&self.label));
        }

        let (reply_tx, reply_rx) = oneshot::channel::<Result<T>>();
        let job: Job<C> = Box::new(move |ctx: C| {
            async move {
                let outcome = AssertUnwindSafe(async move { op(ctx).await })
                    .catch_unwind()
                    .await;
                let result = outcome.unwrap_or_else(|panic| {
                    let message = panic_message(panic.as_ref());
                    tracing::error!(panic = %message, "Session operation panicked");
                    Err(ParleyError::Panicked(message))
                });
                let _ = reply_tx.send(result);
            }
            .boxed()
        });

        self.queued.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(job).is_err() {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(ParleyError::disposed(&self.label));
        }

        reply_rx
            .await
            .map_err(|_| ParleyError::disposed(&self.label))?
    }
}

impl<C> SerialExecutor<C> {
    /// Stop accepting work. Queued operations fail; a running one finishes.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Operations waiting to start (excludes the one running).
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }
}

impl<C> Drop for SerialExecutor<C> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<C> std::fmt::Debug for SerialExecutor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialExecutor")
            .field("label", &self.label)
            .field("queued", &self.queued())
            .field("closed", &self.is_closed())
            .finish()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    fn unit_executor() -> SerialExecutor<()> {
        SerialExecutor::spawn("test", || (), || {})
    }

    #[tokio::test]
    async fn runs_operations_in_submission_order() {
        let executor = unit_executor();
        let order = Arc::new(Mutex::new(Vec::new()));

        let futures = (0..5u64).map(|i| {
            let order = order.clone();
            executor.enqueue(move |_| async move {
                // Earlier operations sleep longer; ordering must still hold.
                tokio::time::sleep(Duration::from_millis(10 * (5 - i))).await;
                order.lock().unwrap().push(i);
                Ok(i)
            })
        });
        let results = futures::future::join_all(futures).await;

        assert_eq!(
            results.into_iter().map(|r| r.unwrap()).collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4]
        );
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn failed_operation_does_not_block_the_queue() {
        let executor = unit_executor();

        let first = executor.enqueue(|_| async { Err::<(), _>(ParleyError::Operation("boom".into())) });
        let second = executor.enqueue(|_| async { Ok("after") });
        let (first, second) = tokio::join!(first, second);

        assert!(matches!(first, Err(ParleyError::Operation(ref m)) if m == "boom"));
        assert_eq!(second.unwrap(), "after");
    }

    #[tokio::test]
    async fn panic_is_reported_to_its_caller_only() {
        let executor = unit_executor();

        let panicking = executor.enqueue(|_| async {
            if true {
                panic!("agent exploded");
            }
            Ok(())
        });
        let next = executor.enqueue(|_| async { Ok(7) });
        let (panicking, next) = tokio::join!(panicking, next);

        match panicking {
            Err(ParleyError::Panicked(message)) => assert_eq!(message, "agent exploded"),
            other => panic!("expected panic error, got {other:?}"),
        }
        assert_eq!(next.unwrap(), 7);
    }

    #[tokio::test]
    async fn context_is_built_per_operation_and_completion_is_counted() {
        let built = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));
        let built_in_worker = built.clone();
        let completed_in_worker = completed.clone();
        let executor = SerialExecutor::spawn(
            "ctx",
            move || built_in_worker.fetch_add(1, Ordering::SeqCst),
            move || {
                completed_in_worker.fetch_add(1, Ordering::SeqCst);
            },
        );

        let a = executor.enqueue(|n| async move { Ok(n) }).await.unwrap();
        let b = executor.enqueue(|n| async move { Ok(n) }).await.unwrap();

        assert_eq!((a, b), (0, 1));
        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert_eq!(completed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn close_fails_queued_operations_and_lets_running_one_finish() {
        let executor = Arc::new(unit_executor());
        let (started_tx, started_rx) = oneshot::channel::<()>();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let running = tokio::spawn({
            let executor = executor.clone();
            async move {
                executor
                    .enqueue(move |_| async move {
                        let _ = started_tx.send(());
                        let _ = release_rx.await;
                        Ok("finished")
                    })
                    .await
            }
        });
        started_rx.await.unwrap();

        let queued = tokio::spawn({
            let executor = executor.clone();
            async move { executor.enqueue(|_| async { Ok("never") }).await }
        });
        while executor.queued() == 0 {
            tokio::task::yield_now().await;
        }

        executor.close();
        release_tx.send(()).unwrap();

        assert_eq!(running.await.unwrap().unwrap(), "finished");
        assert!(matches!(
            queued.await.unwrap(),
            Err(ParleyError::Disposed { .. })
        ));
        assert!(matches!(
            executor.enqueue(|_| async { Ok(()) }).await,
            Err(ParleyError::Disposed { .. })
        ));
    }
}
