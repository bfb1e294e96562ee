//! A bounded FIFO queue that executes opaque jobs strictly one at a time.
//!
//! Both state regeneration and block import run behind one of these queues, which is what
//! serializes the whole import pipeline: at most one job body is in flight per queue, and jobs
//! complete in push order. Pushing to a full queue fails immediately (backpressure), and a
//! shutdown signal aborts the worker, failing all pending jobs.

use futures::future::BoxFuture;
use slog::{debug, trace, Logger};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The queue is at capacity; the caller should back off and retry.
    QueueMaxLength,
    /// The queue was shut down before the job could complete.
    QueueAborted,
}

struct Job<O> {
    job_id: u64,
    work: BoxFuture<'static, O>,
    reply: oneshot::Sender<O>,
}

pub struct JobQueue<O> {
    tx: mpsc::Sender<Job<O>>,
    next_job_id: AtomicU64,
}

impl<O: Send + 'static> JobQueue<O> {
    /// Spawns the worker task. Must be called from within a tokio runtime.
    pub fn spawn(
        name: &'static str,
        max_length: usize,
        mut shutdown: watch::Receiver<bool>,
        log: Logger,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<Job<O>>(max_length);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                    job = rx.recv() => {
                        match job {
                            Some(job) => {
                                let output = job.work.await;
                                trace!(log, "Queue job complete"; "queue" => name, "job_id" => job.job_id);
                                // Fails only if the pusher gave up waiting.
                                let _ = job.reply.send(output);
                            }
                            // All senders dropped.
                            None => return,
                        }
                    }
                }
            }
            // Shutting down: drop pending jobs so their pushers observe `QueueAborted`.
            rx.close();
            while rx.recv().await.is_some() {}
            debug!(log, "Job queue shut down"; "queue" => name);
        });

        Self {
            tx,
            next_job_id: AtomicU64::new(0),
        }
    }

    /// Enqueues `work` and waits for its output. Jobs pushed earlier run (to completion) first.
    pub async fn push(&self, work: BoxFuture<'static, O>) -> Result<O, QueueError> {
        let job_id = self.next_job_id.fetch_add(1, Ordering::Relaxed);
        let (reply, reply_rx) = oneshot::channel();

        self.tx
            .try_send(Job {
                job_id,
                work,
                reply,
            })
            .map_err(|e| match e {
                TrySendError::Full(_) => QueueError::QueueMaxLength,
                TrySendError::Closed(_) => QueueError::QueueAborted,
            })?;

        reply_rx.await.map_err(|_| QueueError::QueueAborted)
    }

    /// Number of jobs waiting in the queue (excluding any currently executing job).
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use sloggers::null::NullLoggerBuilder;
    use sloggers::Build;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn null_log() -> Logger {
        NullLoggerBuilder.build().unwrap()
    }

    #[tokio::test]
    async fn jobs_run_one_at_a_time_in_order() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let queue = Arc::new(JobQueue::spawn("test", 16, shutdown_rx, null_log()));

        let running = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let mut handles = vec![];
        for i in 0..8u64 {
            let queue = queue.clone();
            let running = running.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                queue
                    .push(
                        async move {
                            let concurrent = running.fetch_add(1, Ordering::SeqCst) + 1;
                            assert_eq!(concurrent, 1, "two jobs ran concurrently");
                            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                            order.lock().push(i);
                            running.fetch_sub(1, Ordering::SeqCst);
                            i
                        }
                        .boxed(),
                    )
                    .await
            }));
            // Ensure pushes happen in a deterministic order.
            tokio::task::yield_now().await;
        }

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap(), Ok(i as u64));
        }
        assert_eq!(*order.lock(), (0..8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn full_queue_rejects_pushes() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let queue: Arc<JobQueue<()>> = Arc::new(JobQueue::spawn("test", 1, shutdown_rx, null_log()));

        // Block the worker on the first job.
        let (block_tx, block_rx) = oneshot::channel::<()>();
        let blocker = {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue
                    .push(
                        async move {
                            let _ = block_rx.await;
                        }
                        .boxed(),
                    )
                    .await
            })
        };
        // Wait for the worker to pick the job up, then fill the single queue slot.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let filler = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.push(async {}.boxed()).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert_eq!(
            queue.push(async {}.boxed()).await,
            Err(QueueError::QueueMaxLength)
        );

        block_tx.send(()).unwrap();
        assert_eq!(blocker.await.unwrap(), Ok(()));
        assert_eq!(filler.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn shutdown_aborts_pending_jobs() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let queue: Arc<JobQueue<()>> =
            Arc::new(JobQueue::spawn("test", 8, shutdown_rx, null_log()));

        let (block_tx, block_rx) = oneshot::channel::<()>();
        let blocker = {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue
                    .push(
                        async move {
                            let _ = block_rx.await;
                        }
                        .boxed(),
                    )
                    .await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let pending = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.push(async {}.boxed()).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        shutdown_tx.send(true).unwrap();
        drop(block_tx);

        assert_eq!(pending.await.unwrap(), Err(QueueError::QueueAborted));
        // The in-flight job may or may not complete depending on scheduling; it must not hang.
        let _ = blocker.await.unwrap();
    }
}
