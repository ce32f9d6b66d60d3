//! FIFO queue in front of the relational backend.
//!
//! Every statement goes through one worker task, strictly in submission
//! order, with a short pause after each job so a constrained host is not
//! flooded. Each job gets a deadline; when it passes, the caller receives
//! [`FavoritesError::Timeout`] and the worker moves on. The job itself is
//! not cancelled and may still finish later.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::errors::FavoritesError;

struct QueuedJob {
    name: String,
    task: BoxFuture<'static, ()>,
    on_timeout: Box<dyn FnOnce() + Send>,
}

pub struct OperationQueue {
    sender: mpsc::UnboundedSender<QueuedJob>,
    pending: Arc<AtomicUsize>,
    worker: JoinHandle<()>,
}

impl OperationQueue {
    /// Spawns the worker; must be called inside a tokio runtime.
    pub fn new(timeout: Duration, pause: Duration) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let worker = tokio::spawn(run_worker(receiver, pending.clone(), timeout, pause));

        Self {
            sender,
            pending,
            worker,
        }
    }

    /// Jobs submitted but not yet picked up by the worker.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub async fn submit<T, F>(&self, name: &str, operation: F) -> Result<T, FavoritesError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, FavoritesError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<Result<T, FavoritesError>>();
        let reply = Arc::new(Mutex::new(Some(tx)));

        let task_reply = reply.clone();
        let task = async move {
            let result = operation.await;
            if let Some(tx) = task_reply.lock().take() {
                let _ = tx.send(result);
            }
        }
        .boxed();

        let timeout_name = name.to_string();
        let on_timeout = Box::new(move || {
            if let Some(tx) = reply.lock().take() {
                let _ = tx.send(Err(FavoritesError::Timeout(timeout_name)));
            }
        });

        self.pending.fetch_add(1, Ordering::SeqCst);
        let job = QueuedJob {
            name: name.to_string(),
            task,
            on_timeout,
        };
        if self.sender.send(job).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(FavoritesError::QueueClosed);
        }

        rx.await.map_err(|_| FavoritesError::QueueClosed)?
    }
}

impl Drop for OperationQueue {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn run_worker(
    mut receiver: mpsc::UnboundedReceiver<QueuedJob>,
    pending: Arc<AtomicUsize>,
    timeout: Duration,
    pause: Duration,
) {
    while let Some(job) = receiver.recv().await {
        pending.fetch_sub(1, Ordering::SeqCst);

        let handle = tokio::spawn(job.task);
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                log::error!("Queued operation '{}' panicked: {}", job.name, e);
            }
            Err(_) => {
                log::warn!(
                    "Queued operation '{}' exceeded {:?}, continuing without it",
                    job.name,
                    timeout
                );
                (job.on_timeout)();
            }
        }

        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }

    log::debug!("Operation queue worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[tokio::test]
    async fn test_runs_in_submission_order() {
        let queue = Arc::new(OperationQueue::new(Duration::from_secs(1), Duration::ZERO));
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5u64 {
            let log = log.clone();
            // earlier jobs sleep longer; order must still hold
            let fut = queue.submit("ordered", async move {
                tokio::time::sleep(Duration::from_millis(10 * (5 - i))).await;
                log.lock().push(i);
                Ok(i)
            });
            handles.push(fut);
        }

        let results = futures_util::future::join_all(handles).await;
        let values: Vec<u64> = results.into_iter().map(|r| r.unwrap()).collect();

        assert_eq!(values, vec![0, 1, 2, 3, 4]);
        assert_eq!(*log.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_one_job_in_flight() {
        let queue = OperationQueue::new(Duration::from_secs(1), Duration::from_millis(1));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let jobs = (0..6).map(|_| {
            let in_flight = in_flight.clone();
            let max_seen = max_seen.clone();
            queue.submit("exclusive", async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
        });
        futures_util::future::join_all(jobs).await;

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn test_pause_between_operations() {
        let pause = Duration::from_millis(30);
        let queue = OperationQueue::new(Duration::from_secs(1), pause);
        let starts = Arc::new(Mutex::new(Vec::new()));

        let jobs = (0..4).map(|_| {
            let starts = starts.clone();
            queue.submit("spaced", async move {
                starts.lock().push(tokio::time::Instant::now());
                Ok(())
            })
        });
        futures_util::future::join_all(jobs).await;

        let starts = starts.lock();
        assert_eq!(starts.len(), 4);
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= pause, "jobs started {:?} apart", pair[1] - pair[0]);
        }
    }

    #[tokio::test]
    async fn test_timeout_reports_and_queue_continues() {
        let queue = OperationQueue::new(Duration::from_millis(20), Duration::ZERO);
        let finished = Arc::new(AtomicBool::new(false));

        let slow_flag = finished.clone();
        let slow = queue
            .submit("slow", async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                slow_flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(matches!(slow, Err(FavoritesError::Timeout(name)) if name == "slow"));

        let fast = queue.submit("fast", async { Ok(7) }).await.unwrap();
        assert_eq!(fast, 7);

        // the timed-out job was only abandoned, not cancelled
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_errors_pass_through() {
        let queue = OperationQueue::new(Duration::from_secs(1), Duration::ZERO);
        let result: Result<(), _> = queue
            .submit("failing", async {
                Err(FavoritesError::Database("no such table".to_string()))
            })
            .await;

        assert!(matches!(result, Err(FavoritesError::Database(_))));
    }
}
