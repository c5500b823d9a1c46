//! Task submission for background work such as hook dispatches.
//!
//! [`TaskPool`] either runs each job to completion inside `submit` (inline
//! mode, used by tests that need deterministic ordering) or hands it to a
//! bounded queue drained by a supervisor with a fixed concurrency limit.
//! Jobs report their own failures; a panicking job is logged and does not
//! take the pool down.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};

use crate::error::{CatalystError, Result};

pub const DEFAULT_WORKERS: usize = 8;
pub const DEFAULT_QUEUE: usize = 256;

type Job = BoxFuture<'static, ()>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    #[default]
    Pool,
    Inline,
}

pub struct TaskPool {
    inner: Inner,
}

enum Inner {
    Inline {
        closed: AtomicBool,
    },
    Workers {
        sender: Mutex<Option<mpsc::Sender<Job>>>,
        supervisor: Mutex<Option<JoinHandle<()>>>,
    },
}

impl TaskPool {
    /// Run every job inside `submit`.
    pub fn inline() -> Self {
        Self {
            inner: Inner::Inline {
                closed: AtomicBool::new(false),
            },
        }
    }

    /// Run at most `workers` jobs at once with up to `queue` waiting.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn workers(workers: usize, queue: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue.max(1));
        let supervisor = tokio::spawn(supervise(rx, workers.max(1)));
        Self {
            inner: Inner::Workers {
                sender: Mutex::new(Some(tx)),
                supervisor: Mutex::new(Some(supervisor)),
            },
        }
    }

    pub fn new(mode: DispatchMode, workers: usize, queue: usize) -> Self {
        match mode {
            DispatchMode::Inline => Self::inline(),
            DispatchMode::Pool => Self::workers(workers, queue),
        }
    }


    /// Submit a job. Waits while the queue is full; in inline mode, waits
    /// for the job itself.
    pub async fn submit<F>(&self, job: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match &self.inner {
            Inner::Inline { closed } => {
                if closed.load(Ordering::Acquire) {
                    return Err(CatalystError::PoolClosed);
                }
                job.await;
                Ok(())
            }
            Inner::Workers { sender, .. } => {
                let tx = sender
                    .lock()
                    .ok()
                    .and_then(|guard| guard.clone())
                    .ok_or(CatalystError::PoolClosed)?;
                tx.send(Box::pin(job))
                    .await
                    .map_err(|_| CatalystError::PoolClosed)
            }
        }
    }

    /// Stop accepting jobs and wait for queued and running ones to finish.
    pub async fn shutdown(&self) {
        match &self.inner {
            Inner::Inline { closed } => closed.store(true, Ordering::Release),
            Inner::Workers { sender, supervisor } => {
                if let Ok(mut guard) = sender.lock() {
                    guard.take();
                }
                let handle = supervisor.lock().ok().and_then(|mut guard| guard.take());
                if let Some(handle) = handle {
                    if let Err(e) = handle.await {
                        tracing::error!(error = %e, "task pool supervisor failed");
                    }
                }
            }
        }
    }
}

async fn supervise(mut queue: mpsc::Receiver<Job>, workers: usize) {
    let limit = Arc::new(Semaphore::new(workers));
    let mut running = JoinSet::new();

    while let Some(job) = queue.recv().await {
        let Ok(permit) = limit.clone().acquire_owned().await else {
            break;
        };
        running.spawn(async move {
            job.await;
            drop(permit);
        });
        while let Some(finished) = running.try_join_next() {
            report(finished);
        }
    }

    while let Some(finished) = running.join_next().await {
        report(finished);
    }
}

fn report(finished: std::result::Result<(), JoinError>) {
    if let Err(e) = finished {
        if e.is_panic() {
            tracing::error!(error = %e, "pooled task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn inline_runs_job_before_returning() {
        let pool = TaskPool::inline();
        let done = Arc::new(AtomicBool::new(false));
        let flag = done.clone();
        pool.submit(async move { flag.store(true, Ordering::SeqCst) })
            .await
            .unwrap();
        assert!(done.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn shutdown_waits_for_queued_jobs() {
        let pool = TaskPool::workers(2, 16);
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let count = count.clone();
            pool.submit(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                count.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        }
        pool.shutdown().await;
        assert_eq!(count.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn concurrency_is_bounded_by_workers() {
        let pool = TaskPool::workers(2, 16);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let active = active.clone();
            let peak = peak.clone();
            pool.submit(async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        }
        pool.shutdown().await;
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn submit_after_shutdown_fails() {
        for pool in [TaskPool::inline(), TaskPool::workers(1, 1)] {
            pool.shutdown().await;
            let err = pool.submit(async {}).await.unwrap_err();
            assert!(matches!(err, CatalystError::PoolClosed));
        }
    }

    #[tokio::test]
    async fn panicking_job_does_not_stop_the_pool() {
        let pool = TaskPool::workers(1, 4);
        pool.submit(async { panic!("boom") }).await.unwrap();
        let done = Arc::new(AtomicBool::new(false));
        let flag = done.clone();
        pool.submit(async move { flag.store(true, Ordering::SeqCst) })
            .await
            .unwrap();
        pool.shutdown().await;
        assert!(done.load(Ordering::SeqCst));
    }

    #[test]
    fn dispatch_mode_is_lowercase_in_config() {
        let mode: DispatchMode = serde_yaml::from_str("inline").unwrap();
        assert_eq!(mode, DispatchMode::Inline);
        assert_eq!(DispatchMode::default(), DispatchMode::Pool);
    }
}
