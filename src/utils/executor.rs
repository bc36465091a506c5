//! Serial FIFO executor.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tracing::debug;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Runs submitted jobs one at a time, in submission order.
///
/// A single drain task owns the queue, so jobs never overlap and a
/// resubmitted job goes to the back of the line. Submission never blocks;
/// the queue is unbounded.
#[derive(Clone)]
pub struct SerialExecutor {
    name: &'static str,
    tx: mpsc::UnboundedSender<Job>,
}

impl SerialExecutor {
    /// Spawns the drain task. Must be called from within a tokio runtime.
    pub fn new(name: &'static str) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job.await;
            }
        });
        Self { name, tx }
    }

    /// Queue a job. Returns false if the executor is gone.
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.tx.send(Box::pin(job)).is_err() {
            debug!(executor = self.name, "executor stopped, job dropped");
            return false;
        }
        true
    }
}
