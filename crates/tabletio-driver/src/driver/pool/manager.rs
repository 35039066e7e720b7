//! Worker pool for parallel scans.
//!
//! [`WorkerPool`] owns one bounded [`mpsc::Sender`] per worker and hands out
//! [`ScanRequest`]s round-robin. Shutdown is coordinated through a shared
//! [`CancellationToken`]: readers stop at their next step, then every worker
//! is asked to exit and acknowledges on a oneshot channel.

use crate::driver::scan::ScanRequest;
use anyhow::bail;
use core::time::Duration;
use portable_atomic::{AtomicUsize, Ordering};
use tokio::{
    sync::{mpsc, oneshot},
    time::timeout,
};
use tokio_util::sync::CancellationToken;

pub struct WorkerPool {
    workers: Vec<mpsc::Sender<ScanRequest>>,
    next_worker: AtomicUsize,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
}

impl WorkerPool {
    pub const fn new(
        workers: Vec<mpsc::Sender<ScanRequest>>,
        shutdown_token: CancellationToken,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            workers,
            next_worker: AtomicUsize::new(0),
            shutdown_token,
            shutdown_timeout,
        }
    }

    /// Round-robin.
    pub fn next_worker_index(&self) -> usize {
        self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len()
    }

    /// Queues `request` on the next worker, waiting while its queue is full.
    ///
    /// # Errors
    ///
    /// Fails once the pool is shutting down or the worker's channel is closed.
    pub async fn send_to_next_worker(&self, request: ScanRequest) -> anyhow::Result<()> {
        if self.shutdown_token.is_cancelled() {
            bail!("worker pool is shutting down");
        }
        let worker_idx = self.next_worker_index();
        if self.workers[worker_idx].send(request).await.is_err() {
            bail!("worker {worker_idx} channel closed");
        }
        Ok(())
    }

    /// Cancels in-flight reads and waits for every worker to acknowledge
    /// shutdown, up to `shutdown_timeout` each.
    pub async fn shutdown(&self) {
        tracing::debug!("Cancelling remaining work via shutdown token");
        self.shutdown_token.cancel();

        let mut acks = Vec::with_capacity(self.workers.len());
        for (i, worker) in self.workers.iter().enumerate() {
            let (tx, rx) = oneshot::channel();
            if let Err(err) = worker.send(ScanRequest::Shutdown { response: tx }).await {
                tracing::error!("Failed to send shutdown to worker {i}: {err}");
            } else {
                acks.push((i, rx));
            }
        }

        let wait = self.shutdown_timeout;
        let pending = acks.into_iter().map(|(i, rx)| async move {
            match timeout(wait, rx).await {
                Ok(Ok(())) => tracing::trace!("Worker {i} shutdown acknowledged"),
                Ok(Err(err)) => tracing::error!("Worker {i} returned error: {err}"),
                Err(_) => tracing::warn!("Worker {i} shutdown timed out"),
            }
        });
        futures::future::join_all(pending).await;

        tracing::info!("Worker pool shutdown complete");
    }
}
