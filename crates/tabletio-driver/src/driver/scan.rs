use crate::driver::{
    config::DriverConfig,
    pool::{manager::WorkerPool, worker::worker_loop},
    rebalance::Rebalancer,
};
use anyhow::bail;
use core::time::Duration;
use std::{collections::HashMap, sync::Arc, time::Instant};
use tabletio::{ByteKey, ScanPlanner, SplitHandle, WorkUnit};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Attempts per unit before the scan gives up.
const MAX_ATTEMPTS: u32 = 3;
/// Queued requests per worker.
const WORKER_QUEUE_DEPTH: usize = 4;

#[derive(Clone, Debug)]
pub struct ScanTask {
    pub id: u64,
    pub unit: WorkUnit,
    pub attempt: u32,
}

pub enum ScanRequest {
    Scan {
        task: ScanTask,
        events: mpsc::UnboundedSender<ScanEvent>,
    },
    Shutdown {
        response: oneshot::Sender<()>,
    },
}

pub enum ScanEvent {
    Started { id: u64, handle: SplitHandle },
    Finished { id: u64, keys: Vec<ByteKey> },
    /// `task.unit` is what the reader still owned when it failed.
    Failed { task: ScanTask, error: String },
}

#[derive(Debug, Default)]
pub struct ScanReport {
    pub keys: Vec<ByteKey>,
    pub units: u64,
    pub splits: u64,
    pub retries: u64,
    pub elapsed: Duration,
}

/// Hands out tasks and counts the ones not yet finished.
struct Scheduler {
    pool: WorkerPool,
    events: mpsc::UnboundedSender<ScanEvent>,
    next_id: u64,
    outstanding: usize,
}

impl Scheduler {
    async fn dispatch(&mut self, unit: WorkUnit, attempt: u32) -> anyhow::Result<()> {
        let task = ScanTask {
            id: self.next_id,
            unit,
            attempt,
        };
        self.next_id += 1;
        self.outstanding += 1;
        self.pool
            .send_to_next_worker(ScanRequest::Scan {
                task,
                events: self.events.clone(),
            })
            .await
    }
}

/// Reads every unit on a pool of blocking readers, splitting stragglers as
/// they fall behind. Returns every key read.
pub async fn run_scan(
    planner: Arc<ScanPlanner>,
    units: Vec<WorkUnit>,
    config: &DriverConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<ScanReport> {
    let started = Instant::now();
    let pool_token = CancellationToken::new();
    let mut senders = Vec::with_capacity(config.workers);
    for worker_id in 0..config.workers {
        let (tx, rx) = mpsc::channel(WORKER_QUEUE_DEPTH);
        tokio::spawn(worker_loop(
            worker_id,
            rx,
            planner.clone(),
            config.batch_rows,
            pool_token.clone(),
        ));
        senders.push(tx);
    }

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut scheduler = Scheduler {
        pool: WorkerPool::new(senders, pool_token, Duration::from_secs(3)),
        events: events_tx,
        next_id: 0,
        outstanding: 0,
    };

    let result = async {
        let mut report = ScanReport::default();
        for unit in units {
            scheduler.dispatch(unit, 1).await?;
        }

        let rebalancer = Rebalancer::new(config.rebalance_fraction);
        let mut ticker = tokio::time::interval(
            config.rebalance_interval.unwrap_or(Duration::from_secs(3600)),
        );
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut active: HashMap<u64, SplitHandle> = HashMap::new();

        while scheduler.outstanding > 0 {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => bail!("scan cancelled"),
                Some(event) = events_rx.recv() => match event {
                    ScanEvent::Started { id, handle } => {
                        active.insert(id, handle);
                    }
                    ScanEvent::Finished { id, keys } => {
                        active.remove(&id);
                        scheduler.outstanding -= 1;
                        report.units += 1;
                        report.keys.extend(keys);
                    }
                    ScanEvent::Failed { task, error } => {
                        active.remove(&task.id);
                        scheduler.outstanding -= 1;
                        if task.attempt >= MAX_ATTEMPTS {
                            bail!("unit {} failed {} times: {error}", task.unit, task.attempt);
                        }
                        tracing::warn!(unit = %task.unit, attempt = task.attempt, %error, "retrying unit");
                        report.retries += 1;
                        scheduler.dispatch(task.unit, task.attempt + 1).await?;
                    }
                },
                _ = ticker.tick(), if config.rebalance_interval.is_some() => {
                    if let Some((_, residual)) = rebalancer.rebalance(&active) {
                        report.splits += 1;
                        scheduler.dispatch(residual, 1).await?;
                    }
                }
            }
        }
        report.elapsed = started.elapsed();
        Ok::<_, anyhow::Error>(report)
    }
    .await;

    scheduler.pool.shutdown().await;
    result
}
