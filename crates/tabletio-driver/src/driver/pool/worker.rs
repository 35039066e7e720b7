use crate::driver::scan::{ScanEvent, ScanRequest, ScanTask};
use std::sync::Arc;
use tabletio::{ReadOptions, RowBatch, ScanPlanner};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Worker task reading one work unit at a time.
///
/// Readers block, so each unit is read on the blocking thread pool while the
/// worker task waits. Progress is reported on the task's event channel:
/// `Started` hands the coordinator a split handle, then exactly one of
/// `Finished` or `Failed` follows.
pub async fn worker_loop(
    worker_id: usize,
    mut rx: mpsc::Receiver<ScanRequest>,
    planner: Arc<ScanPlanner>,
    batch_rows: usize,
    shutdown: CancellationToken,
) {
    tracing::trace!("Worker {worker_id} started");

    while let Some(request) = rx.recv().await {
        match request {
            ScanRequest::Scan { task, events } => {
                let planner = planner.clone();
                let shutdown = shutdown.clone();
                let failed_events = events.clone();
                let failed_task = task.clone();
                let joined = tokio::task::spawn_blocking(move || {
                    scan_unit(worker_id, &planner, task, batch_rows, &events, &shutdown);
                })
                .await;
                if let Err(err) = joined {
                    tracing::error!("Worker {worker_id} reader panicked: {err}");
                    let _ = failed_events.send(ScanEvent::Failed {
                        task: failed_task,
                        error: err.to_string(),
                    });
                }
            }
            ScanRequest::Shutdown { response } => {
                tracing::debug!("Worker {worker_id} received shutdown signal");
                if response.send(()).is_err() {
                    tracing::error!("Worker {worker_id} failed to acknowledge shutdown");
                }
                break;
            }
        }
    }

    tracing::trace!("Worker {worker_id} stopped");
}

fn scan_unit(
    worker_id: usize,
    planner: &ScanPlanner,
    task: ScanTask,
    batch_rows: usize,
    events: &mpsc::UnboundedSender<ScanEvent>,
    shutdown: &CancellationToken,
) {
    let advancer = match RowBatch::new(batch_rows) {
        Ok(advancer) => advancer,
        Err(err) => {
            let _ = events.send(ScanEvent::Failed {
                task,
                error: err.to_string(),
            });
            return;
        }
    };
    let mut reader = planner.open_reader(task.unit.clone(), ReadOptions::default(), advancer);
    let _ = events.send(ScanEvent::Started {
        id: task.id,
        handle: reader.split_handle(),
    });

    let mut keys = Vec::new();
    let mut step = reader.start();
    while let Ok(true) = step {
        if shutdown.is_cancelled() {
            break;
        }
        if let Some(batch) = reader.take_current() {
            keys.extend(batch.into_iter().map(|row| row.key));
        }
        step = reader.advance();
    }
    // What the reader still owns after any split.
    let unit = reader.current_unit();
    let rows_read = reader.rows_read();
    let elapsed = reader.elapsed();
    reader.close();

    let event = match step {
        Ok(_) if shutdown.is_cancelled() => ScanEvent::Failed {
            task: ScanTask { unit, ..task },
            error: "scan cancelled".to_string(),
        },
        Ok(_) => {
            tracing::debug!(
                worker = worker_id,
                unit = %unit,
                rows = rows_read,
                elapsed_ms = elapsed.as_millis() as u64,
                "unit finished"
            );
            ScanEvent::Finished { id: task.id, keys }
        }
        Err(err) => {
            tracing::warn!(worker = worker_id, unit = %unit, error = %err, "unit failed");
            ScanEvent::Failed {
                task: ScanTask { unit, ..task },
                error: err.to_string(),
            }
        }
    };
    let _ = events.send(event);
}
