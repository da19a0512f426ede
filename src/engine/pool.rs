//! Bounded worker pool.
//!
//! Jobs flow through one bounded channel shared by every worker; classified
//! candidates fan into a single output channel. The job channel's capacity
//! is twice the worker count, so enumeration blocks on submit once the pool
//! is saturated and in-flight memory stays O(workers). No result ordering
//! is guaranteed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;

use super::executor::Executor;
use crate::mutation::{Mutant, MutantStatus};

/// Identity of one pool worker; the name keys its workdir.
#[derive(Debug, Clone)]
pub struct Worker {
    pub id: usize,
    pub name: String,
}

/// Submission handle. Dropping it closes the job channel; workers drain
/// what is queued and then hang up the output channel.
pub struct WorkerPool {
    job_tx: mpsc::Sender<Mutant>,
}

impl WorkerPool {
    /// Spawn `workers` tasks draining a shared job queue into the returned
    /// results channel. When `cancel` flips, queued jobs are emitted as
    /// `Skipped` without execution.
    pub fn spawn(
        executor: Arc<Executor>,
        workers: usize,
        cancel: Arc<AtomicBool>,
    ) -> (Self, mpsc::Receiver<Mutant>) {
        let capacity = (workers * 2).max(2);
        let (job_tx, job_rx) = mpsc::channel::<Mutant>(capacity);
        let job_rx = Arc::new(AsyncMutex::new(job_rx));
        let (out_tx, out_rx) = mpsc::channel::<Mutant>(capacity);

        for id in 0..workers.max(1) {
            let worker = Worker {
                id,
                name: format!("worker-{id}"),
            };
            tokio::spawn(worker_loop(
                worker,
                Arc::clone(&job_rx),
                out_tx.clone(),
                Arc::clone(&executor),
                Arc::clone(&cancel),
            ));
        }

        (Self { job_tx }, out_rx)
    }

    /// Queue a candidate. Blocks while the pool is saturated.
    pub async fn submit(&self, mutant: Mutant) -> Result<()> {
        self.job_tx
            .send(mutant)
            .await
            .map_err(|_| anyhow::anyhow!("worker pool is closed"))
    }
}

async fn worker_loop(
    worker: Worker,
    job_rx: Arc<AsyncMutex<mpsc::Receiver<Mutant>>>,
    out_tx: mpsc::Sender<Mutant>,
    executor: Arc<Executor>,
    cancel: Arc<AtomicBool>,
) {
    tracing::debug!("worker {} ({}) started", worker.id, worker.name);
    loop {
        // Hold the receiver lock only for the dequeue, never across a job.
        let job = {
            let mut rx = job_rx.lock().await;
            rx.recv().await
        };
        let Some(mut mutant) = job else {
            break;
        };

        if cancel.load(Ordering::Relaxed) {
            if mutant.status().is_runnable() {
                mutant.set_status(MutantStatus::Skipped);
            }
            if out_tx.send(mutant).await.is_err() {
                break;
            }
            continue;
        }

        let mutant = executor.run(&worker, mutant).await;
        if out_tx.send(mutant).await.is_err() {
            break;
        }
    }
}
