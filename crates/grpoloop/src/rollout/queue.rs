//! Double-buffered rollout results.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::distribute::DistributionPlan;
use crate::infer::InferOutput;
use crate::session::Example;
use crate::{GrpoError, Result};

/// One buffered generation result: the inputs it was produced for, the raw
/// engine outputs, and the distribution plan needed to reorder them.
///
/// Produced exactly once and consumed exactly once per training step.
#[derive(Debug)]
pub struct DataCache {
    pub inputs: Vec<Example>,
    pub outputs: Vec<InferOutput>,
    pub plan: DistributionPlan,
}

impl DataCache {
    /// Cache with no outputs, used by training-only ranks.
    pub fn empty(inputs: Vec<Example>, plan: DistributionPlan) -> Self {
        Self {
            inputs,
            outputs: Vec::new(),
            plan,
        }
    }
}

type InferJob = Box<dyn FnOnce() -> DataCache + Send + 'static>;

/// Single-producer/single-consumer queue backing asynchronous generation.
///
/// A dedicated worker thread executes at most one inference job at a time;
/// its result lands on a single-slot channel. The training step submits the
/// current step's job and then blocks on the result queued by the previous
/// step's submission, so training at step N overlaps with generation for step
/// N+1 at the cost of one step of staleness. The result is enqueued on the
/// worker thread, not the caller's.
pub struct AsyncRolloutQueue {
    job_tx: Option<Sender<InferJob>>,
    cache_tx: Sender<DataCache>,
    cache_rx: Receiver<DataCache>,
    worker: Option<JoinHandle<()>>,
}

impl AsyncRolloutQueue {
    pub fn new() -> Self {
        let (job_tx, job_rx) = bounded::<InferJob>(1);
        let (cache_tx, cache_rx) = bounded::<DataCache>(1);

        let worker_tx = cache_tx.clone();
        let worker = thread::Builder::new()
            .name("rollout-infer".to_string())
            .spawn(move || {
                while let Ok(job) = job_rx.recv() {
                    let cache = job();
                    if worker_tx.send(cache).is_err() {
                        break;
                    }
                }
            })
            .expect("failed to spawn rollout worker thread");

        Self {
            job_tx: Some(job_tx),
            cache_tx,
            cache_rx,
            worker: Some(worker),
        }
    }

    /// Hand a job to the background worker. At most one job may be in flight.
    pub fn submit(&self, job: InferJob) -> Result<()> {
        let tx = self
            .job_tx
            .as_ref()
            .ok_or_else(|| GrpoError::Protocol("rollout queue is shut down".to_string()))?;
        tx.send(job)
            .map_err(|_| GrpoError::Protocol("rollout worker thread has exited".to_string()))
    }

    /// Enqueue an already-complete cache (prefetch, or training-only ranks).
    pub fn put(&self, cache: DataCache) -> Result<()> {
        self.cache_tx
            .send(cache)
            .map_err(|_| GrpoError::Protocol("rollout queue receiver dropped".to_string()))
    }

    /// Block until the buffered cache is available and take it.
    pub fn get(&self) -> Result<DataCache> {
        self.cache_rx
            .recv()
            .map_err(|_| GrpoError::Protocol("rollout worker thread has exited".to_string()))
    }

    /// Block until a cache is queued, without consuming it. Used to keep a
    /// weight push from racing an in-flight generation.
    pub fn wait_ready(&self) {
        while self.cache_rx.is_empty() {
            thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Default for AsyncRolloutQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AsyncRolloutQueue {
    fn drop(&mut self) {
        drop(self.job_tx.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
