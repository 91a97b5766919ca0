use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use nbv_core::{JobKey, Requeue};
use tracing::{error, info, warn};

use crate::queue::WorkQueue;
use crate::reconciler::Reconciler;

/// Delay before retrying a pass that failed outside the engine (store outage and the like).
pub const ERROR_REQUEUE: Duration = Duration::from_secs(5);

/// Worker pool over the keyed queue. At most one pass per job runs at a time; distinct jobs
/// run in parallel.
pub struct Controller {
    reconciler: Arc<Reconciler>,
    queue: Arc<WorkQueue>,
    namespace: Option<String>,
    workers: usize,
    resync: Duration,
}

impl Controller {
    pub fn new(reconciler: Arc<Reconciler>, namespace: Option<String>, workers: usize, resync: Duration) -> Self {
        Self { reconciler, queue: Arc::new(WorkQueue::new()), namespace, workers: workers.max(1), resync }
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    /// Queues every job in scope. Returns how many were queued.
    pub fn sync(&self) -> Result<usize> {
        let jobs = self.reconciler.store().list(self.namespace.as_deref()).context("list validation jobs")?;
        let n = jobs.len();
        for job in jobs {
            self.queue.add(job.key());
        }
        Ok(n)
    }

    /// Runs one pass for `key` and schedules the next one from the outcome.
    pub fn process(&self, key: &JobKey) {
        match self.reconciler.reconcile(key) {
            Ok(Some(pass)) => match pass.requeue {
                Requeue::Now => self.queue.add(key.clone()),
                Requeue::AfterSecs(secs) => self.queue.add_after(key.clone(), Duration::from_secs(secs)),
                Requeue::Never => {}
            },
            Ok(None) => {}
            Err(e) => {
                error!(job = %key, error = format!("{e:#}"), "reconcile pass failed");
                self.queue.add_after(key.clone(), ERROR_REQUEUE);
            }
        }
    }

    /// Processes ready keys on the calling thread until none is left. Returns the pass count.
    pub fn drain(&self) -> usize {
        let mut passes = 0;
        while let Some(key) = self.queue.try_get() {
            self.process(&key);
            self.queue.done(&key);
            passes += 1;
        }
        passes
    }

    fn worker(&self, id: usize) {
        info!(worker = id, "worker started");
        while let Some(key) = self.queue.get() {
            self.process(&key);
            self.queue.done(&key);
        }
        info!(worker = id, "worker stopped");
    }

    /// Runs workers and the periodic resync until `stop` is set.
    pub fn run(&self, stop: Arc<AtomicBool>) -> Result<()> {
        info!(workers = self.workers, namespace = self.namespace.as_deref().unwrap_or("*"), "controller starting");
        thread::scope(|scope| {
            for id in 0..self.workers {
                scope.spawn(move || self.worker(id));
            }

            let mut next_sync = Instant::now();
            while !stop.load(Ordering::SeqCst) {
                if Instant::now() >= next_sync {
                    match self.sync() {
                        Ok(n) => info!(jobs = n, "resync"),
                        Err(e) => warn!(error = format!("{e:#}"), "resync failed"),
                    }
                    next_sync = Instant::now() + self.resync;
                }
                thread::sleep(Duration::from_millis(200));
            }
            self.queue.shut_down();
        });
        info!("controller stopped");
        Ok(())
    }
}
