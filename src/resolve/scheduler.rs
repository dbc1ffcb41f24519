//! Adaptive execution of resolution units
//!
//! Units start running inline on the caller's thread. The first unit whose
//! wall time crosses the configured threshold flips the scheduler into
//! pooled mode: a fixed set of worker threads consuming a bounded channel.
//! Once flipped it stays flipped for the rest of the run.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, info, warn};

type Unit = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Default, Clone, Copy)]
pub struct SchedulerStats {
    pub inline_units: usize,
    pub pooled_units: usize,
    pub switched: bool,
}

pub struct AdaptiveScheduler {
    workers: usize,
    capacity: usize,
    threshold: Duration,
    deadline: Duration,
    pool: Option<WorkerPool>,
    stats: SchedulerStats,
}

impl AdaptiveScheduler {
    pub fn new(workers: usize, capacity: usize, threshold: Duration, deadline: Duration) -> Self {
        Self {
            workers: workers.max(1),
            capacity: capacity.max(1),
            threshold,
            deadline,
            pool: None,
            stats: SchedulerStats::default(),
        }
    }

    /// Run or enqueue one unit. Blocks when the pool channel is full, which
    /// bounds how far producers can run ahead of the workers.
    pub fn submit<F>(&mut self, unit: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match &self.pool {
            Some(pool) => {
                pool.submit(Box::new(unit));
                self.stats.pooled_units += 1;
            }
            None => {
                let started = Instant::now();
                unit();
                self.stats.inline_units += 1;
                let elapsed = started.elapsed();
                if elapsed >= self.threshold {
                    info!(
                        elapsed_ms = elapsed.as_millis() as u64,
                        workers = self.workers,
                        "slow resolution unit, switching to worker pool"
                    );
                    self.pool = Some(WorkerPool::spawn(self.workers, self.capacity));
                    self.stats.switched = true;
                }
            }
        }
    }

    /// Drain outstanding units and wait for the workers to finish.
    pub fn finish(mut self) -> SchedulerStats {
        if let Some(pool) = self.pool.take() {
            pool.join(self.deadline);
        }
        debug!(
            inline = self.stats.inline_units,
            pooled = self.stats.pooled_units,
            "scheduler drained"
        );
        self.stats
    }
}

struct WorkerPool {
    tx: Sender<Unit>,
    done_rx: Receiver<usize>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    fn spawn(workers: usize, capacity: usize) -> Self {
        let (tx, rx): (Sender<Unit>, Receiver<Unit>) = bounded(capacity);
        let (done_tx, done_rx) = bounded(workers);
        let handles = (0..workers)
            .map(|id| {
                let rx = rx.clone();
                let done_tx = done_tx.clone();
                thread::Builder::new()
                    .name(format!("resolve-worker-{id}"))
                    .spawn(move || {
                        let mut ran = 0usize;
                        for unit in rx.iter() {
                            unit();
                            ran += 1;
                        }
                        debug!(worker = id, units = ran, "worker finished");
                        let _ = done_tx.send(ran);
                    })
                    .expect("failed to spawn resolve worker")
            })
            .collect();
        Self { tx, done_rx, handles }
    }

    fn submit(&self, unit: Unit) {
        // Only fails if every worker has panicked and dropped the receiver.
        if self.tx.send(unit).is_err() {
            warn!("worker pool is gone, dropping resolution unit");
        }
    }

    /// Close the channel and wait for workers, up to the deadline. External
    /// diff calls can be extremely slow, so the deadline is generous.
    fn join(self, deadline: Duration) {
        drop(self.tx);
        let cutoff = Instant::now() + deadline;
        let mut pending = self.handles.len();
        while pending > 0 {
            let remaining = cutoff.saturating_duration_since(Instant::now());
            match self.done_rx.recv_timeout(remaining) {
                Ok(_) => pending -= 1,
                Err(_) => {
                    warn!(pending, "deadline reached waiting for resolve workers");
                    return;
                }
            }
        }
        for handle in self.handles {
            if handle.join().is_err() {
                warn!("resolve worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter_unit(counter: &Arc<AtomicUsize>) -> impl FnOnce() + Send + 'static {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn fast_units_stay_inline() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scheduler = AdaptiveScheduler::new(
            4,
            8,
            Duration::from_secs(60),
            Duration::from_secs(5),
        );
        for _ in 0..10 {
            scheduler.submit(counter_unit(&counter));
        }
        let stats = scheduler.finish();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        assert_eq!(stats.inline_units, 10);
        assert_eq!(stats.pooled_units, 0);
        assert!(!stats.switched);
    }

    #[test]
    fn slow_unit_triggers_pool() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scheduler = AdaptiveScheduler::new(
            2,
            4,
            Duration::from_millis(1),
            Duration::from_secs(10),
        );
        {
            let counter = Arc::clone(&counter);
            scheduler.submit(move || {
                thread::sleep(Duration::from_millis(20));
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        for _ in 0..20 {
            scheduler.submit(counter_unit(&counter));
        }
        let stats = scheduler.finish();
        assert_eq!(counter.load(Ordering::SeqCst), 21);
        assert!(stats.switched);
        assert_eq!(stats.inline_units, 1);
        assert_eq!(stats.pooled_units, 20);
    }

    #[test]
    fn every_pooled_unit_runs_before_finish_returns() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scheduler = AdaptiveScheduler::new(
            3,
            2,
            Duration::ZERO,
            Duration::from_secs(30),
        );
        for _ in 0..50 {
            scheduler.submit(counter_unit(&counter));
        }
        scheduler.finish();
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }
}
