//! Render worker pool.
//!
//! Workers run independently on separate threads, pulling jobs from a
//! shared queue, executing them through the executor callback and
//! sleeping briefly when the queue is empty. Shutdown is cooperative:
//! workers finish their current job, then exit.

use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Callback invoked for each job a worker pulls from the queue.
///
/// Runs on a worker thread; anything the job needs must have been copied
/// in at submission time.
pub type JobExecutor<J> = Arc<dyn Fn(J) + Send + Sync>;

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker threads to spawn.
    pub num_workers: usize,

    /// How long an idle worker sleeps before re-checking the queue.
    pub poll_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: 8,
            poll_interval: Duration::from_millis(10),
        }
    }
}

impl WorkerPoolConfig {
    pub fn new(num_workers: usize) -> Self {
        Self { num_workers: num_workers.max(1), ..Self::default() }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Bounded pool of job-executing worker threads.
pub struct WorkerPool<J: Send + 'static> {
    queue: Arc<Mutex<VecDeque<J>>>,
    workers: Vec<Worker>,
    shutdown: Arc<AtomicBool>,
}

impl<J: Send + 'static> WorkerPool<J> {
    /// Create and start a pool executing jobs through `executor`.
    pub fn new(executor: JobExecutor<J>, config: WorkerPoolConfig) -> Self {
        let queue: Arc<Mutex<VecDeque<J>>> = Arc::new(Mutex::new(VecDeque::new()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut workers = Vec::with_capacity(config.num_workers);

        for id in 0..config.num_workers {
            workers.push(Worker::spawn(
                id,
                queue.clone(),
                executor.clone(),
                shutdown.clone(),
                config.poll_interval,
            ));
        }

        Self { queue, workers, shutdown }
    }

    /// Enqueue a job for execution.
    pub fn submit(&self, job: J) {
        self.queue.lock().unwrap().push_back(job);
    }

    /// Jobs waiting in the queue (not counting those mid-execution).
    pub fn queued(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Signal shutdown and wait for workers to finish their current jobs.
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::Release);
        for worker in self.workers.drain(..) {
            worker.join();
        }
    }
}

impl<J: Send + 'static> Drop for WorkerPool<J> {
    fn drop(&mut self) {
        // Detached shutdown: workers observe the flag and exit on their
        // own; remaining queue entries are abandoned.
        self.shutdown.store(true, Ordering::Release);
    }
}

struct Worker {
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn<J: Send + 'static>(
        id: usize,
        queue: Arc<Mutex<VecDeque<J>>>,
        executor: JobExecutor<J>,
        shutdown: Arc<AtomicBool>,
        poll_interval: Duration,
    ) -> Self {
        let thread = thread::Builder::new()
            .name(format!("vellum-render-{id}"))
            .spawn(move || loop {
                if shutdown.load(Ordering::Acquire) {
                    break;
                }
                let job = queue.lock().unwrap().pop_front();
                match job {
                    Some(job) => executor(job),
                    None => thread::sleep(poll_interval),
                }
            })
            .expect("failed to spawn worker thread");

        Self { thread: Some(thread) }
    }

    fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("render worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn config_defaults_to_eight_workers() {
        let config = WorkerPoolConfig::default();
        assert_eq!(config.num_workers, 8);
    }

    #[test]
    fn executes_submitted_jobs() {
        let executed = Arc::new(AtomicUsize::new(0));
        let executed_clone = executed.clone();
        let pool = WorkerPool::new(
            Arc::new(move |n: usize| {
                executed_clone.fetch_add(n, Ordering::SeqCst);
            }),
            WorkerPoolConfig::new(2).with_poll_interval(Duration::from_millis(1)),
        );

        for _ in 0..5 {
            pool.submit(1);
        }
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while executed.load(Ordering::SeqCst) < 5 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(executed.load(Ordering::SeqCst), 5);
        pool.shutdown();
    }

    #[test]
    fn jobs_run_concurrently_across_workers() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (in_flight_c, peak_c) = (in_flight.clone(), peak.clone());

        let pool = WorkerPool::new(
            Arc::new(move |_: ()| {
                let now = in_flight_c.fetch_add(1, Ordering::SeqCst) + 1;
                peak_c.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(30));
                in_flight_c.fetch_sub(1, Ordering::SeqCst);
            }),
            WorkerPoolConfig::new(4).with_poll_interval(Duration::from_millis(1)),
        );

        for _ in 0..4 {
            pool.submit(());
        }
        thread::sleep(Duration::from_millis(100));
        assert!(peak.load(Ordering::SeqCst) >= 2);
        pool.shutdown();
    }

    #[test]
    fn shutdown_joins_without_hanging() {
        let pool: WorkerPool<()> = WorkerPool::new(
            Arc::new(|_| {}),
            WorkerPoolConfig::new(2).with_poll_interval(Duration::from_millis(1)),
        );
        pool.shutdown();
    }
}
