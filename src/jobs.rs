//! Fixed-size worker pool for fire-and-forget background work.
//!
//! Jobs never see the scene. Anything they produce has to travel back through a channel or
//! shared state the caller owns.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, warn};
use parking_lot::Mutex;

use crate::error::JobError;

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct JobPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    panicked: Arc<AtomicUsize>,
}

impl JobPool {
    /// Starts `threads` workers (at least one).
    pub fn new(threads: usize) -> Result<Self, JobError> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let panicked = Arc::new(AtomicUsize::new(0));
        let mut workers = Vec::new();
        for index in 0..threads.max(1) {
            let receiver = Arc::clone(&receiver);
            let panicked = Arc::clone(&panicked);
            let handle = thread::Builder::new()
                .name(format!("ember-job-{index}"))
                .spawn(move || run_worker(index, &receiver, &panicked))?;
            workers.push(handle);
        }
        debug!("job pool started with {} workers", workers.len());
        Ok(Self {
            sender: Some(sender),
            workers,
            panicked,
        })
    }

    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    /// Queues `job`. A panicking job is logged and counted; the worker keeps running.
    pub fn spawn<F>(&self, job: F) -> Result<(), JobError>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(JobError::ShutDown)?;
        sender.send(Box::new(job)).map_err(|_| JobError::ShutDown)
    }

    /// Jobs that panicked so far.
    pub fn panicked(&self) -> usize {
        self.panicked.load(Ordering::Acquire)
    }

    /// Lets queued jobs finish, then joins every worker. Later spawns fail.
    pub fn shutdown(&mut self) {
        self.sender = None;
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("job worker exited abnormally");
            }
        }
    }
}

impl Drop for JobPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(index: usize, receiver: &Mutex<Receiver<Job>>, panicked: &AtomicUsize) {
    loop {
        // The lock is released before the job runs.
        let job = receiver.lock().recv();
        let Ok(job) = job else {
            break;
        };
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            warn!("job on worker {index} panicked");
            panicked.fetch_add(1, Ordering::AcqRel);
        }
    }
    debug!("job worker {index} stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_jobs_finish_before_shutdown_returns() {
        let mut pool = JobPool::new(3).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            pool.spawn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 100);
        assert!(matches!(pool.spawn(|| {}), Err(JobError::ShutDown)));
    }

    #[test]
    fn panicking_job_does_not_stop_the_worker() {
        let mut pool = JobPool::new(1).unwrap();
        let (tx, rx) = mpsc::channel();
        pool.spawn(|| panic!("boom")).unwrap();
        pool.spawn(move || tx.send(7).unwrap()).unwrap();
        assert_eq!(rx.recv().unwrap(), 7);
        pool.shutdown();
        assert_eq!(pool.panicked(), 1);
    }

    #[test]
    fn zero_threads_still_runs_jobs() {
        let pool = JobPool::new(0).unwrap();
        assert_eq!(pool.threads(), 1);
        let (tx, rx) = mpsc::channel();
        pool.spawn(move || tx.send(()).unwrap()).unwrap();
        rx.recv().unwrap();
    }
}
