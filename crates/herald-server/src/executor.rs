// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Fixed worker pools: plain named threads draining a shared queue. A pool
//! of size one is a strictly-ordered serial executor.

use flume::{Receiver, Sender};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, warn};

pub(crate) type Job = Box<dyn FnOnce() + Send>;

#[derive(Debug, Error)]
#[error("executor is shut down")]
pub(crate) struct Rejected;

pub(crate) struct Executor {
    name: String,
    tx: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Executor {
    pub fn new(name: &str, threads: usize) -> Self {
        let (tx, rx) = flume::unbounded::<Job>();
        let workers = (0..threads)
            .map(|i| {
                let rx = rx.clone();
                std::thread::Builder::new()
                    .name(format!("{name}-{i}"))
                    .spawn(move || worker_loop(rx))
                    .expect("unable to spawn worker thread")
            })
            .collect();
        Self {
            name: name.to_string(),
            tx: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
        }
    }

    /// Jobs run in submission order per worker; with a single worker the
    /// whole pool is FIFO.
    pub fn submit(&self, job: Job) -> Result<(), Rejected> {
        let tx = self.tx.lock();
        match tx.as_ref() {
            Some(tx) => tx.send(job).map_err(|_| Rejected),
            None => Err(Rejected),
        }
    }

    /// Stop accepting work and wait up to `timeout` for queued jobs to
    /// drain. Workers still running after the deadline are left detached.
    pub fn shutdown(&self, timeout: Duration) {
        let Some(tx) = self.tx.lock().take() else {
            return;
        };
        drop(tx);

        let deadline = Instant::now() + timeout;
        let mut workers = self.workers.lock();
        while Instant::now() < deadline && workers.iter().any(|w| !w.is_finished()) {
            std::thread::sleep(Duration::from_millis(5));
        }
        for worker in workers.drain(..) {
            if worker.is_finished() {
                if worker.join().is_err() {
                    error!(pool = %self.name, "worker thread panicked");
                }
            } else {
                warn!(pool = %self.name, "worker did not drain within {timeout:?}; detaching");
            }
        }
    }
}

fn worker_loop(rx: Receiver<Job>) {
    while let Ok(job) = rx.recv() {
        // One bad job must not take the worker down with it.
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!("executor job panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn submitted_jobs_run() {
        let exec = Executor::new("test-exec", 2);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let counter = counter.clone();
            exec.submit(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }
        exec.shutdown(Duration::from_millis(500));
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn single_worker_preserves_submission_order() {
        let exec = Executor::new("test-serial", 1);
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..50 {
            let order = order.clone();
            exec.submit(Box::new(move || order.lock().push(i))).unwrap();
        }
        exec.shutdown(Duration::from_millis(500));
        assert_eq!(*order.lock(), (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn submission_after_shutdown_is_rejected() {
        let exec = Executor::new("test-closed", 1);
        exec.shutdown(Duration::from_millis(100));
        assert!(exec.submit(Box::new(|| {})).is_err());
    }

    #[test]
    fn a_panicking_job_does_not_kill_the_worker() {
        let exec = Executor::new("test-panic", 1);
        let ran = Arc::new(AtomicUsize::new(0));
        exec.submit(Box::new(|| panic!("bad job"))).unwrap();
        let ran_clone = ran.clone();
        exec.submit(Box::new(move || {
            ran_clone.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
        exec.shutdown(Duration::from_millis(500));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
