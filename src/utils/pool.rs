//! Fixed-size worker pool.
//!
//! A small set of named OS threads fed by a job channel. Each engine owns
//! its own pool, so tests can run isolated engines with no process-wide
//! shared executor. The reader, writer and handshake loops occupy workers
//! for the lifetime of a connection, so the pool must be sized to hold them
//! all plus the connect job (the default of four does).

use crate::error::Result;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed pool of named worker threads.
pub struct WorkerPool {
    name: String,
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers named `{name}-{index}`.
    ///
    /// # Errors
    /// Propagates thread-spawn failures from the OS.
    pub fn new(name: &str, size: usize) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = Vec::with_capacity(size.max(1));
        for index in 0..size.max(1) {
            let receiver = Arc::clone(&receiver);
            let handle = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || worker_loop(&receiver))?;
            workers.push(handle);
        }

        debug!(pool = name, workers = workers.len(), "worker pool started");
        Ok(Self {
            name: name.to_string(),
            sender: Some(sender),
            workers,
        })
    }

    /// Submit a job. Jobs run in submission order per worker, with no
    /// fairness guarantee across workers.
    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(sender) = &self.sender {
            if sender.send(Box::new(job)).is_err() {
                warn!(pool = %self.name, "job submitted to a pool that is shutting down");
            }
        }
    }
}

fn worker_loop(receiver: &Mutex<Receiver<Job>>) {
    loop {
        let job = {
            let guard = receiver.lock().unwrap_or_else(PoisonError::into_inner);
            guard.recv()
        };
        match job {
            Ok(job) => job(),
            // Channel closed: the pool is shutting down.
            Err(_) => break,
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        drop(self.sender.take());
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!(pool = %self.name, "worker thread panicked");
            }
        }
        debug!(pool = %self.name, "worker pool stopped");
    }
}
