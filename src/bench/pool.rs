//! Fixed-size worker pool with a submit-and-wait barrier.
//!
//! Workers are long-lived threads pulling boxed tasks from one shared
//! crossbeam channel, so at most `worker_count` jobs run at a time and the
//! rest queue. `submit_all` blocks until every job has reported back; a
//! failing or panicking job does not cancel its siblings.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Sender};

use crate::error::{BenchError, Result};

type Task = Box<dyn FnOnce() + Send + 'static>;

pub struct WorkerPool {
    sender: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(worker_count: usize) -> Result<Self> {
        if worker_count == 0 {
            return Err(BenchError::InvalidConfig("worker count must be positive".into()));
        }

        let (sender, receiver) = unbounded::<Task>();
        let mut workers = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("write-worker-{}", i))
                .spawn(move || {
                    for task in receiver.iter() {
                        task();
                    }
                })?;
            workers.push(handle);
        }

        tracing::debug!("worker pool started with {} threads", worker_count);
        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    /// Run every job and wait for all of them.
    ///
    /// Outcomes are returned in submission order. A panic inside a job is
    /// reported as `WorkerPanicked` for that job only.
    pub fn submit_all<T, J>(&self, jobs: Vec<J>) -> Result<Vec<Result<T>>>
    where
        T: Send + 'static,
        J: FnOnce() -> Result<T> + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(BenchError::PoolShutDown)?;
        let count = jobs.len();
        let (result_tx, result_rx) = unbounded::<(usize, Result<T>)>();

        for (index, job) in jobs.into_iter().enumerate() {
            let result_tx = result_tx.clone();
            let task: Task = Box::new(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(job))
                    .unwrap_or_else(|payload| Err(BenchError::WorkerPanicked(panic_message(&*payload))));
                // The receiver only goes away if the submitter itself died.
                let _ = result_tx.send((index, outcome));
            });
            sender.send(task).map_err(|_| BenchError::PoolShutDown)?;
        }
        drop(result_tx);

        let mut slots: Vec<Option<Result<T>>> = (0..count).map(|_| None).collect();
        for (index, outcome) in result_rx.iter().take(count) {
            slots[index] = Some(outcome);
        }
        slots
            .into_iter()
            .map(|slot| slot.ok_or(BenchError::PoolShutDown))
            .collect()
    }

    /// Close the queue and join every worker.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> Result<()> {
        // Dropping the sender ends each worker's receive loop.
        self.sender.take();
        let mut first_error = None;
        for handle in self.workers.drain(..) {
            let name = handle.thread().name().unwrap_or("write-worker").to_string();
            if handle.join().is_err() && first_error.is_none() {
                first_error = Some(BenchError::WorkerPanicked(name));
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("worker pool shutdown: {}", e);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
