//! One worker thread per user-initiated operation.
//!
//! The worker reports its outcome exactly once through a capacity-1
//! channel. A panic inside the operation is caught and reported as
//! [`Error::Job`] (converted into the job's own error type) instead of
//! tearing down the caller.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;

use crossbeam_channel::{bounded, Receiver, TryRecvError};
use log::{debug, error};

use crate::error::{Error, Result};

pub struct JobHandle<T, E = Error> {
    name: String,
    rx: Receiver<std::result::Result<T, E>>,
    worker: Option<thread::JoinHandle<()>>,
    reported: bool,
}

/// Run `work` on a named worker thread.
pub fn spawn<T, E, F>(name: &str, work: F) -> Result<JobHandle<T, E>>
where
    T: Send + 'static,
    E: From<Error> + Send + 'static,
    F: FnOnce() -> std::result::Result<T, E> + Send + 'static,
{
    let (tx, rx) = bounded(1);
    let job_name = name.to_string();
    let worker = thread::Builder::new()
        .name(format!("job-{name}"))
        .spawn(move || {
            let outcome = catch_unwind(AssertUnwindSafe(work)).unwrap_or_else(|payload| {
                let reason = panic_message(payload.as_ref());
                error!("job '{job_name}' panicked: {reason}");
                Err(Error::Job(job_name.clone(), reason).into())
            });
            // The receiver may already be gone if the caller lost interest.
            if tx.send(outcome).is_err() {
                debug!("job '{job_name}' finished after its handle was dropped");
            }
        })?;
    debug!("started job '{name}'");
    Ok(JobHandle {
        name: name.to_string(),
        rx,
        worker: Some(worker),
        reported: false,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl<T, E: From<Error>> JobHandle<T, E> {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn vanished(&self) -> E {
        Error::Job(self.name.clone(), "worker exited without a result".into()).into()
    }

    fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            // Panics were already caught inside the worker.
            let _ = worker.join();
        }
    }

    /// Block until the job finishes.
    pub fn wait(mut self) -> std::result::Result<T, E> {
        let outcome = self.rx.recv().unwrap_or_else(|_| Err(self.vanished()));
        self.reported = true;
        self.join();
        outcome
    }

    /// The outcome if the job has finished; `None` while it runs and after
    /// the outcome was already taken.
    pub fn try_result(&mut self) -> Option<std::result::Result<T, E>> {
        if self.reported {
            return None;
        }
        let outcome = match self.rx.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err(self.vanished()),
        };
        self.reported = true;
        self.join();
        Some(outcome)
    }
}
