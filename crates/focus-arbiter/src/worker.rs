//! Single-threaded FIFO job queue.
//!
//! Both asynchronous hops of the arbiter (remote notification delivery and the
//! deferred owner commit) run on a [`SerialQueue`]: one named OS thread drains
//! an unbounded crossbeam channel in order. Jobs that panic are caught and
//! logged so one misbehaving endpoint cannot stop the queue.

use std::{
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    thread::{self, JoinHandle, ThreadId},
    time::Duration,
};

use crossbeam_channel::{self as chan, Receiver, Sender};
use tracing::{error, trace, warn};

use crate::{Error, Result};

/// A unit of work.
type Job = Box<dyn FnOnce() + Send + 'static>;

/// Messages understood by the worker loop.
enum Msg {
    /// Run a job.
    Run(Job),
    /// Acknowledge once every earlier message has been processed.
    Barrier(Sender<()>),
}

/// One worker thread executing jobs in submission order.
pub struct SerialQueue {
    /// Thread name, also used in logs.
    name: String,
    /// Job sender; `None` after shutdown.
    tx: Option<Sender<Msg>>,
    /// Worker thread handle; `None` after shutdown.
    handle: Option<JoinHandle<()>>,
    /// Id of the worker thread, used to avoid self-joins and self-waits.
    worker: ThreadId,
}

impl fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialQueue")
            .field("name", &self.name)
            .field("open", &self.tx.is_some())
            .finish()
    }
}

impl SerialQueue {
    /// Spawn a worker thread named `name`.
    pub fn spawn(name: &str) -> Result<Self> {
        let (tx, rx) = chan::unbounded::<Msg>();
        let thread_name = name.to_string();
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || worker_loop(&thread_name, &rx))?;
        let worker = handle.thread().id();
        Ok(Self {
            name: name.to_string(),
            tx: Some(tx),
            handle: Some(handle),
            worker,
        })
    }

    /// True when called from this queue's worker thread.
    pub fn on_worker(&self) -> bool {
        thread::current().id() == self.worker
    }

    /// Enqueue a job behind everything already queued.
    pub fn post<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| Error::QueueClosed(self.name.clone()))?;
        tx.send(Msg::Run(Box::new(job)))
            .map_err(|_| Error::QueueClosed(self.name.clone()))
    }

    /// Wait until every job posted before this call has run.
    ///
    /// Returns false on timeout, after shutdown, or when called from the
    /// worker itself (which would wait on its own progress).
    pub fn drain(&self, timeout: Duration) -> bool {
        if self.on_worker() {
            warn!(queue = %self.name, "drain_from_worker_ignored");
            return false;
        }
        let Some(tx) = self.tx.as_ref() else {
            return false;
        };
        let (ack_tx, ack_rx) = chan::bounded(1);
        if tx.send(Msg::Barrier(ack_tx)).is_err() {
            return false;
        }
        ack_rx.recv_timeout(timeout).is_ok()
    }

    /// Stop accepting jobs, run what is queued, and join the worker.
    ///
    /// When invoked on the worker thread itself the join is skipped; the
    /// thread exits on its own once the channel is drained.
    pub fn shutdown(&mut self) {
        drop(self.tx.take());
        let Some(handle) = self.handle.take() else {
            return;
        };
        if self.on_worker() {
            trace!(queue = %self.name, "shutdown_on_worker_detached");
            return;
        }
        if handle.join().is_err() {
            error!(queue = %self.name, "worker_join_failed");
        }
        trace!(queue = %self.name, "queue_shutdown");
    }
}

impl Drop for SerialQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Drain `rx` until every sender is gone.
fn worker_loop(name: &str, rx: &Receiver<Msg>) {
    trace!(queue = name, "worker_start");
    while let Ok(msg) = rx.recv() {
        match msg {
            Msg::Run(job) => {
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    error!(queue = name, "job_panicked");
                }
            }
            Msg::Barrier(ack) => {
                ack.send(()).ok();
            }
        }
    }
    trace!(queue = name, "worker_exit");
}
