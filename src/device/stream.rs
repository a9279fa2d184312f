use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use rayon::ThreadPool;
use tracing::{debug, trace, warn};

use crate::errors::{ExtenderError, SyncFault};

type WorkItem = Box<dyn FnOnce(&ThreadPool) -> Result<(), ExtenderError> + Send>;

enum StreamCommand {
    Work(WorkItem, Option<FaultTracker>),
    Synchronize(Sender<Option<SyncFault>>),
}

/// Records whether any work item enqueued with it failed or was skipped.
///
/// A stream reports a fault only to the first synchronization after it. When several clients
/// share a stream, each tags its work with its own tracker to learn whether that work actually
/// ran. Once a tracker holds a fault, further work tagged with it is skipped as well, until the
/// fault is taken.
#[derive(Clone, Debug, Default)]
pub struct FaultTracker {
    fault: Arc<Mutex<Option<SyncFault>>>,
}

impl FaultTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_faulted(&self) -> bool {
        self.fault.lock().is_some()
    }

    /// Take the recorded fault, if any, clearing the tracker.
    pub fn take(&self) -> Option<SyncFault> {
        self.fault.lock().take()
    }

    /// Keeps the first fault recorded.
    fn record(&self, fault: &SyncFault) {
        self.fault.lock().get_or_insert_with(|| fault.clone());
    }
}

static NEXT_STREAM_ID: AtomicUsize = AtomicUsize::new(0);

/// An ordered, asynchronous work queue.
///
/// Work items enqueued on a stream run one after the other, in enqueue order, on a dedicated
/// worker thread. Kernels inside a work item use the stream's thread pool for data-parallel
/// execution. Enqueueing never blocks; [`ComputeStream::synchronize`] waits for everything
/// enqueued so far and reports the first fault raised since the previous synchronization.
///
/// Cloning a stream yields another handle to the same queue. The worker shuts down once the last
/// handle is dropped, after draining the queue.
#[derive(Clone)]
pub struct ComputeStream {
    inner: Arc<StreamInner>,
}

struct StreamInner {
    id: usize,
    sender: Option<Sender<StreamCommand>>,
    worker: Option<JoinHandle<()>>,
}

impl ComputeStream {
    /// Create a stream whose kernels use rayon's default number of threads.
    pub fn new() -> Result<Self, ExtenderError> {
        Self::build(None)
    }

    pub fn with_threads(num_threads: usize) -> Result<Self, ExtenderError> {
        Self::build(Some(num_threads))
    }

    fn build(num_threads: Option<usize>) -> Result<Self, ExtenderError> {
        let id = NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed);

        let mut pool_builder = rayon::ThreadPoolBuilder::new()
            .thread_name(move |i| format!("stream-{id}-kernel-{i}"));
        if let Some(n) = num_threads {
            pool_builder = pool_builder.num_threads(n);
        }
        let pool = pool_builder.build()
            .map_err(|e| ExtenderError::StreamCreation(e.to_string()))?;

        let (tx, rx) = crossbeam_channel::unbounded();
        let worker = thread::Builder::new()
            .name(format!("stream-{id}"))
            .spawn(move || run_worker(id, rx, pool))?;

        debug!(stream = id, ?num_threads, "created compute stream");

        Ok(Self {
            inner: Arc::new(StreamInner {
                id,
                sender: Some(tx),
                worker: Some(worker),
            })
        })
    }

    pub fn id(&self) -> usize {
        self.inner.id
    }

    /// Schedule `work` on this stream. Returns immediately.
    pub fn enqueue<F>(&self, work: F) -> Result<(), ExtenderError>
    where
        F: FnOnce(&ThreadPool) -> Result<(), ExtenderError> + Send + 'static,
    {
        self.send(StreamCommand::Work(Box::new(work), None))
    }

    /// Like [`ComputeStream::enqueue`], recording a failure of `work`, or its skipping after an
    /// earlier fault, in `tracker`.
    pub fn enqueue_tracked<F>(&self, work: F, tracker: &FaultTracker) -> Result<(), ExtenderError>
    where
        F: FnOnce(&ThreadPool) -> Result<(), ExtenderError> + Send + 'static,
    {
        self.send(StreamCommand::Work(Box::new(work), Some(tracker.clone())))
    }

    /// Block until all work enqueued so far has completed.
    pub fn synchronize(&self) -> Result<(), ExtenderError> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.send(StreamCommand::Synchronize(tx))?;

        match rx.recv() {
            Ok(None) => Ok(()),
            Ok(Some(fault)) => Err(fault.into()),
            Err(_) => Err(SyncFault::StreamClosed.into()),
        }
    }

    /// Like [`ComputeStream::synchronize`], but gives up after `timeout`. The work keeps running
    /// after a timeout; a later synchronization still observes its outcome.
    pub fn synchronize_timeout(&self, timeout: Duration) -> Result<(), ExtenderError> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.send(StreamCommand::Synchronize(tx))?;

        match rx.recv_timeout(timeout) {
            Ok(None) => Ok(()),
            Ok(Some(fault)) => Err(fault.into()),
            Err(RecvTimeoutError::Timeout) => Err(SyncFault::Timeout.into()),
            Err(RecvTimeoutError::Disconnected) => Err(SyncFault::StreamClosed.into()),
        }
    }

    fn send(&self, cmd: StreamCommand) -> Result<(), ExtenderError> {
        self.inner.sender.as_ref()
            .ok_or(SyncFault::StreamClosed)?
            .send(cmd)
            .map_err(|_| SyncFault::StreamClosed.into())
    }
}

impl fmt::Debug for ComputeStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputeStream")
            .field("id", &self.inner.id)
            .finish()
    }
}

impl Drop for StreamInner {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain the queue and exit
        self.sender.take();

        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!(stream = self.id, "compute stream worker terminated abnormally");
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn run_worker(id: usize, rx: Receiver<StreamCommand>, pool: ThreadPool) {
    let mut fault: Option<SyncFault> = None;

    for cmd in rx {
        match cmd {
            StreamCommand::Work(work, tracker) => {
                // Work following a fault belongs to an invocation that already failed
                if let Some(stream_fault) = &fault {
                    trace!(stream = id, "skipping work item after fault");
                    if let Some(tracker) = &tracker {
                        tracker.record(stream_fault);
                    }
                    continue;
                }

                if tracker.as_ref().is_some_and(FaultTracker::is_faulted) {
                    trace!(stream = id, "skipping work item of a failed invocation");
                    continue;
                }

                let outcome = panic::catch_unwind(AssertUnwindSafe(|| work(&pool)));
                let work_fault = match outcome {
                    Ok(Ok(())) => continue,
                    Ok(Err(err)) => {
                        warn!(stream = id, "work item failed: {err}");
                        SyncFault::WorkFailed(err.to_string())
                    },
                    Err(payload) => {
                        let msg = panic_message(payload.as_ref());
                        warn!(stream = id, "work item panicked: {msg}");
                        SyncFault::WorkPanicked(msg)
                    }
                };

                if let Some(tracker) = &tracker {
                    tracker.record(&work_fault);
                }
                fault = Some(work_fault);
            },
            StreamCommand::Synchronize(reply) => {
                // The waiting side may have timed out already
                let _ = reply.send(fault.take());
            }
        }
    }

    debug!(stream = id, "compute stream worker shutting down");
}
