//! Serialization in front of the single local storage worker.
//!
//! Every job handed to a [`DbWorkerLock`] runs alone: the previous job has
//! settled (completed, failed or panicked) before the next one starts, and
//! jobs start in the order they were handed over.

use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, error, warn};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};

/// A unit of storage work. Results travel through the job's own channels.
pub type WorkerJob = BoxFuture<'static, ()>;

/// FIFO, non-overlapping access to the storage worker.
///
/// The order of jobs is fixed when `submit` or `run` is called, not when the
/// returned future is first polled. There is no lock-level error: a job that
/// fails reports through whatever mechanism it carries itself.
pub trait DbWorkerLock: Send + Sync {
    /// Queue `job` and return immediately.
    fn submit(&self, job: WorkerJob);

    /// Queue `job`; the returned future resolves once it has settled.
    fn run(&self, job: WorkerJob) -> BoxFuture<'static, ()>;
}

/// Run `work` through `lock` and hand back its output.
///
/// A panic inside `work` is resumed on the caller. Returns `None` only when
/// the job was dropped without running because its runtime shut down.
pub async fn exec<L, F, Fut, T>(lock: &L, work: F) -> Option<T>
where
    L: DbWorkerLock + ?Sized,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let job = async move {
        let outcome = AssertUnwindSafe(async move { work().await })
            .catch_unwind()
            .await;
        let _ = tx.send(outcome);
    };
    lock.run(Box::pin(job)).await;

    match rx.await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(panic)) => std::panic::resume_unwind(panic),
        Err(_) => None,
    }
}

struct QueuedJob {
    job: WorkerJob,
    done: Option<oneshot::Sender<()>>,
}

impl std::fmt::Debug for QueuedJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedJob")
            .field("awaited", &self.done.is_some())
            .finish()
    }
}

/// Held by whichever job is executing, on the worker task or inline.
type Turn = Arc<AsyncMutex<()>>;

#[derive(Debug)]
struct WorkerState {
    sender: Mutex<mpsc::UnboundedSender<QueuedJob>>,
    turn: Turn,
}

/// Worker lock backed by a single tokio task draining an unbounded queue.
///
/// If the worker task dies with its runtime, the next caller inside a
/// runtime starts a replacement worker there. Without any runtime, `run`
/// executes the job inline, still one job at a time.
#[derive(Debug, Clone)]
pub struct FifoDbWorkerLock {
    state: Arc<WorkerState>,
}

impl FifoDbWorkerLock {
    /// Spawn the worker task on the current tokio runtime.
    ///
    /// Must be called from within a runtime.
    pub fn spawn() -> Self {
        Self::spawn_on(&tokio::runtime::Handle::current())
    }

    /// Spawn the worker task on `handle`.
    pub fn spawn_on(handle: &tokio::runtime::Handle) -> Self {
        let turn: Turn = Arc::new(AsyncMutex::new(()));
        let sender = start_worker(handle, Arc::clone(&turn));
        Self {
            state: Arc::new(WorkerState {
                sender: Mutex::new(sender),
                turn,
            }),
        }
    }

    /// Hand `queued` to the worker, restarting it on the caller's runtime
    /// when the previous one is gone. Gives the job back when no worker can
    /// take it.
    fn enqueue(&self, queued: QueuedJob) -> Option<QueuedJob> {
        let mut sender = match self.state.sender.lock() {
            Ok(sender) => sender,
            Err(poisoned) => poisoned.into_inner(),
        };
        let rejected = match sender.send(queued) {
            Ok(()) => return None,
            Err(rejected) => rejected.0,
        };

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return Some(rejected);
        };
        warn!("[DbWorker] Worker task is gone; restarting it on the current runtime");
        *sender = start_worker(&handle, Arc::clone(&self.state.turn));
        sender.send(rejected).err().map(|rejected| rejected.0)
    }
}

impl DbWorkerLock for FifoDbWorkerLock {
    fn submit(&self, job: WorkerJob) {
        if self.enqueue(QueuedJob { job, done: None }).is_some() {
            error!("[DbWorker] Worker task is gone and no runtime is running; job dropped");
        }
    }

    fn run(&self, job: WorkerJob) -> BoxFuture<'static, ()> {
        let (tx, rx) = oneshot::channel();
        match self.enqueue(QueuedJob {
            job,
            done: Some(tx),
        }) {
            None => async move {
                let _ = rx.await;
            }
            .boxed(),
            Some(rejected) => {
                warn!("[DbWorker] No worker task available; running job inline");
                let turn = Arc::clone(&self.state.turn);
                async move {
                    let _turn = turn.lock().await;
                    let _ = AssertUnwindSafe(rejected.job).catch_unwind().await;
                }
                .boxed()
            }
        }
    }
}

fn start_worker(handle: &tokio::runtime::Handle, turn: Turn) -> mpsc::UnboundedSender<QueuedJob> {
    let (sender, receiver) = mpsc::unbounded_channel();
    handle.spawn(drain_queue(receiver, turn));
    sender
}

async fn drain_queue(mut receiver: mpsc::UnboundedReceiver<QueuedJob>, turn: Turn) {
    let mut seq: u64 = 0;
    while let Some(QueuedJob { job, done }) = receiver.recv().await {
        seq += 1;
        let panicked = {
            let _turn = turn.lock().await;
            AssertUnwindSafe(job).catch_unwind().await.is_err()
        };
        if panicked {
            warn!("[DbWorker] Job #{} panicked; continuing with the next job", seq);
        }
        if let Some(done) = done {
            let _ = done.send(());
        }
    }
    debug!("[DbWorker] Queue closed after {} jobs", seq);
}
