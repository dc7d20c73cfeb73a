//! Background loop runner.
//!
//! Owns one current-thread tokio runtime and a [`LocalSet`] on a dedicated OS
//! thread. The loop owns a piece of state `S` that never leaves that thread, so
//! `S` may be `!Send`. Other threads reach it only by submitting jobs, which
//! run one at a time in submission order. Tasks spawned with
//! `tokio::task::spawn_local` from inside a job keep running between jobs.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::LocalSet;
use tracing::{debug, error, info};

type Job<S> = Box<dyn for<'a> FnOnce(&'a mut S) -> LocalBoxFuture<'a, ()> + Send>;

/// Errors from the runner bridge.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The loop thread or its runtime could not be created.
    #[error("failed to start loop thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The loop is not running.
    #[error("loop is not running")]
    Stopped,

    /// A job tried to wait on the loop from the loop thread itself.
    #[error("cannot submit to the loop from its own thread")]
    Reentrant,

    /// The submitted work panicked. The loop keeps running.
    #[error("submitted work panicked: {0}")]
    Panicked(String),
}

struct Running<S> {
    tx: mpsc::UnboundedSender<Job<S>>,
    thread: JoinHandle<()>,
    thread_id: ThreadId,
}

/// A single scheduling loop on a dedicated thread.
pub struct LoopRunner<S: 'static> {
    name: String,
    running: Mutex<Option<Running<S>>>,
}

impl<S: 'static> LoopRunner<S> {
    /// Create a runner. Nothing runs until [`start`](Self::start).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            running: Mutex::new(None),
        }
    }

    /// Start the loop if it is not already running.
    ///
    /// `init` builds the loop-owned state on the loop thread. When the loop is
    /// already running this is a no-op and `init` is dropped unused.
    pub fn start<F>(&self, init: F) -> Result<(), RunnerError>
    where
        F: FnOnce() -> S + Send + 'static,
    {
        let mut running = self.lock();
        if running.as_ref().is_some_and(|r| !r.thread.is_finished()) {
            return Ok(());
        }

        let (tx, rx) = mpsc::unbounded_channel::<Job<S>>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<std::io::Result<()>>();
        let name = self.name.clone();

        let thread = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                let local = LocalSet::new();
                local.block_on(&runtime, drive(init, rx));
                info!(runner = %name, "Loop stopped");
            })
            .map_err(RunnerError::Spawn)?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(RunnerError::Spawn(e));
            }
            Err(_) => {
                let _ = thread.join();
                return Err(RunnerError::Stopped);
            }
        }

        info!(runner = %self.name, "Loop started");
        *running = Some(Running {
            tx,
            thread_id: thread.thread().id(),
            thread,
        });
        Ok(())
    }

    /// Run `work` on the loop and block the calling thread until it finishes.
    ///
    /// Must not be called from inside an async runtime; use [`call`](Self::call)
    /// there instead.
    pub fn submit<T, F>(&self, work: F) -> Result<T, RunnerError>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a mut S) -> LocalBoxFuture<'a, T> + Send + 'static,
    {
        let reply = self.enqueue(work)?;
        reply.blocking_recv().map_err(|_| RunnerError::Stopped)?
    }

    /// Run `work` on the loop and await its result.
    pub async fn call<T, F>(&self, work: F) -> Result<T, RunnerError>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a mut S) -> LocalBoxFuture<'a, T> + Send + 'static,
    {
        let reply = self.enqueue(work)?;
        reply.await.map_err(|_| RunnerError::Stopped)?
    }

    /// Stop accepting work and wait for already-queued jobs to finish.
    ///
    /// In-flight jobs are not cancelled. Tasks spawned onto the loop that are
    /// still pending once the queue drains are dropped with the loop.
    pub fn stop(&self) {
        let Some(Running {
            tx,
            thread,
            thread_id,
        }) = self.lock().take()
        else {
            return;
        };
        drop(tx);

        if thread::current().id() == thread_id {
            debug!(runner = %self.name, "Stop requested from loop thread, not joining");
            return;
        }
        if thread.join().is_err() {
            error!(runner = %self.name, "Loop thread panicked");
        }
    }

    /// Whether the loop thread is alive.
    pub fn is_running(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|r| !r.thread.is_finished())
    }

    fn enqueue<T, F>(
        &self,
        work: F,
    ) -> Result<oneshot::Receiver<Result<T, RunnerError>>, RunnerError>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a mut S) -> LocalBoxFuture<'a, T> + Send + 'static,
    {
        let running = self.lock();
        let running = running.as_ref().ok_or(RunnerError::Stopped)?;
        if thread::current().id() == running.thread_id {
            return Err(RunnerError::Reentrant);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let job = boxed_job(move |state: &mut S| {
            Box::pin(async move {
                let outcome = AssertUnwindSafe(async move { work(state).await })
                    .catch_unwind()
                    .await
                    .map_err(|payload| RunnerError::Panicked(panic_message(payload.as_ref())));
                let _ = reply_tx.send(outcome);
            })
        });

        running.tx.send(job).map_err(|_| RunnerError::Stopped)?;
        Ok(reply_rx)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Running<S>>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Build the state and run jobs until every sender is gone.
async fn drive<S, F>(init: F, mut rx: mpsc::UnboundedReceiver<Job<S>>)
where
    F: FnOnce() -> S,
{
    let mut state = init();
    while let Some(job) = rx.recv().await {
        job(&mut state).await;
    }
}

fn boxed_job<S, F>(job: F) -> Job<S>
where
    F: for<'a> FnOnce(&'a mut S) -> LocalBoxFuture<'a, ()> + Send + 'static,
{
    Box::new(job)
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
