//! Single-threaded cooperative scheduler and its thread-safe submission handle.
//!
//! All operation bodies and both HTTP listeners run on one dedicated thread
//! driving a current-thread Tokio runtime inside a [`LocalSet`]. The state
//! owned by that thread (`S`) is created there by the `init` closure and is
//! never `Send`; other threads reach it only by submitting closures through a
//! [`SchedulerHandle`].
//!
//! Submissions are admitted in order. A caller that gives up waiting (timeout
//! or dropped receiver) does not cancel the task; it runs to completion and
//! its output is discarded.

mod errors;

use std::fmt;
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::mpsc::{self as std_mpsc, RecvTimeoutError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use futures::future::LocalBoxFuture;
use once_cell::sync::OnceCell;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::{mpsc, oneshot};
use tokio::task::LocalSet;
use tracing::{debug, info, warn};

pub use errors::BridgeError;

pub(crate) const SCHEDULER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::scheduler");

type Job<S> = Box<dyn FnOnce(Rc<S>) -> LocalBoxFuture<'static, ()> + Send>;

enum Message<S> {
    Run(Job<S>),
    Stop,
}

/// Cloneable, thread-safe handle used to submit work to the scheduler.
pub struct SchedulerHandle<S> {
    sender: mpsc::UnboundedSender<Message<S>>,
    worker: Arc<OnceCell<ThreadId>>,
}

impl<S> Clone for SchedulerHandle<S> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            worker: Arc::clone(&self.worker),
        }
    }
}

impl<S> fmt::Debug for SchedulerHandle<S> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SchedulerHandle")
            .field("running", &!self.sender.is_closed())
            .field("worker", &self.worker.get())
            .finish()
    }
}

impl<S: 'static> SchedulerHandle<S> {
    /// Whether the scheduler still accepts submissions.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Submits `task` and returns a receiver for its output.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::SchedulerUnavailable`] once the scheduler has
    /// stopped.
    pub fn submit<F, Fut, T>(&self, task: F) -> Result<oneshot::Receiver<T>, BridgeError>
    where
        F: FnOnce(Rc<S>) -> Fut + Send + 'static,
        Fut: Future<Output = T> + 'static,
        T: Send + 'static,
    {
        let (reply, receiver) = oneshot::channel();
        self.enqueue(Box::new(move |state| {
            Box::pin(async move {
                let output = task(state).await;
                if reply.send(output).is_err() {
                    debug!(
                        target: SCHEDULER_TARGET,
                        "caller stopped waiting before the task finished"
                    );
                }
            })
        }))?;
        Ok(receiver)
    }

    /// Submits `task` and awaits its output from an async context.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Timeout`] when `timeout` elapses first and
    /// [`BridgeError::SchedulerUnavailable`] when the scheduler is gone.
    pub async fn call<F, Fut, T>(
        &self,
        task: F,
        timeout: Option<Duration>,
    ) -> Result<T, BridgeError>
    where
        F: FnOnce(Rc<S>) -> Fut + Send + 'static,
        Fut: Future<Output = T> + 'static,
        T: Send + 'static,
    {
        let receiver = self.submit(task)?;
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, receiver).await {
                Ok(result) => result.map_err(|_| BridgeError::SchedulerUnavailable),
                Err(_) => Err(BridgeError::Timeout { timeout: limit }),
            },
            None => receiver
                .await
                .map_err(|_| BridgeError::SchedulerUnavailable),
        }
    }

    /// Submits `task` and blocks the calling thread until it completes.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ReentrantWait`] on the scheduler thread,
    /// [`BridgeError::Timeout`] when `timeout` elapses first, and
    /// [`BridgeError::SchedulerUnavailable`] when the scheduler is gone.
    pub fn submit_and_wait<F, Fut, T>(
        &self,
        task: F,
        timeout: Option<Duration>,
    ) -> Result<T, BridgeError>
    where
        F: FnOnce(Rc<S>) -> Fut + Send + 'static,
        Fut: Future<Output = T> + 'static,
        T: Send + 'static,
    {
        if self.is_scheduler_thread() {
            return Err(BridgeError::ReentrantWait);
        }
        let (reply, receiver) = std_mpsc::sync_channel(1);
        self.enqueue(Box::new(move |state| {
            Box::pin(async move {
                let output = task(state).await;
                if reply.send(output).is_err() {
                    debug!(
                        target: SCHEDULER_TARGET,
                        "blocking caller stopped waiting before the task finished"
                    );
                }
            })
        }))?;
        match timeout {
            Some(limit) => receiver.recv_timeout(limit).map_err(|error| match error {
                RecvTimeoutError::Timeout => BridgeError::Timeout { timeout: limit },
                RecvTimeoutError::Disconnected => BridgeError::SchedulerUnavailable,
            }),
            None => receiver
                .recv()
                .map_err(|_| BridgeError::SchedulerUnavailable),
        }
    }

    fn enqueue(&self, job: Job<S>) -> Result<(), BridgeError> {
        self.sender
            .send(Message::Run(job))
            .map_err(|_| BridgeError::SchedulerUnavailable)
    }

    fn is_scheduler_thread(&self) -> bool {
        self.worker.get() == Some(&thread::current().id())
    }
}

/// Owner of the scheduler thread.
///
/// Dropping the scheduler stops it and joins the thread.
pub struct Scheduler<S: 'static> {
    handle: SchedulerHandle<S>,
    thread: Option<JoinHandle<()>>,
}

impl<S: 'static> Scheduler<S> {
    /// Spawns the scheduler thread and builds its state with `init`.
    ///
    /// `init` runs on the scheduler thread before any submission and receives
    /// a handle so the state can submit follow-up work to itself.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Start`] when the runtime or thread cannot be
    /// created.
    pub fn start<F>(name: &str, init: F) -> Result<Self, BridgeError>
    where
        F: FnOnce(SchedulerHandle<S>) -> S + Send + 'static,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = SchedulerHandle {
            sender,
            worker: Arc::new(OnceCell::new()),
        };
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|source| BridgeError::Start { source })?;
        let worker_handle = handle.clone();
        let thread = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || run_worker(runtime, receiver, worker_handle, init))
            .map_err(|source| BridgeError::Start { source })?;
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    /// Returns a submission handle.
    #[must_use]
    pub fn handle(&self) -> SchedulerHandle<S> {
        self.handle.clone()
    }

    /// Stops accepting work and joins the scheduler thread.
    ///
    /// Tasks still pending are dropped; their callers observe
    /// [`BridgeError::SchedulerUnavailable`].
    pub fn stop(mut self) -> Result<(), BridgeError> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> Result<(), BridgeError> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        if self.handle.sender.send(Message::Stop).is_err() {
            debug!(target: SCHEDULER_TARGET, "scheduler already stopped");
        }
        thread.join().map_err(|_| BridgeError::ThreadPanic)
    }
}

impl<S: 'static> Drop for Scheduler<S> {
    fn drop(&mut self) {
        if let Err(error) = self.stop_and_join() {
            warn!(target: SCHEDULER_TARGET, error = %error, "scheduler did not stop cleanly");
        }
    }
}

fn run_worker<S, F>(
    runtime: Runtime,
    mut receiver: mpsc::UnboundedReceiver<Message<S>>,
    handle: SchedulerHandle<S>,
    init: F,
) where
    S: 'static,
    F: FnOnce(SchedulerHandle<S>) -> S,
{
    handle.worker.get_or_init(|| thread::current().id());
    let local = LocalSet::new();
    local.block_on(&runtime, async move {
        let state = Rc::new(init(handle));
        info!(target: SCHEDULER_TARGET, "scheduler started");
        while let Some(message) = receiver.recv().await {
            match message {
                Message::Run(job) => {
                    tokio::task::spawn_local(job(Rc::clone(&state)));
                }
                Message::Stop => break,
            }
        }
        info!(target: SCHEDULER_TARGET, "scheduler stopping");
    });
}

#[cfg(test)]
mod tests;
