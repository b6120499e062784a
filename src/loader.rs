use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, trace};

/// Default bound on concurrently running blocking operations.
pub const DEFAULT_WORKERS: usize = 4;

/// A callback to run against the interactive state.
pub type Completion<S> = Box<dyn FnOnce(&mut S) + Send>;

/// Cancellation handle for a submitted task.
///
/// Cancelling only suppresses the callback; an operation that already
/// started on a worker runs to completion and its result is dropped.
#[derive(Clone)]
pub struct TaskHandle {
    id: u64,
    cancelled: Arc<AtomicBool>,
}

impl TaskHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            trace!(task = self.id, "task cancelled");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// A finished task waiting to hand its result to the interactive thread.
pub struct Delivery<S> {
    id: u64,
    cancelled: Arc<AtomicBool>,
    completion: Option<Completion<S>>,
}

impl<S> Delivery<S> {
    /// Run the callback unless the task was cancelled in the meantime.
    /// Returns whether a callback ran.
    pub fn deliver(self, state: &mut S) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            trace!(task = self.id, "dropping result of cancelled task");
            return false;
        }
        match self.completion {
            Some(completion) => {
                completion(state);
                true
            }
            None => false,
        }
    }
}

/// Runs blocking operations on a bounded worker pool and sends their
/// results back to whoever drains the paired [`CompletionQueue`].
pub struct TaskLoader<S> {
    tx: mpsc::UnboundedSender<Delivery<S>>,
    permits: Arc<Semaphore>,
    next_id: Arc<AtomicU64>,
    pending: Arc<AtomicUsize>,
}

impl<S> Clone for TaskLoader<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            permits: Arc::clone(&self.permits),
            next_id: Arc::clone(&self.next_id),
            pending: Arc::clone(&self.pending),
        }
    }
}

/// Receiving end owned by the interactive thread.
pub struct CompletionQueue<S> {
    rx: mpsc::UnboundedReceiver<Delivery<S>>,
    pending: Arc<AtomicUsize>,
}

/// Create a loader allowing at most `workers` operations to run at once.
pub fn task_loader<S: 'static>(workers: usize) -> (TaskLoader<S>, CompletionQueue<S>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let pending = Arc::new(AtomicUsize::new(0));
    let loader = TaskLoader {
        tx,
        permits: Arc::new(Semaphore::new(workers.max(1))),
        next_id: Arc::new(AtomicU64::new(1)),
        pending: Arc::clone(&pending),
    };
    (loader, CompletionQueue { rx, pending })
}

impl<S: 'static> TaskLoader<S> {
    /// Run `operation` on a worker, optionally after `delay`, then deliver
    /// exactly one of `on_success` / `on_failure` through the queue.
    ///
    /// Must be called from within a Tokio runtime. If the handle is cancelled
    /// before the delay elapses the operation never runs.
    pub fn submit<T, Op, OnOk, OnErr>(
        &self,
        delay: Option<Duration>,
        operation: Op,
        on_success: OnOk,
        on_failure: OnErr,
    ) -> TaskHandle
    where
        T: Send + 'static,
        Op: FnOnce() -> Result<T, String> + Send + 'static,
        OnOk: FnOnce(&mut S, T) + Send + 'static,
        OnErr: FnOnce(&mut S, String) + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancelled = Arc::new(AtomicBool::new(false));
        let handle = TaskHandle {
            id,
            cancelled: Arc::clone(&cancelled),
        };
        self.pending.fetch_add(1, Ordering::SeqCst);

        let tx = self.tx.clone();
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let completion: Option<Completion<S>> = if cancelled.load(Ordering::SeqCst) {
                debug!(task = id, "task cancelled before start");
                None
            } else {
                let _permit = permits.acquire_owned().await;
                if cancelled.load(Ordering::SeqCst) {
                    debug!(task = id, "task cancelled while queued");
                    None
                } else {
                    match tokio::task::spawn_blocking(operation).await {
                        Ok(Ok(value)) => Some(Box::new(move |state: &mut S| on_success(state, value)) as Completion<S>),
                        Ok(Err(reason)) => Some(Box::new(move |state: &mut S| on_failure(state, reason)) as Completion<S>),
                        Err(join_error) => {
                            error!(task = id, error = %join_error, "background task panicked");
                            let reason = "internal error".to_string();
                            Some(Box::new(move |state: &mut S| on_failure(state, reason)))
                        }
                    }
                }
            };

            // The queue accounts for every task, delivered or not.
            let _ = tx.send(Delivery {
                id,
                cancelled,
                completion,
            });
        });

        handle
    }
}

impl<S> CompletionQueue<S> {
    /// Wait for the next finished task.
    pub async fn next(&mut self) -> Option<Delivery<S>> {
        let delivery = self.rx.recv().await;
        if delivery.is_some() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
        delivery
    }

    /// Tasks submitted but not yet taken from the queue.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Deliver results until no submitted task remains, including tasks
    /// submitted by the callbacks themselves.
    pub async fn run_until_idle(&mut self, state: &mut S) {
        while !self.is_idle() {
            match self.next().await {
                Some(delivery) => {
                    delivery.deliver(state);
                }
                None => break,
            }
        }
    }
}
