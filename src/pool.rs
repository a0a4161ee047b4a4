//! Worker threads sharing one [`ContentSegregation`]
//!
//! Each worker owns the engine handle of its own thread for as long as the
//! worker lives. Calls are queued to whichever worker is free and may be
//! bounded by a timeout. A worker whose call was abandoned by a timeout tears
//! its handle down once the call returns, so the next call on that worker
//! starts from a fresh handle. A job that panics is reported to its caller as
//! [`SegregationError::JobPanicked`]; the worker tears its handle down the
//! same way and keeps serving the queue.

use crate::config::EngineConfig;
use crate::engine::EngineFactory;
use crate::error::{Result, SegregationError};
use crate::segregation::ContentSegregation;
use crate::types::EmailStructure;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

type Job = Box<dyn FnOnce(&ContentSegregation) + Send + 'static>;

/// Who owns the outcome of one call: the worker that finished it, or the
/// caller that stopped waiting. Exactly one side wins the exchange out of
/// `PENDING`.
struct CallState(AtomicU8);

impl CallState {
    const PENDING: u8 = 0;
    const DONE: u8 = 1;
    const ABANDONED: u8 = 2;

    const fn new() -> Self {
        Self(AtomicU8::new(Self::PENDING))
    }

    fn is_abandoned(&self) -> bool {
        self.0.load(Ordering::Acquire) == Self::ABANDONED
    }

    /// Worker side. `false` means the caller already gave up.
    fn finish(&self) -> bool {
        self.0
            .compare_exchange(Self::PENDING, Self::DONE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Caller side. `false` means a result is already on its way.
    fn abandon(&self) -> bool {
        self.0
            .compare_exchange(Self::PENDING, Self::ABANDONED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

fn tear_down(segregation: &ContentSegregation) {
    if let Err(e) = segregation.registry().release() {
        error!("{e}");
    }
}

/// Releases the worker thread's handle when the worker exits
struct RetireGuard(Arc<ContentSegregation>);

impl Drop for RetireGuard {
    fn drop(&mut self) {
        match self.0.registry().release() {
            Ok(true) => debug!("Worker {:?} released its engine handle", thread::current().name()),
            Ok(false) => {}
            Err(e) => error!("Worker failed to release its engine handle: {e}"),
        }
    }
}

pub struct SegregationPool {
    tx: Option<mpsc::Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    segregation: Arc<ContentSegregation>,
    timeout: Option<Duration>,
}

impl SegregationPool {
    /// Start `config.workers` threads. Handles are created lazily, on each
    /// worker's first call.
    pub fn new(factory: impl EngineFactory + 'static, config: EngineConfig) -> Result<Self> {
        let timeout = config.call_timeout();
        let size = config.workers;
        let segregation = Arc::new(ContentSegregation::new(factory, config)?);

        let (tx, rx) = mpsc::channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = Vec::with_capacity(size);
        for i in 0..size {
            let rx = Arc::clone(&rx);
            let guard = RetireGuard(Arc::clone(&segregation));
            let worker = thread::Builder::new()
                .name(format!("segregation-{i}"))
                .spawn(move || {
                    let guard = guard;
                    loop {
                        let job = {
                            let rx = rx.lock().unwrap_or_else(PoisonError::into_inner);
                            rx.recv()
                        };

                        match job {
                            Ok(job) => job(&guard.0),
                            Err(_) => break,
                        }
                    }
                })
                .map_err(|e| SegregationError::Initialization(format!("worker thread: {e}")))?;
            workers.push(worker);
        }

        info!("Started {size} segregation workers");
        Ok(Self {
            tx: Some(tx),
            workers,
            segregation,
            timeout,
        })
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    #[must_use]
    pub const fn segregation(&self) -> &Arc<ContentSegregation> {
        &self.segregation
    }

    /// Run `f` on the next free worker and wait for its result
    pub fn execute<R, F>(&self, operation: &'static str, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&ContentSegregation) -> Result<R> + Send + 'static,
    {
        let (reply_tx, reply_rx) = mpsc::channel();
        let state = Arc::new(CallState::new());
        let worker_state = Arc::clone(&state);

        let job: Job = Box::new(move |segregation: &ContentSegregation| {
            if worker_state.is_abandoned() {
                debug!("Skipping {operation}, caller gave up while it was queued");
                return;
            }

            let result = match panic::catch_unwind(AssertUnwindSafe(|| f(segregation))) {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!("{operation} panicked, tearing down engine handle: {message}");
                    tear_down(segregation);
                    Err(SegregationError::JobPanicked { operation, message })
                }
            };

            if worker_state.finish() {
                let _ = reply_tx.send(result);
            } else {
                warn!("{operation} finished after its caller timed out, tearing down engine handle");
                tear_down(segregation);
            }
        });

        self.tx
            .as_ref()
            .ok_or(SegregationError::PoolClosed)?
            .send(job)
            .map_err(|_| SegregationError::PoolClosed)?;

        let Some(after) = self.timeout else {
            return reply_rx.recv().map_err(|_| SegregationError::PoolClosed)?;
        };

        match reply_rx.recv_timeout(after) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) if state.abandon() => {
                Err(SegregationError::Timeout { operation, after })
            }
            // The worker finished first; its result is already being sent.
            Err(RecvTimeoutError::Timeout) => {
                reply_rx.recv().map_err(|_| SegregationError::PoolClosed)?
            }
            Err(RecvTimeoutError::Disconnected) => Err(SegregationError::PoolClosed),
        }
    }

    pub fn split_email(&self, message: impl Into<String>) -> Result<Vec<usize>> {
        let message = message.into();
        self.execute("splitEmail", move |s| s.split_email(&message))
    }

    pub fn extract_signature(&self, message: impl Into<String>) -> Result<EmailStructure> {
        let message = message.into();
        self.execute("extractSignature", move |s| s.extract_signature(&message))
    }

    pub fn extract_signature_machine_learning(
        &self,
        message: impl Into<String>,
        sender: impl Into<String>,
    ) -> Result<EmailStructure> {
        let (message, sender) = (message.into(), sender.into());
        self.execute("extractSignatureMachineLearning", move |s| {
            s.extract_signature_machine_learning(&message, &sender)
        })
    }
}

impl Drop for SegregationPool {
    fn drop(&mut self) {
        drop(self.tx.take());
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("Segregation worker panicked");
            }
        }
        info!("Stopped segregation workers");
    }
}
