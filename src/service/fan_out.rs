//! Concurrent per-catalog execution.
//!
//! Every sub-call runs on the service's thread pool and reports back over a
//! channel. The optional timeout is per sub-call and starts when that
//! sub-call starts running, not when the fan-out was submitted. A sub-call
//! that misses its deadline is recorded as a timeout failure and its late
//! result is dropped; it is never interrupted and never cancels siblings.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, unbounded};
use log::{debug, error, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::catalog::Catalog;
use crate::error::{MetacatError, Result};
use crate::service::outcome::{CatalogFailure, FederatedResult};

enum Message<T> {
    Started { slot: usize, at: Instant },
    Finished { slot: usize, result: Result<T> },
}

enum SlotState<T> {
    Queued,
    Running { deadline: Option<Instant> },
    Done(Result<T>),
}

impl<T> SlotState<T> {
    fn is_open(&self) -> bool {
        !matches!(self, SlotState::Done(_))
    }
}

/// Runs one operation against many catalogs at once.
pub struct FanOut {
    pool: Arc<ThreadPool>,
    timeout: Option<Duration>,
}

impl FanOut {
    /// Create an executor with `threads` workers.
    pub fn new(threads: usize, timeout: Option<Duration>) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("metacat-fan-out-{i}"))
            .build()
            .map_err(|e| MetacatError::internal(format!("Failed to create thread pool: {e}")))?;

        Ok(FanOut {
            pool: Arc::new(pool),
            timeout,
        })
    }

    /// Per-sub-call timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `op` against every catalog in `catalogs`.
    ///
    /// Values and failures come back in the order of `catalogs`.
    pub fn run<T, F>(&self, catalogs: &[Arc<Catalog>], op: F) -> FederatedResult<T>
    where
        T: Send + 'static,
        F: Fn(&Catalog) -> Result<T> + Send + Sync + 'static,
    {
        if catalogs.is_empty() {
            return FederatedResult::empty();
        }

        let op = Arc::new(op);
        let (tx, rx) = unbounded();

        for (slot, catalog) in catalogs.iter().enumerate() {
            let tx = tx.clone();
            let op = Arc::clone(&op);
            let catalog = Arc::clone(catalog);

            self.pool.spawn(move || {
                // The collector may have given up on us already.
                let _ = tx.send(Message::Started {
                    slot,
                    at: Instant::now(),
                });
                let result = op(&catalog);
                let _ = tx.send(Message::Finished { slot, result });
            });
        }

        // Only task-held senders remain, so the channel disconnects once every task has ended.
        drop(tx);

        let mut slots: Vec<SlotState<T>> = catalogs.iter().map(|_| SlotState::Queued).collect();
        let mut open = catalogs.len();

        while open > 0 {
            let next_deadline = slots
                .iter()
                .filter_map(|s| match s {
                    SlotState::Running { deadline } => *deadline,
                    _ => None,
                })
                .min();

            let received = match next_deadline {
                Some(deadline) => {
                    rx.recv_timeout(deadline.saturating_duration_since(Instant::now()))
                }
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(Message::Started { slot, at }) => {
                    if let SlotState::Queued = slots[slot] {
                        slots[slot] = SlotState::Running {
                            deadline: self.timeout.map(|t| at + t),
                        };
                    }
                }
                Ok(Message::Finished { slot, result }) => {
                    if slots[slot].is_open() {
                        slots[slot] = SlotState::Done(result);
                        open -= 1;
                    } else {
                        debug!(
                            "discarding late result from catalog '{}'",
                            catalogs[slot].id()
                        );
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    let now = Instant::now();
                    for (slot, state) in slots.iter_mut().enumerate() {
                        let expired = matches!(
                            state,
                            SlotState::Running { deadline: Some(d) } if *d <= now
                        );
                        if expired {
                            let id = catalogs[slot].id();
                            warn!("catalog '{id}' missed its sub-call deadline");
                            *state = SlotState::Done(Err(MetacatError::timeout(format!(
                                "catalog '{id}' did not answer within {:?}",
                                self.timeout.unwrap_or_default()
                            ))));
                            open -= 1;
                        }
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    for (slot, state) in slots.iter_mut().enumerate() {
                        if state.is_open() {
                            *state = SlotState::Done(Err(MetacatError::internal(format!(
                                "sub-call for catalog '{}' ended without a result",
                                catalogs[slot].id()
                            ))));
                        }
                    }
                    open = 0;
                }
            }
        }

        let mut values = Vec::with_capacity(catalogs.len());
        let mut failures = Vec::new();
        for (catalog, state) in catalogs.iter().zip(slots) {
            match state {
                SlotState::Done(Ok(value)) => values.push((catalog.id().to_string(), value)),
                SlotState::Done(Err(e)) => {
                    error!("catalog '{}' failed: {e}", catalog.id());
                    failures.push(CatalogFailure::new(catalog.id(), e));
                }
                SlotState::Queued | SlotState::Running { .. } => {
                    failures.push(CatalogFailure::new(
                        catalog.id(),
                        MetacatError::internal("sub-call never completed"),
                    ));
                }
            }
        }

        FederatedResult::new(values, failures)
    }
}

impl std::fmt::Debug for FanOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOut")
            .field("threads", &self.threads())
            .field("timeout", &self.timeout)
            .finish()
    }
}
