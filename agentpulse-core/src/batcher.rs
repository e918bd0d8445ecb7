//! Batching and delivery scheduling for Pulseboard
//!
//! The `EventBatcher` owns the bounded queue and decides when batches
//! leave it. A flush can be triggered three ways:
//! - the queue reaching `batch_size` after an `add`
//! - the periodic flush timer
//! - an explicit `flush()` call
//!
//! All three funnel into one delivery cycle guarded by a single-flight
//! lock, so overlapping triggers collapse into a single transport
//! invocation. Events are removed from the queue only after the collector
//! accepts them; anything else stays queued for a later cycle.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::CollectorConfig;
use crate::error::{Error, Result, TransportError};
use crate::event::{EventBatch, TaskEvent};
use crate::queue::EventQueue;
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::transport::Transport;

/// Callback invoked once per terminal delivery failure, with the failed
/// error and the events that were in the batch.
pub type ErrorObserver = Box<dyn Fn(&TransportError, &[TaskEvent]) + Send + Sync>;

/// Delivery statistics snapshot
#[derive(Debug, Default, Clone)]
pub struct DeliveryStats {
    /// Total events delivered and removed from the queue
    pub events_sent: u64,
    /// Total events the collector rejected
    pub events_rejected: u64,
    /// Total events dropped (permanent failures, shutdown discards)
    pub events_dropped: u64,
    /// Number of delivery cycles that reached the transport
    pub api_calls: u64,
    /// Number of delivery cycles that failed terminally
    pub api_failures: u64,
    /// Number of transient-failure retries performed
    pub retries: u64,
}

#[derive(Default)]
struct StatsCells {
    events_sent: AtomicU64,
    events_rejected: AtomicU64,
    events_dropped: AtomicU64,
    api_calls: AtomicU64,
    api_failures: AtomicU64,
    retries: AtomicU64,
}

impl StatsCells {
    fn snapshot(&self) -> DeliveryStats {
        DeliveryStats {
            events_sent: self.events_sent.load(Ordering::Relaxed),
            events_rejected: self.events_rejected.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            api_calls: self.api_calls.load(Ordering::Relaxed),
            api_failures: self.api_failures.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

struct TimerTask {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Manages event batching and delivery to Pulseboard.
///
/// Must be created inside a tokio runtime; the flush timer task is
/// spawned immediately and runs until [`stop`](Self::stop) or drop.
pub struct EventBatcher {
    inner: Arc<Inner>,
    timer: StdMutex<Option<TimerTask>>,
}

struct Inner {
    queue: EventQueue,
    transport: Arc<dyn Transport>,
    executor: RetryExecutor,
    agent_id: String,
    batch_size: usize,
    strict: bool,
    stopped: AtomicBool,
    /// Single-flight guard: held for the whole delivery cycle, including
    /// the retry sleeps.
    in_flight: tokio::sync::Mutex<()>,
    stats: StatsCells,
    on_delivery_error: StdMutex<Option<ErrorObserver>>,
}

impl EventBatcher {
    /// Create a batcher and start its flush timer.
    pub fn new(
        config: &CollectorConfig,
        agent_id: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let inner = Arc::new(Inner {
            queue: EventQueue::new(config.queue_capacity),
            transport,
            executor: RetryExecutor::new(RetryPolicy::from(config)),
            agent_id: agent_id.into(),
            batch_size: config.batch_size,
            strict: config.strict,
            stopped: AtomicBool::new(false),
            in_flight: tokio::sync::Mutex::new(()),
            stats: StatsCells::default(),
            on_delivery_error: StdMutex::new(None),
        });

        let timer = start_timer(inner.clone(), config.flush_interval());

        Self {
            inner,
            timer: StdMutex::new(Some(timer)),
        }
    }

    /// Install the terminal-failure observer.
    pub fn set_error_observer<F>(&self, callback: F)
    where
        F: Fn(&TransportError, &[TaskEvent]) + Send + Sync + 'static,
    {
        let mut slot = self
            .inner
            .on_delivery_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Box::new(callback));
    }

    /// Enqueue one event.
    ///
    /// Never blocks on the network: when the queue reaches `batch_size`
    /// the flush runs as a spawned side effect. A full queue evicts the
    /// oldest event rather than rejecting the new one.
    pub fn add(&self, event: TaskEvent) -> Result<()> {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return Err(Error::Stopped);
        }

        if let Some(evicted) = self.inner.queue.push(event) {
            tracing::warn!(
                event_id = %evicted.id,
                task_id = %evicted.task_id,
                "Queue full, evicted oldest event"
            );
        }

        if self.inner.queue.len() >= self.inner.batch_size {
            let inner = self.inner.clone();
            tokio::spawn(async move {
                if let Err(e) = inner.flush().await {
                    tracing::warn!(error = %e, "Size-triggered flush failed");
                }
            });
        }

        Ok(())
    }

    /// Deliver one batch now.
    ///
    /// Returns the number of events removed from the queue, or `Ok(0)`
    /// without side effects when the batcher is stopped, the queue is
    /// empty, or another flush is already in flight. In strict mode a
    /// terminal delivery failure is returned; otherwise it is logged and
    /// the call still returns `Ok(0)`.
    pub async fn flush(&self) -> Result<usize> {
        self.inner.flush().await
    }

    /// Stop the batcher: end the timer, make one final delivery attempt,
    /// and discard whatever could not be delivered.
    ///
    /// Idempotent. After the first call returns, `add` fails with
    /// [`Error::Stopped`] for every caller.
    pub async fn stop(&self) -> Result<()> {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let timer = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(timer) = timer {
            let _ = timer.stop_tx.send(true);
            let _ = timer.handle.await;
        }

        // Wait for any in-progress cycle, then drain one final batch.
        let _guard = self.inner.in_flight.lock().await;
        if let Err(e) = self.inner.flush_locked().await {
            tracing::warn!(error = %e, "Final flush failed during shutdown");
        }

        let discarded = self.inner.queue.clear();
        if discarded > 0 {
            self.inner
                .stats
                .events_dropped
                .fetch_add(discarded as u64, Ordering::Relaxed);
            tracing::warn!(count = discarded, "Discarded undelivered events at shutdown");
        }

        Ok(())
    }

    /// Number of events waiting in the queue
    pub fn pending(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Current delivery statistics
    pub fn stats(&self) -> DeliveryStats {
        self.inner.stats.snapshot()
    }

    pub fn agent_id(&self) -> &str {
        &self.inner.agent_id
    }
}

impl Inner {
    async fn flush(&self) -> Result<usize> {
        if self.stopped.load(Ordering::SeqCst) {
            return Ok(0);
        }

        // One delivery cycle at a time; overlapping triggers are no-ops.
        let guard = match self.in_flight.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::debug!("Flush already in progress, skipping");
                return Ok(0);
            }
        };

        let result = self.flush_locked().await;
        drop(guard);
        result
    }

    /// Run one delivery cycle. Caller must hold the single-flight guard.
    async fn flush_locked(&self) -> Result<usize> {
        let events = self.queue.peek(self.batch_size);
        if events.is_empty() {
            return Ok(0);
        }

        let batch = EventBatch::new(self.agent_id.clone(), events);
        self.stats.api_calls.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            batch_id = %batch.batch_id,
            count = batch.len(),
            "Delivering batch"
        );

        let result = self
            .executor
            .run_with_observer(
                || {
                    let batch = &batch;
                    async move { self.transport.send(batch).await }
                },
                |_, _| {
                    self.stats.retries.fetch_add(1, Ordering::Relaxed);
                },
            )
            .await;

        match result {
            Ok(outcome) => {
                let accepted_ids: Vec<String> = if outcome.is_full_success() {
                    batch.event_ids()
                } else {
                    let rejected: HashSet<&str> = outcome.rejected_ids().into_iter().collect();
                    batch
                        .events
                        .iter()
                        .filter(|e| !rejected.contains(e.id.as_str()))
                        .map(|e| e.id.clone())
                        .collect()
                };

                let removed = self.queue.remove(&accepted_ids);
                self.stats
                    .events_sent
                    .fetch_add(removed as u64, Ordering::Relaxed);

                let rejected_count = outcome.rejections.len().max(outcome.rejected);
                if rejected_count > 0 {
                    self.stats
                        .events_rejected
                        .fetch_add(rejected_count as u64, Ordering::Relaxed);
                    tracing::warn!(
                        batch_id = %batch.batch_id,
                        rejected = rejected_count,
                        requeued = batch.len() - accepted_ids.len(),
                        "Collector rejected events"
                    );
                }

                tracing::debug!(
                    batch_id = %batch.batch_id,
                    accepted = removed,
                    "Published events to Pulseboard"
                );
                Ok(removed)
            }
            Err(e) => {
                self.stats.api_failures.fetch_add(1, Ordering::Relaxed);
                self.notify_delivery_error(&e, &batch.events);

                if e.is_retryable() {
                    // Retry budget spent on a transient condition; the
                    // events stay queued for the next cycle.
                    tracing::warn!(
                        batch_id = %batch.batch_id,
                        count = batch.len(),
                        error = %e,
                        "Delivery failed after retries, events remain queued"
                    );
                } else {
                    // Permanent failure: retransmitting the same payload
                    // cannot succeed, so drop it instead of looping.
                    let dropped = self.queue.remove(&batch.event_ids());
                    self.stats
                        .events_dropped
                        .fetch_add(dropped as u64, Ordering::Relaxed);
                    tracing::error!(
                        batch_id = %batch.batch_id,
                        count = dropped,
                        error = %e,
                        "Dropping batch after permanent delivery failure"
                    );
                }

                if self.strict {
                    Err(e.into())
                } else {
                    Ok(0)
                }
            }
        }
    }

    fn notify_delivery_error(&self, error: &TransportError, events: &[TaskEvent]) {
        let slot = self
            .on_delivery_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(callback) = slot.as_ref() {
            callback(error, events);
        }
    }
}

fn start_timer(inner: Arc<Inner>, interval: Duration) -> TimerTask {
    let (stop_tx, mut stop_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = inner.flush().await {
                        tracing::warn!(error = %e, "Timed flush failed");
                    }
                }
                _ = stop_rx.changed() => break,
            }
        }
    });

    TimerTask { stop_tx, handle }
}
