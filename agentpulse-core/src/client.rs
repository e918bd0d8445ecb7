//! Public entry point for the agentpulse SDK
//!
//! `PulseClient` ties the pipeline together: reports recorded by the
//! caller are normalized into events, queued, and delivered to the
//! Pulseboard collector in the background. `record` never touches the
//! network; delivery happens on the flush timer, on batch-size
//! thresholds, or on an explicit `flush`.

use std::sync::Arc;

use crate::batcher::{DeliveryStats, EventBatcher};
use crate::config::CollectorConfig;
use crate::error::{Result, TransportError};
use crate::event::{AgentScore, TaskEvent, TaskReport};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::transport::{HttpTransport, Transport};

/// Client for reporting agent task outcomes to Pulseboard.
///
/// Create one per process and share it; all methods take `&self`.
/// Call [`shutdown`](Self::shutdown) before exit to drain the queue.
pub struct PulseClient {
    agent_id: String,
    transport: Arc<dyn Transport>,
    batcher: EventBatcher,
    executor: RetryExecutor,
}

impl std::fmt::Debug for PulseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PulseClient")
            .field("agent_id", &self.agent_id)
            .finish_non_exhaustive()
    }
}

impl PulseClient {
    /// Create a client that delivers over HTTP to the configured
    /// collector.
    ///
    /// Must be called inside a tokio runtime; the flush timer starts
    /// immediately. When `config.agent_id` is unset a random one is
    /// generated for this client's lifetime.
    pub fn new(config: CollectorConfig) -> Result<Self> {
        let agent_id = resolve_agent_id(&config);
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config, &agent_id)?);
        Ok(Self::assemble(config, agent_id, transport))
    }

    /// Create a client with a caller-supplied transport.
    pub fn with_transport(config: CollectorConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let agent_id = resolve_agent_id(&config);
        Ok(Self::assemble(config, agent_id, transport))
    }

    fn assemble(config: CollectorConfig, agent_id: String, transport: Arc<dyn Transport>) -> Self {
        let batcher = EventBatcher::new(&config, &agent_id, transport.clone());
        let executor = RetryExecutor::new(RetryPolicy::from(&config));
        tracing::info!(
            agent_id = %agent_id,
            batch_size = config.batch_size,
            flush_interval_ms = config.flush_interval_ms,
            "Pulse client started"
        );
        Self {
            agent_id,
            transport,
            batcher,
            executor,
        }
    }

    /// Install a callback invoked once per batch that fails terminally,
    /// with the error and the affected events.
    pub fn on_delivery_error<F>(&self, callback: F)
    where
        F: Fn(&TransportError, &[TaskEvent]) + Send + Sync + 'static,
    {
        self.batcher.set_error_observer(callback);
    }

    /// Record one completed task.
    ///
    /// Normalizes the report into an event and enqueues it. Never blocks
    /// on the network. Fails only after [`shutdown`](Self::shutdown).
    pub fn record(&self, report: TaskReport) -> Result<()> {
        let event = TaskEvent::from_report(report, &self.agent_id);
        tracing::trace!(
            event_id = %event.id,
            task_id = %event.task_id,
            status = %event.status,
            "Recorded task event"
        );
        self.batcher.add(event)
    }

    /// Deliver pending events now instead of waiting for the timer.
    ///
    /// Returns the number of events the collector accepted.
    pub async fn flush(&self) -> Result<usize> {
        self.batcher.flush().await
    }

    /// Fetch the quality score Pulseboard computed for an agent.
    ///
    /// Defaults to this client's own agent when `agent_id` is `None`.
    /// Transient collector failures are retried like deliveries.
    pub async fn score(&self, agent_id: Option<&str>) -> Result<AgentScore> {
        let target = agent_id.unwrap_or(&self.agent_id);
        let score = self
            .executor
            .run(|| {
                let transport = &self.transport;
                async move { transport.fetch_score(target).await }
            })
            .await?;
        Ok(score)
    }

    /// Stop the pipeline: flush what the collector will take, discard
    /// the rest. Idempotent; `record` fails afterwards.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!(pending = self.pending(), "Shutting down pulse client");
        self.batcher.stop().await
    }

    /// Number of events queued but not yet delivered
    pub fn pending(&self) -> usize {
        self.batcher.pending()
    }

    /// Delivery statistics for this client
    pub fn stats(&self) -> DeliveryStats {
        self.batcher.stats()
    }

    /// The agent id stamped on events that do not carry their own
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }
}

fn resolve_agent_id(config: &CollectorConfig) -> String {
    config
        .agent_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}
