//! Core domain types for agentpulse
//!
//! Events flow through a three-stage pipeline:
//!
//! ```text
//! Caller (TaskReport) → Queue (TaskEvent) → Pulseboard (EventBatch)
//!        record()            bounded            POST /v1/events
//! ```
//!
//! A `TaskReport` is the caller-facing ingress shape; `record` normalizes
//! it into a canonical `TaskEvent` (assigns the id and timestamp, fills the
//! agent). `TaskEvent`s accumulate in the queue and leave it inside an
//! `EventBatch` carrying its own idempotency token.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Task outcome
// ============================================

/// Outcome of a single task execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Success,
    Failure,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Success => "success",
            TaskStatus::Failure => "failure",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(TaskStatus::Success),
            "failure" => Ok(TaskStatus::Failure),
            _ => Err(format!("unknown task status: {}", s)),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Success
    }
}

/// Structured measurements attached to a task outcome.
///
/// Every field is optional; the pipeline carries whatever the caller
/// filled in without interpreting it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskMetrics {
    /// Input tokens consumed by the task
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_in: Option<u64>,

    /// Output tokens produced by the task
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_out: Option<u64>,

    /// Approximate cost in USD
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,

    /// Caller-assessed quality in `[0.0, 1.0]`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,

    /// Free-form task category (e.g. "codegen", "review")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Extensible metadata, passed through untouched
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub extra: serde_json::Value,
}

impl TaskMetrics {
    pub fn is_empty(&self) -> bool {
        self.tokens_in.is_none()
            && self.tokens_out.is_none()
            && self.cost_usd.is_none()
            && self.quality_score.is_none()
            && self.category.is_none()
            && self.extra.is_null()
    }
}

/// Canonical record of one task execution outcome.
///
/// Immutable once created. `id` is the idempotency key: it is assigned
/// exactly once, survives retransmission unchanged, and is what the
/// collector uses to deduplicate and to name per-event rejections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    /// Globally unique event identifier (UUID v4)
    pub id: String,

    /// The agent this outcome belongs to
    pub agent_id: String,

    /// Caller-supplied task identifier
    pub task_id: String,

    /// Whether the task succeeded
    pub status: TaskStatus,

    /// Failure cause, present for failed tasks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Task duration in milliseconds
    pub duration_ms: u64,

    /// When this event was recorded
    pub recorded_at: DateTime<Utc>,

    /// Structured measurements
    #[serde(default)]
    pub metrics: TaskMetrics,
}

impl TaskEvent {
    /// Create an event from a caller report, filling the generated fields.
    ///
    /// The report's explicit `agent_id` wins over `default_agent`.
    pub fn from_report(report: TaskReport, default_agent: &str) -> Self {
        TaskEvent {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: report.agent_id.unwrap_or_else(|| default_agent.to_string()),
            task_id: report.task_id,
            status: report.status,
            error: report.error,
            duration_ms: report.duration_ms,
            recorded_at: Utc::now(),
            metrics: report.metrics,
        }
    }
}

/// Caller-facing ingress shape for recording a task outcome.
///
/// Carries only what the caller knows; identifiers and timestamps are
/// assigned during normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskReport {
    /// Caller-supplied task identifier
    pub task_id: String,

    /// Whether the task succeeded
    pub status: TaskStatus,

    /// Failure cause, for failed tasks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Task duration in milliseconds
    pub duration_ms: u64,

    /// Override the client's agent identity for this event
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,

    /// Structured measurements
    #[serde(default)]
    pub metrics: TaskMetrics,
}

impl TaskReport {
    /// Report a successful task
    pub fn success(task_id: impl Into<String>, duration_ms: u64) -> Self {
        TaskReport {
            task_id: task_id.into(),
            status: TaskStatus::Success,
            duration_ms,
            ..Default::default()
        }
    }

    /// Report a failed task with its cause
    pub fn failure(task_id: impl Into<String>, duration_ms: u64, error: impl Into<String>) -> Self {
        TaskReport {
            task_id: task_id.into(),
            status: TaskStatus::Failure,
            error: Some(error.into()),
            duration_ms,
            ..Default::default()
        }
    }

    pub fn with_metrics(mut self, metrics: TaskMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }
}

// ============================================
// Wire shapes
// ============================================

/// Batch of events to send to Pulseboard.
///
/// `batch_id` is a fresh idempotency token per delivery cycle; identical
/// retransmissions of the same cycle reuse it so the collector can
/// deduplicate.
#[derive(Debug, Clone, Serialize)]
pub struct EventBatch {
    /// Batch idempotency token (UUID v4, distinct from event ids)
    pub batch_id: String,

    /// The agent these events belong to
    pub agent_id: String,

    /// Events to send, oldest first
    pub events: Vec<TaskEvent>,
}

impl EventBatch {
    pub fn new(agent_id: impl Into<String>, events: Vec<TaskEvent>) -> Self {
        EventBatch {
            batch_id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            events,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Identifiers of every event in this batch
    pub fn event_ids(&self) -> Vec<String> {
        self.events.iter().map(|e| e.id.clone()).collect()
    }
}

/// Collector verdict for one delivered batch.
///
/// Events not named in `rejections` are accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryOutcome {
    /// Events the collector accepted
    pub accepted: usize,

    /// Events the collector rejected
    #[serde(default)]
    pub rejected: usize,

    /// Per-event rejection detail, when the collector provides it
    #[serde(default)]
    pub rejections: Vec<EventRejection>,
}

impl DeliveryOutcome {
    pub fn is_full_success(&self) -> bool {
        self.rejected == 0 && self.rejections.is_empty()
    }

    /// Identifiers of the rejected events
    pub fn rejected_ids(&self) -> Vec<&str> {
        self.rejections.iter().map(|r| r.event_id.as_str()).collect()
    }
}

/// One rejected event and why
#[derive(Debug, Clone, Deserialize)]
pub struct EventRejection {
    pub event_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Aggregate performance score for one agent, computed by the collector
#[derive(Debug, Clone, Deserialize)]
pub struct AgentScore {
    pub agent_id: String,
    pub score: f64,
    pub events_counted: i64,
    #[serde(default)]
    pub computed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_report() -> TaskReport {
        TaskReport::success("task-42", 1500).with_metrics(TaskMetrics {
            tokens_in: Some(1200),
            tokens_out: Some(300),
            cost_usd: Some(0.018),
            ..Default::default()
        })
    }

    #[test]
    fn test_report_normalizes_to_event() {
        let event = TaskEvent::from_report(make_test_report(), "agent-7");

        assert_eq!(event.agent_id, "agent-7");
        assert_eq!(event.task_id, "task-42");
        assert_eq!(event.status, TaskStatus::Success);
        assert_eq!(event.duration_ms, 1500);
        assert!(!event.id.is_empty());
        assert_eq!(event.metrics.tokens_in, Some(1200));
    }

    #[test]
    fn test_report_agent_override_wins() {
        let report = make_test_report().with_agent("agent-override");
        let event = TaskEvent::from_report(report, "agent-default");

        assert_eq!(event.agent_id, "agent-override");
    }

    #[test]
    fn test_event_ids_unique_across_reports() {
        let a = TaskEvent::from_report(make_test_report(), "agent-7");
        let b = TaskEvent::from_report(make_test_report(), "agent-7");

        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_failure_report_carries_error() {
        let event = TaskEvent::from_report(
            TaskReport::failure("task-9", 200, "tool crashed"),
            "agent-7",
        );

        assert_eq!(event.status, TaskStatus::Failure);
        assert_eq!(event.error.as_deref(), Some("tool crashed"));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&TaskStatus::Success).unwrap();
        assert_eq!(json, "\"success\"");

        let parsed: TaskStatus = serde_json::from_str("\"failure\"").unwrap();
        assert_eq!(parsed, TaskStatus::Failure);
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("success".parse::<TaskStatus>().unwrap(), TaskStatus::Success);
        assert_eq!("failure".parse::<TaskStatus>().unwrap(), TaskStatus::Failure);
        assert!("flaky".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_empty_metrics_skipped_in_json() {
        let event = TaskEvent::from_report(TaskReport::success("t", 10), "a");
        let json = serde_json::to_value(&event).unwrap();

        // No error, no optional metric fields
        assert!(json.get("error").is_none());
        assert!(json["metrics"].get("tokens_in").is_none());
        assert!(json["metrics"].get("extra").is_none());
    }

    #[test]
    fn test_batch_ids_distinct_from_event_ids() {
        let events = vec![
            TaskEvent::from_report(TaskReport::success("t1", 10), "a"),
            TaskEvent::from_report(TaskReport::success("t2", 20), "a"),
        ];
        let batch = EventBatch::new("a", events);

        assert_eq!(batch.len(), 2);
        assert!(!batch.event_ids().contains(&batch.batch_id));
    }

    #[test]
    fn test_outcome_rejected_ids() {
        let outcome: DeliveryOutcome = serde_json::from_str(
            r#"{"accepted": 3, "rejected": 2, "rejections": [
                {"event_id": "e1", "reason": "schema"},
                {"event_id": "e2"}
            ]}"#,
        )
        .unwrap();

        assert!(!outcome.is_full_success());
        assert_eq!(outcome.rejected_ids(), vec!["e1", "e2"]);
        assert_eq!(outcome.rejections[1].reason, None);
    }

    #[test]
    fn test_outcome_minimal_body() {
        let outcome: DeliveryOutcome = serde_json::from_str(r#"{"accepted": 5}"#).unwrap();

        assert!(outcome.is_full_success());
        assert_eq!(outcome.accepted, 5);
        assert!(outcome.rejected_ids().is_empty());
    }
}
