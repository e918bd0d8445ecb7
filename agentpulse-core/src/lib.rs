//! # agentpulse-core
//!
//! Core library for agentpulse - AI agent telemetry delivery for Pulseboard.
//!
//! This library provides:
//! - Domain types for task reports, events, and delivery outcomes
//! - A bounded in-memory queue with batching and flush scheduling
//! - An HTTP transport with retry and exponential backoff
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! Events flow through three stages:
//! - **Record:** `TaskReport`s are normalized into `TaskEvent`s and held in a
//!   bounded queue (oldest evicted on overflow, the caller never blocks)
//! - **Batch:** a flush timer and a batch-size threshold group queued events
//!   into batches; overlapping triggers collapse into one delivery cycle
//! - **Deliver:** batches go to the Pulseboard collector at least once;
//!   events leave the queue only after the collector accepts them
//!
//! ## Example
//!
//! ```rust,no_run
//! use agentpulse_core::{CollectorConfig, PulseClient, TaskReport};
//!
//! # async fn run() -> agentpulse_core::Result<()> {
//! let mut config = CollectorConfig::default();
//! config.enabled = true;
//! config.server_url = Some("https://pulseboard.example.com".to_string());
//!
//! let client = PulseClient::new(config)?;
//! client.record(TaskReport::success("invoice-123", 840))?;
//! client.flush().await?;
//! client.shutdown().await?;
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use batcher::{DeliveryStats, EventBatcher};
pub use client::PulseClient;
pub use config::{CollectorConfig, Config};
pub use error::{Error, Result, TransportError};
pub use event::{
    AgentScore, DeliveryOutcome, EventBatch, EventRejection, TaskEvent, TaskMetrics, TaskReport,
    TaskStatus,
};
pub use transport::{HttpTransport, Transport};

// Public modules
pub mod batcher;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod logging;
pub mod queue;
pub mod retry;
pub mod transport;
