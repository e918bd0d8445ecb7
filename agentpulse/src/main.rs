//! agentpulse - delivery pipeline CLI for Pulseboard
//!
//! This tool provides commands for:
//! - Checking collector configuration and readiness
//! - Health-checking the configured collector
//! - Sending a synthetic task event through the full pipeline
//! - Fetching the score Pulseboard computed for an agent
//!
//! Uses XDG Base Directory specification for file locations:
//! - Config: $XDG_CONFIG_HOME/agentpulse/config.toml (~/.config/agentpulse/config.toml)
//! - Logs: $XDG_STATE_HOME/agentpulse/agentpulse.log (~/.local/state/agentpulse/agentpulse.log)

use agentpulse_core::{Config, HttpTransport, PulseClient, TaskReport};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "agentpulse")]
#[command(about = "Manage Pulseboard event delivery")]
#[command(version)]
struct Args {
    /// Verbose output (logs to the XDG state directory)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show collector configuration and readiness
    Status,

    /// Check that the configured collector answers
    Ping,

    /// Send one synthetic task event through the pipeline
    Send {
        /// Task identifier for the synthetic event
        #[arg(short, long, default_value = "smoke-test")]
        task_id: String,

        /// Report the task as failed
        #[arg(long)]
        failed: bool,

        /// Failure reason recorded alongside --failed
        #[arg(long)]
        error: Option<String>,

        /// Reported task duration in milliseconds
        #[arg(short, long, default_value_t = 0)]
        duration_ms: u64,

        /// Structured metrics as a JSON object
        #[arg(long)]
        metrics: Option<String>,
    },

    /// Fetch the quality score Pulseboard computed for an agent
    Score {
        /// Agent to query (defaults to the configured agent id)
        #[arg(short, long)]
        agent_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging if verbose; the guard must outlive the command
    // so buffered writes reach the file
    let _log_guard = if args.verbose {
        Some(
            agentpulse_core::logging::init(&config.logging)
                .context("failed to initialize logging")?,
        )
    } else {
        None
    };

    tracing::info!("agentpulse CLI starting up");

    match args.command {
        Command::Status => cmd_status(&config),
        Command::Ping => cmd_ping(&config).await,
        Command::Send {
            task_id,
            failed,
            error,
            duration_ms,
            metrics,
        } => cmd_send(&config, task_id, failed, error, duration_ms, metrics).await,
        Command::Score { agent_id } => cmd_score(&config, agent_id).await,
    }
}

fn cmd_status(config: &Config) -> Result<()> {
    println!("Pulseboard Collector Configuration");
    println!("==================================");
    println!();

    let collector = &config.collector;

    println!("Enabled:         {}", collector.enabled);

    if !collector.enabled {
        println!();
        println!("Collector is disabled. Enable it in config.toml:");
        println!();
        println!("  [collector]");
        println!("  enabled = true");
        println!("  server_url = \"https://your-pulseboard-server.com\"");
        println!("  api_key = \"pb_live_xxxxxxxxxxxx\"");
        return Ok(());
    }

    println!(
        "Server URL:      {}",
        collector.server_url.as_deref().unwrap_or("<not set>")
    );
    println!(
        "Agent ID:        {}",
        collector.agent_id.as_deref().unwrap_or("<generated per run>")
    );
    println!(
        "API Key:         {}",
        if collector.api_key.is_some() {
            "<set>"
        } else {
            "<not set>"
        }
    );
    println!("Batch Size:      {}", collector.batch_size);
    println!("Flush Interval:  {}ms", collector.flush_interval_ms);
    println!("Queue Capacity:  {}", collector.queue_capacity);
    println!("Max Retries:     {}", collector.max_retries);
    println!("Timeout:         {}s", collector.timeout_secs);
    println!();
    println!("Config file:     {}", Config::config_path().display());
    println!("Log file:        {}", Config::log_path().display());

    println!();
    if collector.is_ready() {
        println!("Status: Ready to deliver");
    } else {
        println!("Status: Not ready (missing required configuration)");
    }

    Ok(())
}

async fn cmd_ping(config: &Config) -> Result<()> {
    if !config.collector.is_ready() {
        println!("Collector is not configured. Run 'status' for details.");
        return Ok(());
    }

    let agent_id = config
        .collector
        .agent_id
        .as_deref()
        .unwrap_or("agentpulse-cli");
    let transport = HttpTransport::new(&config.collector, agent_id)
        .context("failed to create collector transport")?;

    let url = config.collector.server_url.as_deref().unwrap_or_default();
    println!("Pinging {} ...", url);

    if transport.health_check().await {
        println!("Collector is reachable");
        Ok(())
    } else {
        bail!("collector did not answer at {}", url);
    }
}

async fn cmd_send(
    config: &Config,
    task_id: String,
    failed: bool,
    error: Option<String>,
    duration_ms: u64,
    metrics: Option<String>,
) -> Result<()> {
    if !config.collector.is_ready() {
        println!("Collector is not configured. Run 'status' for details.");
        return Ok(());
    }

    // A smoke test wants the delivery failure itself, not a log line
    // about it
    let mut collector = config.collector.clone();
    collector.strict = true;

    let client = PulseClient::new(collector).context("failed to create pulse client")?;

    let mut report = if failed {
        TaskReport::failure(
            task_id.as_str(),
            duration_ms,
            error.unwrap_or_else(|| "unspecified".to_string()),
        )
    } else {
        TaskReport::success(task_id.as_str(), duration_ms)
    };

    if let Some(metrics) = metrics {
        let metrics = serde_json::from_str(&metrics).context("invalid --metrics JSON")?;
        report = report.with_metrics(metrics);
    }

    println!(
        "Sending task event '{}' as agent '{}' ...",
        task_id,
        client.agent_id()
    );

    client.record(report).context("failed to record event")?;
    let delivered = client.flush().await.context("delivery failed")?;
    client
        .shutdown()
        .await
        .context("failed to shut down client")?;

    if delivered == 0 {
        bail!("collector accepted no events");
    }

    println!("Delivered {} event(s)", delivered);

    let stats = client.stats();
    if stats.retries > 0 {
        println!("Retries needed:  {}", stats.retries);
    }

    Ok(())
}

async fn cmd_score(config: &Config, agent_id: Option<String>) -> Result<()> {
    if !config.collector.is_ready() {
        println!("Collector is not configured. Run 'status' for details.");
        return Ok(());
    }

    let client =
        PulseClient::new(config.collector.clone()).context("failed to create pulse client")?;

    let score = client
        .score(agent_id.as_deref())
        .await
        .context("failed to fetch score")?;
    client
        .shutdown()
        .await
        .context("failed to shut down client")?;

    println!("Agent:           {}", score.agent_id);
    println!("Score:           {:.2}", score.score);
    println!("Events counted:  {}", score.events_counted);
    if let Some(computed_at) = score.computed_at {
        println!(
            "Computed at:     {}",
            computed_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }

    Ok(())
}
