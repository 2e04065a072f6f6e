//! Telemetry Analytics CLI
//!
//! A command-line tool for querying analytics, inspecting anomalies and
//! submitting observations to the analytics server.

mod client;
mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use commands::{analytics, health};

/// Telemetry Analytics CLI
#[derive(Parser)]
#[command(name = "anactl")]
#[command(author, version, about = "CLI for the Telemetry Analytics service", long_about = None)]
pub struct Cli {
    /// API endpoint URL [default: http://localhost:8080]
    #[arg(long, env = "ANACTL_API_URL")]
    pub api_url: Option<String>,

    /// Output format (falls back to the config file, then table)
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show processed, anomaly and rolling-average statistics
    Stats,

    /// Show the observations in the current window
    Window,

    /// List recent anomalies
    Anomalies {
        /// Maximum number of records to show
        #[arg(long, short, default_value_t = 10)]
        limit: usize,
    },

    /// Show cache usage
    Cache,

    /// Show service health and readiness
    Health,

    /// Submit one observation
    Submit {
        /// Device identifier
        #[arg(long)]
        device: String,

        /// CPU usage percentage (0-100)
        #[arg(long)]
        cpu: f64,

        /// Memory usage in megabytes
        #[arg(long)]
        memory: f64,

        /// Requests per second
        #[arg(long)]
        rps: u64,

        /// Observation time (RFC 3339); the server uses now if omitted
        #[arg(long, value_parser = analytics::parse_timestamp)]
        timestamp: Option<DateTime<Utc>>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let file_config = config::Config::load().context("Failed to load CLI configuration")?;
    let api_url = file_config.resolve_api_url(cli.api_url);
    let format = file_config.resolve_format(cli.format)?;

    let client = client::ApiClient::new(&api_url)?;

    match cli.command {
        Commands::Stats => analytics::show_stats(&client, format).await?,
        Commands::Window => analytics::show_window(&client, format).await?,
        Commands::Anomalies { limit } => analytics::show_anomalies(&client, limit, format).await?,
        Commands::Cache => analytics::show_cache(&client, format).await?,
        Commands::Health => health::show_health(&client, format).await?,
        Commands::Submit {
            device,
            cpu,
            memory,
            rps,
            timestamp,
        } => {
            let request = client::SubmitRequest {
                timestamp,
                device_id: device,
                cpu_usage: cpu,
                memory_mb: memory,
                rps,
            };
            analytics::submit_observation(&client, request, format).await?;
        }
    }

    Ok(())
}
