//! Analytics query and ingestion commands

use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, Observation, SubmitRequest};
use crate::output::{
    color_rate, format_bytes, format_timestamp, print_info, print_json, print_rows,
    print_success, OutputFormat,
};

/// Row for observation tables
#[derive(Tabled)]
struct ObservationRow {
    #[tabled(rename = "Timestamp")]
    timestamp: String,
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "CPU %")]
    cpu: String,
    #[tabled(rename = "Memory MB")]
    memory: String,
    #[tabled(rename = "RPS")]
    rps: u64,
}

impl From<&Observation> for ObservationRow {
    fn from(o: &Observation) -> Self {
        Self {
            timestamp: format_timestamp(&o.timestamp),
            device: o.device_id.clone(),
            cpu: format!("{:.1}", o.cpu_usage),
            memory: format!("{:.1}", o.memory_mb),
            rps: o.rps,
        }
    }
}

#[derive(Tabled)]
struct AnomalyRow {
    #[tabled(rename = "Detected")]
    detected: String,
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "RPS")]
    rps: String,
    #[tabled(rename = "Rolling Avg")]
    rolling_avg: String,
}

/// Show aggregate statistics
pub async fn show_stats(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let stats = client.stats().await?;

    match format {
        OutputFormat::Json => {
            // The window has its own command
            print_json(&serde_json::json!({
                "total_metrics": stats.total_metrics,
                "anomalies_detected": stats.anomalies_detected,
                "anomaly_rate_percent": stats.anomaly_rate_percent,
                "rolling_average_rps": stats.rolling_average_rps,
                "window_size": stats.window_size,
            }))?;
        }
        OutputFormat::Table => {
            println!("{}", "Analytics Summary".bold());
            println!("{}", "=".repeat(50));
            println!("Metrics Processed:    {}", stats.total_metrics);
            println!("Anomalies Detected:   {}", stats.anomalies_detected);
            println!("Anomaly Rate:         {}", color_rate(stats.anomaly_rate_percent));
            println!(
                "Rolling Avg RPS:      {}",
                format!("{:.2}", stats.rolling_average_rps).cyan()
            );
            println!("Window Fill:          {}", stats.window_size);
        }
    }

    Ok(())
}

/// Show the observations currently in the window
pub async fn show_window(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let stats = client.stats().await?;

    match format {
        OutputFormat::Json => print_json(&stats.current_window)?,
        OutputFormat::Table => {
            let rows: Vec<ObservationRow> =
                stats.current_window.iter().map(ObservationRow::from).collect();
            print_rows(rows, "Window is empty");
            println!(
                "\n{} observations, rolling average {:.2} rps",
                stats.window_size, stats.rolling_average_rps
            );
        }
    }

    Ok(())
}

/// List recent anomalies held in the cache
pub async fn show_anomalies(client: &ApiClient, limit: usize, format: OutputFormat) -> Result<()> {
    let result = client.anomalies(limit).await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            let rows: Vec<AnomalyRow> = result
                .recent_anomalies
                .iter()
                .map(|a| AnomalyRow {
                    detected: format_timestamp(&a.timestamp),
                    device: a.metric.device_id.clone(),
                    rps: a.metric.rps.to_string().red().to_string(),
                    rolling_avg: format!("{:.2}", a.rolling_avg),
                })
                .collect();
            let count = rows.len();
            print_rows(rows, "No anomalies recorded (or no cache configured)");
            if count > 0 {
                println!("\nTotal: {} anomalies", count);
            }
        }
    }

    Ok(())
}

/// Show approximate cache usage
pub async fn show_cache(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let stats = client.cache_stats().await?;

    match format {
        OutputFormat::Json => print_json(&stats)?,
        OutputFormat::Table => {
            if stats.cache_size_bytes == 0 {
                print_info("Cache is empty or not configured");
            } else {
                println!(
                    "Cache Size: {} ({} bytes)",
                    format_bytes(stats.cache_size_bytes).cyan(),
                    stats.cache_size_bytes
                );
            }
        }
    }

    Ok(())
}

/// Submit a single observation
pub async fn submit_observation(
    client: &ApiClient,
    request: SubmitRequest,
    format: OutputFormat,
) -> Result<()> {
    let response = client.submit(&request).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            print_success(&format!(
                "Observation from {} accepted at {}",
                request.device_id.cyan(),
                format_timestamp(&response.timestamp)
            ));
            println!("Rolling Avg RPS: {:.2}", response.rolling_avg);
            println!("Anomaly status is determined asynchronously; check `anactl anomalies`.");
        }
    }

    Ok(())
}

/// Parse an RFC 3339 timestamp argument
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 timestamp: {}", e))
}
