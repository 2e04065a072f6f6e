//! Service health commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_status, format_timestamp, print_json, print_rows, print_success, print_warning,
    OutputFormat,
};

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Show liveness and readiness of the server
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;
    let readiness = client.readiness().await?;

    match format {
        OutputFormat::Json => {
            print_json(&serde_json::json!({
                "health": health,
                "readiness": readiness,
            }))?;
        }
        OutputFormat::Table => {
            println!("{}", "Service Health".bold());
            println!("{}", "=".repeat(50));
            println!("Endpoint:     {}", client.base_url().as_str().cyan());
            println!("Status:       {}", color_status(&health.status));
            println!("Cache:        {}", color_status(&health.cache));
            println!("Environment:  {}", health.environment);
            println!("Checked:      {}", format_timestamp(&health.timestamp));
            println!();

            let mut rows: Vec<ComponentRow> = health
                .components
                .iter()
                .map(|(name, c)| ComponentRow {
                    name: name.clone(),
                    status: color_status(&c.status),
                    message: c.message.clone().unwrap_or_default(),
                })
                .collect();
            rows.sort_by(|a, b| a.name.cmp(&b.name));
            print_rows(rows, "No components registered");
            println!();

            if readiness.ready {
                print_success("Ready to accept observations");
            } else {
                print_warning(&format!(
                    "Not ready: {}",
                    readiness.reason.as_deref().unwrap_or("unknown reason")
                ));
            }
        }
    }

    Ok(())
}
