// src/main.rs

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::env;
use std::error::Error;

// Response types
#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct SyncResult {
    success: bool,
    employees_synced: usize,
    errors: Vec<String>,
    synced_at: String,
}

#[derive(Debug, Deserialize)]
struct WeekSummary {
    week_start_date: String,
    employee_count: u32,
    total_hours: Value,
}

#[derive(Debug, Deserialize)]
struct GenerationSummary {
    week_start: String,
    created: usize,
    updated: usize,
    records: Vec<Value>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let base_url = env::var("PAYROLL_API_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
    let week_start = env::args().nth(1);
    let client = Client::new();

    // Test 1: Health check
    println!("\n🔍 Testing health check endpoint...");
    let health_response = client
        .get(format!("{}/health", base_url))
        .send()
        .await?
        .json::<HealthResponse>()
        .await?;
    println!("Health check response: {:?}", health_response);

    // Test 2: Sync
    println!("\n🔍 Triggering hours sync...");
    let mut sync_request = client.post(format!("{}/api/sync", base_url));
    if let Some(week) = &week_start {
        sync_request = sync_request.query(&[("week_start", week.as_str())]);
    }
    let sync_result = sync_request.send().await?.json::<SyncResult>().await?;
    println!(
        "Sync success={} employees={} at {}",
        sync_result.success, sync_result.employees_synced, sync_result.synced_at
    );
    for err in &sync_result.errors {
        println!("  ⚠️ {}", err);
    }

    // Test 3: Available weeks
    println!("\n🔍 Listing timesheet weeks...");
    let weeks = client
        .get(format!("{}/api/timesheets/weeks", base_url))
        .send()
        .await?
        .json::<Vec<WeekSummary>>()
        .await?;
    for week in &weeks {
        println!(
            "  {}: {} employees, {} hours",
            week.week_start_date, week.employee_count, week.total_hours
        );
    }

    // Test 4: Generate payroll for the requested week, or the newest synced one
    let Some(target_week) = week_start.or_else(|| weeks.first().map(|w| w.week_start_date.clone()))
    else {
        println!("\n⚠️ No timesheet weeks available; skipping payroll generation.");
        return Ok(());
    };
    println!("\n🔍 Generating payroll for week {}...", target_week);
    let response = client
        .post(format!("{}/api/payroll/generate", base_url))
        .json(&json!({ "week_start": target_week }))
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        println!("Generation failed ({}): {}", status, response.text().await?);
        return Ok(());
    }
    let summary = response.json::<GenerationSummary>().await?;
    println!(
        "Week {}: created {}, updated {}, {} records",
        summary.week_start,
        summary.created,
        summary.updated,
        summary.records.len()
    );

    Ok(())
}
