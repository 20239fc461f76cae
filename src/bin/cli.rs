//! Command-line client for a running VitalWatch server
//!
//! Usage:
//!   vitalwatch-cli submit <patient_id> <systolic> <diastolic>
//!   vitalwatch-cli vitals [patient_id]
//!   vitalwatch-cli alerts [patient_id]
//!   vitalwatch-cli messages
//!
//! VITALWATCH_URL selects the server (default: http://localhost:8080).

use reqwest::Client;
use serde_json::json;
use vitalwatch::api::handlers::{
    AlertsResponse, IngestVitalResponse, MessagesResponse, VitalsResponse,
};

const USAGE: &str = "usage: vitalwatch-cli <submit <patient_id> <systolic> <diastolic> | vitals [patient_id] | alerts [patient_id] | messages>";

fn format_time(unix: i64) -> String {
    chrono::DateTime::from_timestamp(unix, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, Box<dyn std::error::Error>> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body: serde_json::Value = response.json().await.unwrap_or_default();
    let message = body["error"].as_str().unwrap_or("request failed").to_string();
    Err(format!("{}: {}", status, message).into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let base_url =
        std::env::var("VITALWATCH_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    let client = Client::new();

    let command = args.get(1).map(String::as_str).unwrap_or_default();
    let patient_filter = args.get(2).cloned().unwrap_or_default();

    match command {
        "submit" => {
            let (Some(patient_id), Some(systolic), Some(diastolic)) = (
                args.get(2),
                args.get(3).and_then(|s| s.parse::<i32>().ok()),
                args.get(4).and_then(|s| s.parse::<i32>().ok()),
            ) else {
                return Err(USAGE.into());
            };

            let response = client
                .post(format!("{}/vitals", base_url))
                .json(&json!({
                    "patient_id": patient_id,
                    "systolic": systolic,
                    "diastolic": diastolic,
                    "taken_at": chrono::Utc::now().timestamp(),
                }))
                .send()
                .await?;
            let body: IngestVitalResponse = check(response).await?.json().await?;
            println!(
                "Stored vital {} for {}: {}/{}",
                body.vital.id, body.vital.patient_id, body.vital.systolic, body.vital.diastolic
            );
        }
        "vitals" => {
            let response = client
                .get(format!("{}/vitals", base_url))
                .query(&[("patient_id", &patient_filter)])
                .send()
                .await?;
            let body: VitalsResponse = check(response).await?.json().await?;
            for v in body.vitals {
                println!(
                    "{:>5}  {:<16} {:>3}/{:<3}  taken {}",
                    v.id,
                    v.patient_id,
                    v.systolic,
                    v.diastolic,
                    format_time(v.taken_at)
                );
            }
        }
        "alerts" => {
            let response = client
                .get(format!("{}/alerts", base_url))
                .query(&[("patient_id", &patient_filter)])
                .send()
                .await?;
            let body: AlertsResponse = check(response).await?.json().await?;
            for a in body.alerts {
                println!(
                    "{:>5}  {:<16} {:<20} {}  ({})",
                    a.id,
                    a.vital.patient_id,
                    a.status.to_string(),
                    a.reason,
                    format_time(a.created_at)
                );
            }
        }
        "messages" => {
            let response = client.get(format!("{}/messages", base_url)).send().await?;
            let body: MessagesResponse = check(response).await?.json().await?;
            for m in body.messages {
                println!(
                    "{:>5}  {:<16} {:<10} {}",
                    m.id,
                    m.patient_id,
                    m.status.to_string(),
                    m.content
                );
            }
        }
        _ => return Err(USAGE.into()),
    }

    Ok(())
}
