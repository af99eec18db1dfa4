//! HTTP client for the usage reporting API.
//!
//! Report generation is asynchronous on the provider side: a POST creates a
//! report request, a GET polls its status, and a final GET fetches the
//! finished archive from the media endpoint.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::time::Duration;

const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Parameters for one report generation request.
#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub product: String,
    pub account_id: String,
    pub direction: String,
    pub window_start: String,
    pub window_end: String,
}

impl ReportRequest {
    /// Builds the standard daily outbound-messages request for one calendar
    /// day (`window_start == window_end`, ISO dates).
    pub fn daily(account_id: &str, date: &str) -> Self {
        Self {
            product: "MESSAGES".to_string(),
            account_id: account_id.to_string(),
            direction: "outbound".to_string(),
            window_start: date.to_string(),
            window_end: date.to_string(),
        }
    }
}

/// One polled status response.
#[derive(Debug, Clone)]
pub struct ReportStatus {
    pub request_status: String,
    pub download_href: Option<String>,
}

/// Seam over the reporting API so the pipeline can be driven by scripted
/// fakes in tests.
pub trait ReportsApi: Send + Sync {
    /// Submits a report request and returns the provider's request id.
    fn create_report(&self, request: &ReportRequest) -> Result<String>;

    /// Fetches the current status for a request id. Non-success HTTP
    /// responses surface as errors.
    fn fetch_status(&self, request_id: &str) -> Result<ReportStatus>;

    /// Downloads the finished report archive by media file id.
    fn download_archive(&self, file_id: &str) -> Result<Vec<u8>>;
}

/// Production client speaking to the Vonage Reports and Media APIs.
pub struct VonageReportsClient {
    agent: ureq::Agent,
    reports_url: String,
    media_url: String,
    auth_header: String,
}

impl VonageReportsClient {
    pub fn new(reports_url: &str, media_url: &str, api_key: &str, api_secret: &str) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(API_TIMEOUT))
            .build()
            .into();
        Self {
            agent,
            reports_url: reports_url.trim_end_matches('/').to_string(),
            media_url: media_url.trim_end_matches('/').to_string(),
            auth_header: basic_auth(api_key, api_secret),
        }
    }
}

impl ReportsApi for VonageReportsClient {
    fn create_report(&self, request: &ReportRequest) -> Result<String> {
        let payload = serde_json::json!({
            "product": request.product,
            "account_id": request.account_id,
            "direction": request.direction,
            "date_start": format!("{}T00:00:00+00:00", request.window_start),
            "date_end": format!("{}T23:59:59+00:00", request.window_end),
            "include_subaccounts": "false",
            "include_message": "false",
        });
        let body = serde_json::to_string(&payload).context("Failed to serialize report request")?;

        let response: String = self
            .agent
            .post(&self.reports_url)
            .header("Authorization", &self.auth_header)
            .header("Content-Type", "application/json")
            .send(&body)
            .context("Failed to create report")?
            .body_mut()
            .read_to_string()
            .context("Failed to read create-report response")?;

        let json: serde_json::Value =
            serde_json::from_str(&response).context("Failed to parse create-report response")?;
        let request_id = json["request_id"]
            .as_str()
            .context("Missing request_id in create-report response")?
            .to_string();

        println!("[reports-api] report requested, request_id = {}", request_id);
        Ok(request_id)
    }

    fn fetch_status(&self, request_id: &str) -> Result<ReportStatus> {
        let url = format!("{}/{}", self.reports_url, request_id);

        let response: String = self
            .agent
            .get(&url)
            .header("Authorization", &self.auth_header)
            .header("Content-Type", "application/json")
            .call()
            .context("Error checking report status")?
            .body_mut()
            .read_to_string()
            .context("Failed to read report status response")?;

        let json: serde_json::Value =
            serde_json::from_str(&response).context("Failed to parse report status response")?;

        Ok(ReportStatus {
            request_status: json["request_status"].as_str().unwrap_or_default().to_string(),
            download_href: json["_links"]["download_report"]["href"]
                .as_str()
                .map(String::from),
        })
    }

    fn download_archive(&self, file_id: &str) -> Result<Vec<u8>> {
        let url = format!("{}/{}", self.media_url, file_id);

        let bytes = self
            .agent
            .get(&url)
            .header("Authorization", &self.auth_header)
            .call()
            .context("Failed to download report archive")?
            .body_mut()
            .read_to_vec()
            .context("Failed to read report archive body")?;

        Ok(bytes)
    }
}

fn basic_auth(api_key: &str, api_secret: &str) -> String {
    format!(
        "Basic {}",
        BASE64.encode(format!("{}:{}", api_key, api_secret))
    )
}
