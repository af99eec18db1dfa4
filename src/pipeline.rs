//! Report retrieval pipeline: request generation, poll until ready, download
//! the archive, extract it, and locate the delimited-text file.

use crate::pace::Pacer;
use crate::reports_api::{ReportRequest, ReportsApi};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Maximum number of status checks before giving up on a report.
pub const POLL_ATTEMPTS: u32 = 30;

/// Delay after each status check that did not report success.
pub const POLL_DELAY: Duration = Duration::from_millis(5000);

const REPORT_READY_STATUS: &str = "SUCCESS";

/// Failure kinds for the retrieval pipeline. Each aborts the current run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("report request failed: {0}")]
    ReportRequest(String),

    #[error("timed out waiting for report to be ready")]
    PollTimeout,

    #[error("error checking report status: {0}")]
    PollTransport(String),

    #[error("download or extract failed: {0}")]
    DownloadOrExtract(String),

    #[error("CSV not found after unzip")]
    MissingCsv,
}

/// Lifecycle of one report request, advanced only by the polling loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleStatus {
    Pending,
    Success,
    Failed,
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct ReportHandle {
    pub request_id: String,
    pub status: HandleStatus,
    pub download_href: Option<String>,
}

impl ReportHandle {
    fn new(request_id: String) -> Self {
        Self {
            request_id,
            status: HandleStatus::Pending,
            download_href: None,
        }
    }
}

/// Runs the full retrieval pipeline and returns the path of the extracted
/// report file inside `data_dir`.
pub fn fetch_report_file(
    api: &dyn ReportsApi,
    pacer: &dyn Pacer,
    request: &ReportRequest,
    data_dir: &Path,
) -> Result<PathBuf, PipelineError> {
    let request_id = api
        .create_report(request)
        .map_err(|e| PipelineError::ReportRequest(format!("{:#}", e)))?;

    let mut handle = ReportHandle::new(request_id);
    let href = poll_until_ready(api, pacer, &mut handle)?;

    // The media file id is the last path segment of the download link.
    let file_id = href.rsplit('/').next().unwrap_or("");
    download_and_extract(api, file_id, &request.window_start, data_dir)
}

/// Polls report status up to [`POLL_ATTEMPTS`] times, pausing after every
/// check that was not yet successful. A transport or non-success HTTP error
/// terminates polling immediately rather than consuming the attempt budget.
fn poll_until_ready(
    api: &dyn ReportsApi,
    pacer: &dyn Pacer,
    handle: &mut ReportHandle,
) -> Result<String, PipelineError> {
    for attempt in 1..=POLL_ATTEMPTS {
        let status = api.fetch_status(&handle.request_id).map_err(|e| {
            handle.status = HandleStatus::Failed;
            PipelineError::PollTransport(format!("{:#}", e))
        })?;

        println!(
            "[pipeline] attempt {}: status = {}",
            attempt, status.request_status
        );

        if status.request_status == REPORT_READY_STATUS {
            if let Some(href) = status.download_href {
                handle.status = HandleStatus::Success;
                handle.download_href = Some(href.clone());
                return Ok(href);
            }
        }

        pacer.pause(POLL_DELAY);
    }

    handle.status = HandleStatus::TimedOut;
    Err(PipelineError::PollTimeout)
}

fn download_and_extract(
    api: &dyn ReportsApi,
    file_id: &str,
    date_label: &str,
    data_dir: &Path,
) -> Result<PathBuf, PipelineError> {
    let bytes = api
        .download_archive(file_id)
        .map_err(|e| PipelineError::DownloadOrExtract(format!("{:#}", e)))?;

    let zip_path = data_dir.join(format!("{}.zip", date_label));
    std::fs::write(&zip_path, &bytes)
        .map_err(|e| PipelineError::DownloadOrExtract(format!("write archive: {}", e)))?;

    extract_archive(&zip_path, data_dir)?;

    std::fs::remove_file(&zip_path)
        .map_err(|e| PipelineError::DownloadOrExtract(format!("delete archive: {}", e)))?;
    println!("[pipeline] deleted temporary zip: {}", zip_path.display());

    locate_report_file(data_dir)
}

fn extract_archive(zip_path: &Path, data_dir: &Path) -> Result<(), PipelineError> {
    let file = File::open(zip_path)
        .map_err(|e| PipelineError::DownloadOrExtract(format!("open archive: {}", e)))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| PipelineError::DownloadOrExtract(format!("read archive: {}", e)))?;
    archive
        .extract(data_dir)
        .map_err(|e| PipelineError::DownloadOrExtract(format!("extract archive: {}", e)))?;
    Ok(())
}

/// Finds the extracted `.csv` file. Earlier reports renamed to `.csv.done`
/// no longer carry the `csv` extension and are skipped.
fn locate_report_file(data_dir: &Path) -> Result<PathBuf, PipelineError> {
    let entries = std::fs::read_dir(data_dir)
        .map_err(|e| PipelineError::DownloadOrExtract(format!("list data dir: {}", e)))?;

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "csv") {
            println!("[pipeline] found report file: {}", path.display());
            return Ok(path);
        }
    }

    Err(PipelineError::MissingCsv)
}
