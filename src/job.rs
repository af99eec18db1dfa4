//! Job orchestrator: runs the retrieval pipeline, transforms the report and
//! submits the result, then marks the source file as processed.

use crate::config::Config;
use crate::job_log::JobLogger;
use crate::normalize::{normalize_row, ColumnMap, NormalizedEvent};
use crate::pace::{Pacer, ThreadPacer};
use crate::pipeline;
use crate::report_csv;
use crate::reports_api::{ReportRequest, ReportsApi, VonageReportsClient};
use crate::scheduler::Triggerable;
use crate::submit::{BatchSubmitter, HttpIngestSink, IngestSink};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Suffix appended to a fully processed report file.
pub const PROCESSED_SUFFIX: &str = ".done";

/// Counters from one successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Parsed rows, including the header.
    pub rows: usize,
    /// Events forwarded after filtering.
    pub events: usize,
    /// Batches actually delivered; batches dropped by the error policy are
    /// not counted.
    pub batches: usize,
}

/// Reporting window for the previous local calendar day, as an ISO date.
pub fn yesterday() -> String {
    let date = chrono::Local::now() - chrono::Duration::days(1);
    date.format("%Y-%m-%d").to_string()
}

/// Runs one complete job: retrieve, parse, normalize, submit, mark done.
///
/// Any stage error aborts the run; the source file is renamed only after the
/// submission loop finishes without an unrecovered error.
pub fn run_job(
    config: &Config,
    api: &dyn ReportsApi,
    sink: &dyn IngestSink,
    pacer: &dyn Pacer,
) -> Result<RunSummary> {
    let window = yesterday();
    run_job_for_window(config, api, sink, pacer, &window)
}

fn run_job_for_window(
    config: &Config,
    api: &dyn ReportsApi,
    sink: &dyn IngestSink,
    pacer: &dyn Pacer,
    window: &str,
) -> Result<RunSummary> {
    println!("[job] fetching report for: {}", window);

    let request = ReportRequest::daily(&config.account_id, window);
    let report_path = pipeline::fetch_report_file(api, pacer, &request, &config.data_dir)?;

    let text = std::fs::read_to_string(&report_path).context("Failed to read report file")?;
    let rows = report_csv::parse(&text);
    println!("[job] total records to process: {}", rows.len());

    let columns = ColumnMap::default();
    let events: Vec<NormalizedEvent> = rows
        .iter()
        .skip(1) // header row is not data
        .filter_map(|row| normalize_row(&columns, row))
        .collect();

    let submitter = BatchSubmitter::with_policy(config.chunk_size, config.on_batch_error);
    let batches = submitter.submit_all(sink, pacer, &events)?;
    println!("[job] job complete");

    let done_path = mark_processed(&report_path)?;
    println!("[job] renamed report to: {}", done_path.display());

    Ok(RunSummary {
        rows: rows.len(),
        events: events.len(),
        batches,
    })
}

/// Renames the report file to its processed marker so the next run cannot
/// pick it up again.
fn mark_processed(path: &Path) -> Result<PathBuf> {
    let mut done = path.as_os_str().to_os_string();
    done.push(PROCESSED_SUFFIX);
    let done = PathBuf::from(done);
    std::fs::rename(path, &done).context("Failed to rename processed report")?;
    Ok(done)
}

/// Owns the production wiring for job runs and makes them triggerable from
/// the scheduler and the HTTP surface.
#[derive(Clone)]
pub struct JobRunner {
    config: Arc<Config>,
    logger: Arc<JobLogger>,
    in_flight: Arc<AtomicBool>,
}

impl JobRunner {
    pub fn new(config: Arc<Config>, logger: Arc<JobLogger>) -> Self {
        Self {
            config,
            logger,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Claims the single run slot. Returns false if a run is already
    /// active; the trigger and the HTTP surface share this slot, so at most
    /// one run is in flight no matter which side fires.
    fn try_begin_run(&self) -> bool {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn finish_run(&self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }

    /// Runs the job once, synchronously. Never propagates errors: a failed
    /// run is logged and the process keeps serving the schedule.
    pub fn run_once(&self) {
        self.logger.increment_run_id();
        self.logger.log_run_started(&yesterday());

        let api = VonageReportsClient::new(
            &self.config.reports_url,
            &self.config.media_url,
            &self.config.api_key,
            &self.config.api_secret,
        );
        let sink = HttpIngestSink::new(&self.config.push_url);

        match run_job(&self.config, &api, &sink, &ThreadPacer) {
            Ok(summary) => {
                self.logger
                    .log_run_completed(summary.rows, summary.events, summary.batches);
            }
            Err(e) => {
                eprintln!("[job] job failed: {:#}", e);
                self.logger.log_run_failed(&format!("{:#}", e));
            }
        }
    }
}

#[async_trait]
impl Triggerable for JobRunner {
    async fn trigger(&self) {
        if !self.try_begin_run() {
            eprintln!("[job] run already in progress, skipping trigger");
            self.logger.log_trigger_skipped();
            return;
        }

        self.logger
            .log_trigger_fired(self.config.run_hour, self.config.run_minute);
        let runner = self.clone();
        let result = tokio::task::spawn_blocking(move || runner.run_once()).await;
        self.finish_run();
        if result.is_err() {
            eprintln!("[job] job task panicked");
        }
    }
}
