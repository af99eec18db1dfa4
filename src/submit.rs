//! Chunked delivery of normalized events to the ingestion endpoint.

use crate::normalize::NormalizedEvent;
use crate::pace::Pacer;
use anyhow::{Context, Result};
use std::str::FromStr;
use std::time::Duration;

/// Default number of events per delivery.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Pause between successive deliveries to throttle the ingestion endpoint.
pub const BATCH_PAUSE: Duration = Duration::from_millis(2000);

const SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);

/// What to do when a single batch delivery fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchErrorPolicy {
    /// Log the failure and move on to the next batch (no retry, no rollback).
    #[default]
    Continue,
    /// Abort the whole run on the first failed batch.
    Abort,
    /// Retry the batch up to N more times, then log and continue.
    Retry(u32),
}

impl FromStr for BatchErrorPolicy {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw {
            "continue" => Ok(BatchErrorPolicy::Continue),
            "abort" => Ok(BatchErrorPolicy::Abort),
            other => {
                let attempts = other
                    .strip_prefix("retry:")
                    .and_then(|n| n.parse::<u32>().ok())
                    .with_context(|| {
                        format!(
                            "Invalid batch error policy '{}' (expected continue, abort or retry:N)",
                            other
                        )
                    })?;
                Ok(BatchErrorPolicy::Retry(attempts))
            }
        }
    }
}

/// Delivery seam for one batch; the HTTP implementation is swapped out for a
/// recording fake in tests.
pub trait IngestSink: Send + Sync {
    fn deliver(&self, batch: &[NormalizedEvent]) -> Result<()>;
}

/// POSTs batches as a JSON array to the configured endpoint.
pub struct HttpIngestSink {
    agent: ureq::Agent,
    push_url: String,
}

impl HttpIngestSink {
    pub fn new(push_url: &str) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(SUBMIT_TIMEOUT))
            .build()
            .into();
        Self {
            agent,
            push_url: push_url.to_string(),
        }
    }
}

impl IngestSink for HttpIngestSink {
    fn deliver(&self, batch: &[NormalizedEvent]) -> Result<()> {
        let body = serde_json::to_string(batch).context("Failed to serialize batch")?;

        let text: String = self
            .agent
            .post(&self.push_url)
            .header("Content-Type", "application/json")
            .send(&body)
            .context("Failed to POST batch to ingestion endpoint")?
            .body_mut()
            .read_to_string()
            .context("Failed to read ingestion response")?;

        // The response body is informational only; log a preview.
        let preview: String = text.chars().take(200).collect();
        println!("[submit] server response: {}", preview);
        Ok(())
    }
}

/// Partitions events into order-preserving batches and delivers them
/// sequentially with a pause between (but not after) deliveries.
pub struct BatchSubmitter {
    chunk_size: usize,
    policy: BatchErrorPolicy,
}

impl BatchSubmitter {
    #[allow(dead_code)]
    pub fn new(chunk_size: usize) -> Self {
        Self::with_policy(chunk_size, BatchErrorPolicy::default())
    }

    pub fn with_policy(chunk_size: usize, policy: BatchErrorPolicy) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            policy,
        }
    }

    /// Delivers all events and returns the number of batches that were
    /// actually delivered. Batches dropped under the continue policy do not
    /// count.
    pub fn submit_all(
        &self,
        sink: &dyn IngestSink,
        pacer: &dyn Pacer,
        events: &[NormalizedEvent],
    ) -> Result<usize> {
        let mut delivered = 0;
        for (index, batch) in events.chunks(self.chunk_size).enumerate() {
            if index > 0 {
                pacer.pause(BATCH_PAUSE);
            }
            println!("[submit] sending {} items...", batch.len());
            if self.deliver_one(sink, batch)? {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    /// Returns whether the batch was delivered; `Ok(false)` means the
    /// failure was absorbed by the policy and the batch was dropped.
    fn deliver_one(&self, sink: &dyn IngestSink, batch: &[NormalizedEvent]) -> Result<bool> {
        let mut attempts_left = match self.policy {
            BatchErrorPolicy::Retry(n) => n,
            _ => 0,
        };

        loop {
            match sink.deliver(batch) {
                Ok(()) => return Ok(true),
                Err(e) => {
                    if attempts_left > 0 {
                        attempts_left -= 1;
                        eprintln!("[submit] batch delivery failed, retrying: {:#}", e);
                        continue;
                    }
                    if self.policy == BatchErrorPolicy::Abort {
                        return Err(e.context("Batch delivery failed"));
                    }
                    eprintln!("[submit] batch delivery failed, continuing: {:#}", e);
                    return Ok(false);
                }
            }
        }
    }
}
