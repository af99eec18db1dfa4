mod config;
mod job;
mod job_log;
mod normalize;
mod pace;
mod pipeline;
mod report_csv;
mod reports_api;
mod scheduler;
mod server;
mod submit;

use anyhow::{Context, Result};
use clap::Parser;
use config::Config;
use job::JobRunner;
use job_log::JobLogger;
use scheduler::{Clock, Scheduler, SystemClock, Triggerable};
use server::ServerContext;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "report-relay")]
#[command(about = "Fetches the previous day's usage report and forwards it to the ingestion endpoint")]
#[command(version)]
struct Cli {
    /// Run the job immediately instead of waiting for the scheduled time
    #[arg(long)]
    now: bool,

    /// Override the listening port from the environment
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env().context("Invalid configuration")?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    std::fs::create_dir_all(&config.data_dir).context("Failed to create data directory")?;

    let config = Arc::new(config);
    let logger = Arc::new(JobLogger::new(&config.data_dir.join("logs"))?);
    let runner = JobRunner::new(config.clone(), logger);

    if cli.now {
        runner.trigger().await;
    }

    let job: Arc<dyn Triggerable> = Arc::new(runner);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let run_at = (config.run_hour, config.run_minute);

    let scheduler = Scheduler::start(job.clone(), clock.clone(), run_at);
    let context = Arc::new(ServerContext { clock, job, run_at });

    let result = server::run(config.port, context).await;
    scheduler.shutdown().await;
    result
}
