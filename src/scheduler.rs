//! Self-rescheduling trigger for the daily job.
//!
//! A single task checks the wall clock once a minute and runs the job when
//! the configured run time matches, awaiting the run before arming the next
//! check. The timer is armed per-tick rather than as a fixed-period
//! interval, so the schedule drifts by the job's own runtime when a run
//! fires. The clock and job are injected so tests never wait on real time.

use async_trait::async_trait;
use chrono::Timelike;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Period between wall-clock checks.
pub const CHECK_PERIOD: Duration = Duration::from_secs(60);

/// Wall-clock source.
pub trait Clock: Send + Sync {
    /// Current local hour and minute.
    fn local_hour_minute(&self) -> (u32, u32);
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn local_hour_minute(&self) -> (u32, u32) {
        let now = chrono::Local::now();
        (now.hour(), now.minute())
    }
}

/// Something the trigger can run; the job orchestrator implements this.
#[async_trait]
pub trait Triggerable: Send + Sync {
    async fn trigger(&self);
}

/// Checks the clock against the run time and triggers the job on a match.
/// Idempotent with respect to the check itself; returns whether it fired.
pub async fn check_and_trigger(
    clock: &dyn Clock,
    run_at: (u32, u32),
    job: &dyn Triggerable,
) -> bool {
    if clock.local_hour_minute() == run_at {
        job.trigger().await;
        true
    } else {
        false
    }
}

/// Owned scheduler with its own task and a stop channel for clean shutdown.
pub struct Scheduler {
    stop_tx: mpsc::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
}

impl Scheduler {
    pub fn start(job: Arc<dyn Triggerable>, clock: Arc<dyn Clock>, run_at: (u32, u32)) -> Self {
        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(CHECK_PERIOD) => {
                        // The run is awaited, so at most one is in flight and
                        // the next check is armed only after it finishes.
                        check_and_trigger(clock.as_ref(), run_at, job.as_ref()).await;
                    }
                    _ = stop_rx.recv() => break,
                }
            }
        });

        Self { stop_tx, handle }
    }

    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(()).await;
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    pub struct FixedClock(pub u32, pub u32);

    impl Clock for FixedClock {
        fn local_hour_minute(&self) -> (u32, u32) {
            (self.0, self.1)
        }
    }

    #[derive(Default)]
    pub struct CountingJob {
        pub runs: AtomicU32,
    }

    #[async_trait]
    impl Triggerable for CountingJob {
        async fn trigger(&self) {
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_check_fires_only_on_matching_time() {
        let job = CountingJob::default();

        assert!(!check_and_trigger(&FixedClock(2, 59), (3, 0), &job).await);
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);

        assert!(check_and_trigger(&FixedClock(3, 0), (3, 0), &job).await);
        assert_eq!(job.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_ticks_once_a_minute() {
        let job = Arc::new(CountingJob::default());
        let scheduler = Scheduler::start(
            job.clone(),
            Arc::new(FixedClock(3, 0)),
            (3, 0),
        );

        // Virtual time: ticks land at 60s and 120s.
        tokio::time::sleep(Duration::from_secs(150)).await;
        scheduler.shutdown().await;

        assert_eq!(job.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_reschedules_after_non_matching_check() {
        let job = Arc::new(CountingJob::default());
        let scheduler = Scheduler::start(
            job.clone(),
            Arc::new(FixedClock(12, 30)),
            (3, 0),
        );

        tokio::time::sleep(Duration::from_secs(250)).await;
        scheduler.shutdown().await;

        // Checks kept happening, none matched.
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_ticking() {
        let job = Arc::new(CountingJob::default());
        let scheduler = Scheduler::start(
            job.clone(),
            Arc::new(FixedClock(3, 0)),
            (3, 0),
        );

        tokio::time::sleep(Duration::from_secs(70)).await;
        scheduler.shutdown().await;
        let runs_at_shutdown = job.runs.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), runs_at_shutdown);
    }
}
