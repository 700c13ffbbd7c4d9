//! Cooperative lease/dispatch/ack loop (C6). One lease held at a time; the
//! loop itself never panics on handler failure, it only classifies it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tracing::{error, info, warn};

use crate::error::StoreError;
use crate::store::{JobEnqueueInput, JobQueue};
use crate::worker::handlers::WorkerHandlers;

/// `post_room1_final_failure` itself must never be retried into another
/// failure job — that would loop forever if the chat post keeps failing.
const FAILURE_FOLLOWUP_JOB_TYPE: &str = "post_room1_final_failure";

pub fn backoff_duration(attempts: i32) -> Duration {
    let exponent = attempts.clamp(0, 32) as u32;
    let secs = 2u64.saturating_pow(exponent).min(300);
    Duration::from_secs(secs)
}

pub struct WorkerLoop {
    jobs: Arc<dyn JobQueue>,
    handlers: Arc<WorkerHandlers>,
    poll_interval: Duration,
    max_attempts: i32,
}

impl WorkerLoop {
    pub fn new(
        jobs: Arc<dyn JobQueue>,
        handlers: Arc<WorkerHandlers>,
        poll_interval: Duration,
        max_attempts: i32,
    ) -> Self {
        Self { jobs, handlers, poll_interval, max_attempts }
    }

    /// Lease and run at most one job. Returns whether a job was available.
    pub async fn run_once(&self) -> Result<bool, StoreError> {
        let Some(job) = self.jobs.lease_next().await? else {
            return Ok(false);
        };

        info!(job_id = %job.id, job_type = %job.job_type, attempts = job.attempts, "worker_job_leased");

        match self.handlers.dispatch(&job).await {
            Ok(()) => {
                self.jobs.ack_done(job.id).await?;
                info!(job_id = %job.id, job_type = %job.job_type, "worker_job_done");
            }
            Err(err) => {
                let last_error = format!("{}:{}", err.cause.as_str(), err.details);
                let next_attempts = job.attempts + 1;
                if err.cause.is_retriable() && next_attempts < self.max_attempts {
                    let run_after = Utc::now() + backoff_duration(next_attempts);
                    warn!(job_id = %job.id, job_type = %job.job_type, attempts = next_attempts, cause = err.cause.as_str(), "worker_job_retry_scheduled");
                    self.jobs.ack_retry(job.id, run_after, &last_error).await?;
                } else {
                    error!(job_id = %job.id, job_type = %job.job_type, cause = err.cause.as_str(), "worker_job_failed_terminal");
                    self.jobs.ack_failed(job.id, &last_error).await?;
                    if job.job_type != FAILURE_FOLLOWUP_JOB_TYPE {
                        self.jobs
                            .enqueue(JobEnqueueInput {
                                case_id: job.case_id,
                                job_type: FAILURE_FOLLOWUP_JOB_TYPE.to_string(),
                                payload: json!({"cause": err.cause.as_str(), "details": err.details}),
                                run_after: None,
                            })
                            .await?;
                    }
                }
            }
        }
        Ok(true)
    }

    /// Run until `shutdown` reports true, sleeping `poll_interval` between
    /// empty leases. The in-flight job is always finished before exiting —
    /// bootstrap reconciliation on the next start recovers an aborted one.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }
            match self.run_once().await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(err) => error!(error = %err, "worker_lease_failed"),
            }
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        }
    }
}
