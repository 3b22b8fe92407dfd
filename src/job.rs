use std::time::Duration;

use tokio::time::Instant;

use crate::client::FluxApi;
use crate::error::JobError;
use crate::request::GenerationRequest;
use crate::types::{stage, Job, JobStatus, PollStatus, StatusUpdate};

/// Floor for the poll interval. A zero interval would poll back to back.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Poll cadence and hard ceiling for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(60),
        }
    }
}

impl PollPolicy {
    /// Interval actually slept between polls, never below [`MIN_POLL_INTERVAL`].
    pub fn effective_interval(&self) -> Duration {
        self.interval.max(MIN_POLL_INTERVAL)
    }
}

/// Submit `request` and poll until the job is Ready, fails, or times out.
///
/// The first poll happens right after submission, then every
/// `policy.interval`. A poll that fails in transport is logged and retried on
/// the next tick; only the timeout ends the loop early. Once the deadline
/// passes the job is abandoned with [`JobError::Timeout`]. The last sleep is
/// clamped to the deadline so one final poll runs exactly at it. A timeout too
/// large to represent as an instant means no deadline.
///
/// `on_status` hears the submission stages, then each change of the polled
/// status. `Ready` is not `done`: the image still has to be fetched.
pub async fn submit_and_await<A, F>(
    api: &A,
    request: &GenerationRequest,
    policy: PollPolicy,
    mut on_status: F,
) -> Result<Job, JobError>
where
    A: FluxApi,
    F: FnMut(StatusUpdate),
{
    on_status(StatusUpdate::new(
        None,
        stage::SUBMITTING,
        "Sending a request to Flux...",
        false,
    ));
    let job_id = api
        .submit(request)
        .await
        .map_err(JobError::SubmissionFailed)?;
    tracing::info!(%job_id, model = %request.model, "FLUX job submitted");
    on_status(StatusUpdate::new(
        Some(&job_id),
        stage::SUBMITTED,
        "Waiting for generation to start...",
        false,
    ));

    let mut job = Job::new(job_id);
    let deadline = Instant::now().checked_add(policy.timeout);
    if deadline.is_none() {
        tracing::debug!(job_id = %job.id, timeout = ?policy.timeout, "timeout overflows the clock, polling without deadline");
    }
    let interval = policy.effective_interval();
    let mut last_label: Option<String> = None;

    loop {
        match api.get_result(&job.id).await {
            Ok(poll) => {
                tracing::debug!(job_id = %job.id, status = poll.label(), "polled job");
                if last_label.as_deref() != Some(poll.label()) {
                    on_status(StatusUpdate::new(
                        Some(&job.id),
                        poll.label(),
                        poll.describe(),
                        poll.is_terminal() && !matches!(poll, PollStatus::Ready { .. }),
                    ));
                    last_label = Some(poll.label().to_string());
                }

                job.apply(&poll);
                match job.status {
                    JobStatus::Ready => {
                        tracing::info!(job_id = %job.id, "FLUX job ready");
                        return Ok(job);
                    }
                    JobStatus::Error => {
                        let detail = job
                            .error_detail
                            .clone()
                            .unwrap_or_else(|| poll.label().to_string());
                        return Err(JobError::RemoteError { detail });
                    }
                    JobStatus::Pending => {}
                }
            }
            Err(e) => {
                tracing::warn!(job_id = %job.id, error = %e, "status poll failed, retrying");
            }
        }

        let wait = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    tracing::warn!(job_id = %job.id, timeout = ?policy.timeout, "FLUX job timed out");
                    return Err(JobError::Timeout {
                        timeout: policy.timeout,
                    });
                }
                interval.min(remaining)
            }
            None => interval,
        };
        tokio::time::sleep(wait).await;
    }
}
