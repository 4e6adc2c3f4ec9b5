// quarksave Transfer Orchestrator
// Submits save jobs (server-side copy from a share into the caller's drive)
// and polls them until they reach a terminal state

use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::providers::quark::{first_string, loose_i64};
use crate::providers::{
    endpoints, ApiRequest, FileRecord, ProviderError, QuarkClient, ShareSession, TransferJob,
    TransferStatus, ROOT_DIR_ID,
};

/// How a wait on a transfer ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransferOutcome {
    Completed,
    /// The server reported the job failed
    Failed { message: Option<String> },
    /// The server reported the job cancelled
    Cancelled { message: Option<String> },
    /// Still not terminal when the timeout expired
    TimedOut,
    /// The caller's cancellation token fired
    Aborted,
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TransferOutcome::Completed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferReport {
    pub job_id: String,
    /// Status of the last successful poll, `None` if the wait ended before one
    pub final_status: Option<TransferStatus>,
    pub outcome: TransferOutcome,
    pub polls: u32,
}

pub struct TransferOrchestrator<'a> {
    client: &'a QuarkClient,
    poll_interval: Duration,
}

impl<'a> TransferOrchestrator<'a> {
    pub fn new(client: &'a QuarkClient) -> Self {
        Self {
            client,
            poll_interval: client.config().poll_interval(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Submit a save job. `file_ids` and `access_tokens` are position-aligned;
    /// a missing token is an empty string.
    pub async fn submit(
        &self,
        share: &ShareSession,
        file_ids: &[String],
        access_tokens: &[String],
        destination_dir_id: &str,
    ) -> Result<String, ProviderError> {
        if file_ids.is_empty() {
            return Err(ProviderError::InvalidConfig("Nothing selected to save".to_string()));
        }
        if file_ids.len() != access_tokens.len() {
            return Err(ProviderError::InvalidConfig(format!(
                "{} file ids but {} access tokens",
                file_ids.len(),
                access_tokens.len()
            )));
        }

        let body = json!({
            "pwd_id": share.share_id,
            "stoken": share.stoken.expose_secret(),
            "fid_list": file_ids,
            "share_fid_token_list": access_tokens,
            "to_pdir_fid": destination_dir_id,
            "pdir_fid": ROOT_DIR_ID,
            "scene": "link",
        });
        let resp = self.client.call(ApiRequest::post(endpoints::SHARE_SAVE, body)).await?;

        let job_id = first_string(&resp.data, &["task_id"]).ok_or_else(|| {
            ProviderError::ParseError("Save accepted but no task_id was returned".to_string())
        })?;
        info!(
            "Submitted save of {} files into {} as job {}",
            file_ids.len(),
            destination_dir_id,
            job_id
        );
        Ok(job_id)
    }

    /// Submit the given records, taking ids and tokens from each
    pub async fn submit_records(
        &self,
        share: &ShareSession,
        records: &[&FileRecord],
        destination_dir_id: &str,
    ) -> Result<String, ProviderError> {
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        let tokens: Vec<String> = records.iter().map(|r| r.access_token.clone()).collect();
        self.submit(share, &ids, &tokens, destination_dir_id).await
    }

    /// One status check
    pub async fn poll(&self, job_id: &str) -> Result<TransferJob, ProviderError> {
        self.poll_attempt(job_id, 0).await
    }

    async fn poll_attempt(&self, job_id: &str, retry_index: u32) -> Result<TransferJob, ProviderError> {
        let request = ApiRequest::get(endpoints::TASK)
            .query("task_id", job_id)
            .query("retry_index", retry_index);
        let resp = self.client.call_lenient(request).await?;
        let data = resp.payload();

        let raw_status = data
            .get("status")
            .or_else(|| data.get("task_status"))
            .cloned()
            .unwrap_or(Value::Null);
        let status = TransferStatus::from_raw(&raw_status);
        if status == TransferStatus::Unknown {
            warn!("Job {} reported unrecognised status {}", job_id, raw_status);
        }

        let progress = data
            .get("progress")
            .or_else(|| data.get("percent"))
            .and_then(loose_i64)
            .unwrap_or(0)
            .clamp(0, 100) as u8;

        let job = TransferJob {
            job_id: job_id.to_string(),
            status,
            progress_percent: progress,
            message: first_string(data, &["message", "msg"]),
            raw_status,
        };
        debug!("Job {}: {} {}%", job_id, job.status, job.progress_percent);
        Ok(job)
    }

    /// Poll until the job is terminal, `timeout` elapses, or `cancel` fires.
    /// `on_progress` sees every snapshot. The job is polled at least once
    /// unless the token is already cancelled.
    pub async fn await_completion<F>(
        &self,
        job_id: &str,
        timeout: Duration,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<TransferReport, ProviderError>
    where
        F: FnMut(&TransferJob),
    {
        let deadline = Instant::now() + timeout;
        let mut polls = 0u32;
        let mut final_status = None;

        let outcome = loop {
            if cancel.is_cancelled() {
                break TransferOutcome::Aborted;
            }

            let job = self.poll_attempt(job_id, polls).await?;
            polls += 1;
            final_status = Some(job.status);
            on_progress(&job);

            if job.status.is_terminal() {
                break match job.status {
                    TransferStatus::Completed => TransferOutcome::Completed,
                    TransferStatus::Cancelled => TransferOutcome::Cancelled { message: job.message },
                    _ => TransferOutcome::Failed { message: job.message },
                };
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break TransferOutcome::TimedOut;
            }

            // never sleep past the deadline
            tokio::select! {
                _ = cancel.cancelled() => break TransferOutcome::Aborted,
                _ = tokio::time::sleep(self.poll_interval.min(remaining)) => {}
            }
        };

        info!("Job {} finished after {} polls: {:?}", job_id, polls, outcome);
        Ok(TransferReport {
            job_id: job_id.to_string(),
            final_status,
            outcome,
            polls,
        })
    }
}
