//! Batch job lifecycle as a background task.
//!
//! Submission, polling and result retrieval run in a spawned tokio task that
//! publishes a [`BatchProgress`] snapshot through a `watch` channel after
//! every step. The task stops early when its `CancellationToken` fires.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::batch::{self, BatchJob, BatchReport, BatchStatus, MANIFEST_FILE_NAME};
use crate::document::UploadedFile;
use crate::error::{OcrError, OcrResult};
use crate::ocr::{FilePurpose, OcrApi};

const JOB_TYPE: &str = "mistral_ocr_web";

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_wait: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPhase {
    Submitting,
    Polling,
    Downloading,
    Completed,
    Failed,
    Cancelled,
}

impl BatchPhase {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Snapshot published to the UI after each step.
#[derive(Debug, Clone, Serialize)]
pub struct BatchProgress {
    pub phase: BatchPhase,
    pub provider_job_id: Option<String>,
    pub status: Option<BatchStatus>,
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub percent_done: f64,
    pub polls: u32,
    pub message: Option<String>,
}

impl BatchProgress {
    fn submitting() -> Self {
        Self {
            phase: BatchPhase::Submitting,
            provider_job_id: None,
            status: None,
            total: 0,
            succeeded: 0,
            failed: 0,
            percent_done: 0.0,
            polls: 0,
            message: Some("Uploading batch file".to_string()),
        }
    }

    fn observe(&mut self, job: &BatchJob) {
        self.provider_job_id = Some(job.id.clone());
        self.status = Some(job.status.clone());
        self.total = job.total_requests;
        self.succeeded = job.succeeded_requests;
        self.failed = job.failed_requests;
        self.percent_done = job.percent_done();
    }
}

/// Finished batch: the rendered report and the provider's raw JSONL output.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub report: BatchReport,
    pub raw_results: Vec<u8>,
}

/// Handle to a running (or finished) batch task.
#[derive(Clone)]
pub struct BatchHandle {
    pub file_names: Vec<String>,
    progress: watch::Receiver<BatchProgress>,
    cancel: CancellationToken,
    outcome: Arc<RwLock<Option<Arc<BatchOutcome>>>>,
}

impl BatchHandle {
    pub fn progress(&self) -> BatchProgress {
        self.progress.borrow().clone()
    }

    pub fn outcome(&self) -> Option<Arc<BatchOutcome>> {
        self.outcome.read().unwrap().clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait until the task has published a finished phase.
    #[cfg(test)]
    pub async fn wait(&self) -> BatchProgress {
        let mut rx = self.progress.clone();
        let finished = match rx.wait_for(|p| p.phase.is_finished()).await {
            Ok(progress) => progress.clone(),
            Err(_) => self.progress(),
        };
        finished
    }
}

/// Spawn the batch lifecycle for `files` and return its handle.
pub fn spawn_batch(
    api: Arc<dyn OcrApi>,
    files: Vec<UploadedFile>,
    settings: PollSettings,
) -> BatchHandle {
    let (tx, rx) = watch::channel(BatchProgress::submitting());
    let cancel = CancellationToken::new();
    let outcome = Arc::new(RwLock::new(None));

    let handle = BatchHandle {
        file_names: files.iter().map(|f| f.file_name.clone()).collect(),
        progress: rx,
        cancel: cancel.clone(),
        outcome: outcome.clone(),
    };

    tokio::spawn(async move {
        let result = run_batch(api.as_ref(), &files, settings, &tx, &cancel).await;
        let mut last = tx.borrow().clone();
        match result {
            Ok(done) => {
                last.phase = BatchPhase::Completed;
                last.message = Some(format!(
                    "Batch job completed: {} of {} files failed",
                    done.report.failed_count(),
                    done.report.entries.len()
                ));
                *outcome.write().unwrap() = Some(Arc::new(done));
            }
            Err(OcrError::Cancelled) => {
                last.phase = BatchPhase::Cancelled;
                last.message = Some(OcrError::Cancelled.to_string());
            }
            Err(e) => {
                error!("Batch job failed: {}", e);
                last.phase = BatchPhase::Failed;
                last.message = Some(e.to_string());
            }
        }
        tx.send_replace(last);
    });

    handle
}

/// Submit, poll until terminal, then fetch and collate results.
pub async fn run_batch(
    api: &dyn OcrApi,
    files: &[UploadedFile],
    settings: PollSettings,
    progress: &watch::Sender<BatchProgress>,
    cancel: &CancellationToken,
) -> OcrResult<BatchOutcome> {
    if files.is_empty() {
        return Err(OcrError::NoFiles);
    }

    let manifest = batch::build_manifest(files)?;
    let input_file_id = api
        .upload_file(MANIFEST_FILE_NAME, "application/jsonl", manifest, FilePurpose::Batch)
        .await?;

    let metadata = HashMap::from([("job_type".to_string(), JOB_TYPE.to_string())]);
    let created = api.create_batch_job(&input_file_id, metadata).await?;
    info!("Created batch job {} for {} files", created.id, files.len());
    progress.send_modify(|p| {
        p.observe(&created);
        p.phase = BatchPhase::Polling;
        p.message = Some(format!("Created batch job with ID: {}", created.id));
    });

    let job = poll_until_terminal(api, &created.id, settings, progress, cancel).await?;
    if !job.status.is_success() {
        return Err(OcrError::BatchFailed {
            job_id: job.id,
            status: job.status,
        });
    }

    progress.send_modify(|p| {
        p.phase = BatchPhase::Downloading;
        p.message = Some("Batch job completed. Downloading the results...".to_string());
    });

    let output_file = job.output_file.as_deref().ok_or_else(|| {
        OcrError::Decode(format!("batch job {} finished without an output file", job.id))
    })?;
    let raw_results = api.download_file(output_file).await?;
    let errors = match job.error_file.as_deref() {
        Some(id) => Some(api.download_file(id).await?),
        None => None,
    };

    let file_names: Vec<String> = files.iter().map(|f| f.file_name.clone()).collect();
    let report = batch::collect_report(&file_names, &raw_results, errors.as_deref());
    Ok(BatchOutcome {
        report,
        raw_results,
    })
}

/// Poll on a fixed interval until the job is terminal, the deadline passes,
/// or the token is cancelled.
pub async fn poll_until_terminal(
    api: &dyn OcrApi,
    job_id: &str,
    settings: PollSettings,
    progress: &watch::Sender<BatchProgress>,
    cancel: &CancellationToken,
) -> OcrResult<BatchJob> {
    let started = Instant::now();

    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => return cancel_remote(api, job_id).await,
            job = api.get_batch_job(job_id) => job?,
        };

        debug!(
            "Batch job {}: status={} total={} succeeded={} failed={}",
            job.id, job.status, job.total_requests, job.succeeded_requests, job.failed_requests
        );
        progress.send_modify(|p| {
            p.observe(&job);
            p.polls += 1;
            p.message = Some(format!(
                "Status: {} | Total: {} | Succeeded: {} | Failed: {} | Percent Done: {}%",
                job.status,
                job.total_requests,
                job.succeeded_requests,
                job.failed_requests,
                job.percent_done()
            ));
        });

        if job.status.is_terminal() {
            info!("Batch job {} finished with status {}", job.id, job.status);
            return Ok(job);
        }

        if started.elapsed() >= settings.max_wait {
            warn!("Batch job {} still {} after {:?}", job.id, job.status, settings.max_wait);
            return Err(OcrError::PollTimeout {
                job_id: job.id,
                waited_secs: started.elapsed().as_secs(),
            });
        }

        tokio::select! {
            _ = cancel.cancelled() => return cancel_remote(api, job_id).await,
            _ = tokio::time::sleep(settings.interval) => {}
        }
    }
}

async fn cancel_remote(api: &dyn OcrApi, job_id: &str) -> OcrResult<BatchJob> {
    info!("Cancellation requested for batch job {}", job_id);
    if let Err(e) = api.cancel_batch_job(job_id).await {
        warn!("Failed to cancel batch job {} remotely: {}", job_id, e);
    }
    Err(OcrError::Cancelled)
}
