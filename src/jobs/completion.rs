//! Terminal job transitions.
//!
//! This is the surface the renderer calls back into when a conversion
//! finishes. Marking the job terminal and delivering webhooks are
//! decoupled: delivery failure never touches the job's status, and a
//! terminal job can never be flipped again.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{info, instrument};

use crate::errors::{Error, Result};
use crate::store::{JobStore, Store};
use crate::store::models::Job;
use crate::types::{JobId, abbrev_uuid};
use crate::webhooks::WebhookDeliveryEngine;
use crate::webhooks::events::{event_for_job, job_payload};

pub struct CompletionService {
    store: Arc<dyn Store>,
    delivery: Arc<WebhookDeliveryEngine>,
    results_dir: PathBuf,
    max_result_bytes: u64,
}

impl CompletionService {
    pub fn new(
        store: Arc<dyn Store>,
        delivery: Arc<WebhookDeliveryEngine>,
        results_dir: PathBuf,
        max_result_bytes: u64,
    ) -> Self {
        Self {
            store,
            delivery,
            results_dir,
            max_result_bytes,
        }
    }

    /// Record a successful conversion: persist the result bytes, mint a
    /// download token, mark the job succeeded, and fan out
    /// `job.completed`.
    ///
    /// An oversized result fails the job instead, so the caller still
    /// gets a terminal outcome.
    #[instrument(skip(self, result), fields(job = %abbrev_uuid(&job_id)))]
    pub async fn complete(&self, job_id: JobId, result: Bytes) -> Result<Job> {
        if result.len() as u64 > self.max_result_bytes {
            let message = format!(
                "result is {} bytes, over the {} byte ceiling",
                result.len(),
                self.max_result_bytes
            );
            self.fail(job_id, "result_too_large".to_string(), message.clone())
                .await?;
            return Err(Error::PayloadTooLarge { message });
        }

        tokio::fs::create_dir_all(&self.results_dir)
            .await
            .map_err(anyhow::Error::from)?;
        let result_path = self.results_dir.join(format!("{job_id}.pdf"));
        tokio::fs::write(&result_path, &result)
            .await
            .map_err(anyhow::Error::from)?;

        let token = crate::crypto::generate_download_token();
        let job = self.store.mark_succeeded(job_id, token, result_path).await?;

        info!(
            job = %abbrev_uuid(&job.id),
            bytes = result.len(),
            "Job succeeded"
        );
        self.notify(&job).await;
        Ok(job)
    }

    /// Record a failed conversion and fan out `job.failed`.
    #[instrument(skip(self, message), fields(job = %abbrev_uuid(&job_id)))]
    pub async fn fail(&self, job_id: JobId, code: String, message: String) -> Result<Job> {
        let job = self.store.mark_failed(job_id, code, message).await?;
        info!(
            job = %abbrev_uuid(&job.id),
            code = job.error_code.as_deref().unwrap_or(""),
            "Job failed"
        );
        self.notify(&job).await;
        Ok(job)
    }

    async fn notify(&self, job: &Job) {
        let Some(event) = event_for_job(job) else {
            return;
        };
        let payload = job_payload(job);
        // Fire and forget; the handles are dropped on purpose.
        let _ = self
            .delivery
            .dispatch(job.user_id, job.team_id, event, &payload)
            .await;
    }
}
