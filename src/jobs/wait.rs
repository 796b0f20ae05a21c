//! Synchronous wait wrapper.
//!
//! Gives the caller a request/response illusion over the async job
//! lifecycle: poll the store until the job is terminal or a fixed
//! deadline passes. The deadline is never extended, so a handler using
//! this responds within a bounded time no matter what the renderer
//! does.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::errors::Result;
use crate::store::JobStore;
use crate::store::models::Job;
use crate::types::JobId;

/// Poll until the job reaches a terminal status or the deadline passes.
/// Returns `None` on timeout; the job is untouched either way.
pub async fn wait_for_terminal<S>(
    store: &Arc<S>,
    id: JobId,
    deadline: Duration,
    poll_interval: Duration,
) -> Result<Option<Job>>
where
    S: JobStore + ?Sized,
{
    let deadline_at = Instant::now() + deadline;

    loop {
        let job = store.find_job(id).await?;
        if job.status.is_terminal() {
            return Ok(Some(job));
        }

        let remaining = deadline_at.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(None);
        }
        tokio::time::sleep(poll_interval.min(remaining)).await;
    }
}
