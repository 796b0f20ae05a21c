//! The in-process work queue handle.
//!
//! Admission pushes freshly created job ids here to wake a renderer
//! promptly. The queue is a hint, not the source of truth: if the push
//! fails (queue full, renderer detached) the job stays `Queued` in the
//! store and is picked up by [`crate::store::JobStore::scan_queued`].

use tokio::sync::mpsc;
use tracing::warn;

use crate::types::{JobId, abbrev_uuid};

/// Receiving side, consumed by whatever drives the renderer.
pub type JobFeed = mpsc::Receiver<JobId>;

#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<JobId>,
}

impl JobQueue {
    pub fn new(capacity: usize) -> (Self, JobFeed) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Best-effort, non-blocking push. Returns whether the job was
    /// enqueued; failure is logged and the caller proceeds regardless.
    pub fn enqueue(&self, id: JobId) -> bool {
        match self.tx.try_send(id) {
            Ok(()) => true,
            Err(e) => {
                warn!(job = %abbrev_uuid(&id), "Failed to enqueue job, leaving it for the queue scan: {e}");
                false
            }
        }
    }
}
