//! Persistence seams.
//!
//! The relational store backing the service is consumed through these
//! traits; the binary and the test suite run against the in-memory
//! implementation in [`memory`].

pub mod memory;
pub mod models;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{ApiKeyId, JobId, TeamId, TemplateId, UserId, WebhookId};
use models::{
    ApiKey, Job, JobAdmission, NewJob, Template, Webhook, WebhookEventType, WebhookUpdate,
};

/// Errors surfaced by store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Resource not found")]
    NotFound,

    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// A write attempted an illegal job status transition, e.g. marking
    /// a terminal job succeeded again.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: models::JobStatus,
        to: models::JobStatus,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Job rows: admission, status reads, and terminal transitions.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create a job, collapsing idempotency-key replays onto the
    /// original row. The check-and-insert is atomic: two concurrent
    /// creates with the same `(user_id, idempotency_key)` yield one
    /// `Created` and one `Existing`, never two rows.
    async fn create_job(&self, new: NewJob) -> StoreResult<JobAdmission>;

    async fn find_job(&self, id: JobId) -> StoreResult<Job>;

    async fn find_job_by_download_token(&self, token: &str) -> StoreResult<Job>;

    /// Move a queued job to `Processing`. Fails with
    /// [`StoreError::InvalidTransition`] if the job is terminal.
    async fn mark_processing(&self, id: JobId) -> StoreResult<Job>;

    /// Terminal success: records the download token and result path.
    /// Fails if the job is already terminal.
    async fn mark_succeeded(
        &self,
        id: JobId,
        download_token: String,
        result_path: std::path::PathBuf,
    ) -> StoreResult<Job>;

    /// Terminal failure: records the error code and message. Fails if
    /// the job is already terminal.
    async fn mark_failed(&self, id: JobId, code: String, message: String) -> StoreResult<Job>;

    /// Oldest queued jobs, for workers recovering after a missed
    /// enqueue notification.
    async fn scan_queued(&self, limit: usize) -> StoreResult<Vec<Job>>;
}

/// API key rows.
#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    async fn create_api_key(&self, key: ApiKey) -> StoreResult<ApiKey>;

    async fn find_api_key_by_hash(&self, key_hash: &str) -> StoreResult<ApiKey>;

    /// Best-effort usage timestamp; callers ignore failures.
    async fn touch_api_key(&self, id: ApiKeyId, at: DateTime<Utc>) -> StoreResult<()>;

    async fn revoke_api_key(&self, id: ApiKeyId, user_id: UserId) -> StoreResult<ApiKey>;
}

/// Webhook registrations.
///
/// Management and delivery use the same ownership scope: a webhook is
/// reachable by the user who created it and, when it carries a team,
/// by anyone on that team.
#[async_trait]
pub trait WebhookStore: Send + Sync {
    async fn create_webhook(&self, webhook: Webhook) -> StoreResult<Webhook>;

    async fn find_webhook(
        &self,
        id: WebhookId,
        user_id: UserId,
        team_id: Option<TeamId>,
    ) -> StoreResult<Webhook>;

    async fn list_webhooks(
        &self,
        user_id: UserId,
        team_id: Option<TeamId>,
    ) -> StoreResult<Vec<Webhook>>;

    async fn update_webhook(
        &self,
        id: WebhookId,
        user_id: UserId,
        team_id: Option<TeamId>,
        update: WebhookUpdate,
    ) -> StoreResult<Webhook>;

    async fn delete_webhook(
        &self,
        id: WebhookId,
        user_id: UserId,
        team_id: Option<TeamId>,
    ) -> StoreResult<()>;

    /// Enabled webhooks owned by the user (or their team) that
    /// subscribe to the event.
    async fn list_deliverable_webhooks(
        &self,
        user_id: UserId,
        team_id: Option<TeamId>,
        event: WebhookEventType,
    ) -> StoreResult<Vec<Webhook>>;
}

/// Stored templates.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn create_template(&self, template: Template) -> StoreResult<Template>;

    /// Fetch a template the caller is allowed to use: owned by the
    /// user, or by the caller's team.
    async fn find_template_owned(
        &self,
        id: TemplateId,
        user_id: UserId,
        team_id: Option<TeamId>,
    ) -> StoreResult<Template>;
}

/// The full store surface the service needs, as one object-safe bound.
pub trait Store: JobStore + ApiKeyStore + WebhookStore + TemplateStore {}

impl<T: JobStore + ApiKeyStore + WebhookStore + TemplateStore> Store for T {}
