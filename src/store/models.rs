//! Records held by the store.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ApiKeyId, JobId, TeamId, TemplateId, UserId, WebhookId};

/// Lifecycle of a conversion job.
///
/// `Queued → Processing → Succeeded | Failed`; the two terminal states
/// never change once reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What kind of source the job converts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Html,
    Url,
    Template,
    Merge,
}

/// A conversion job row.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub user_id: UserId,
    pub team_id: Option<TeamId>,
    pub api_key_id: Option<ApiKeyId>,
    pub input: InputKind,
    /// Raw HTML for `html` inputs, the validated URL for `url` inputs,
    /// rendered HTML for `template` inputs. Empty for `merge`.
    pub input_content: Option<String>,
    pub template_id: Option<TemplateId>,
    /// Renderer options plus, for merge jobs, the ordered source paths.
    pub options: serde_json::Value,
    pub idempotency_key: Option<String>,
    pub status: JobStatus,
    pub download_token: Option<String>,
    pub result_path: Option<PathBuf>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a caller supplies when admitting a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub user_id: UserId,
    pub team_id: Option<TeamId>,
    pub api_key_id: Option<ApiKeyId>,
    pub input: InputKind,
    pub input_content: Option<String>,
    pub template_id: Option<TemplateId>,
    pub options: serde_json::Value,
    pub idempotency_key: Option<String>,
}

/// Outcome of an idempotent job create.
#[derive(Debug, Clone)]
pub enum JobAdmission {
    /// A new row was written.
    Created(Job),
    /// The caller's idempotency key matched an earlier job; that job is
    /// returned untouched.
    Existing(Job),
}

impl JobAdmission {
    pub fn job(&self) -> &Job {
        match self {
            JobAdmission::Created(job) | JobAdmission::Existing(job) => job,
        }
    }

    pub fn into_job(self) -> Job {
        match self {
            JobAdmission::Created(job) | JobAdmission::Existing(job) => job,
        }
    }

    pub fn is_replay(&self) -> bool {
        matches!(self, JobAdmission::Existing(_))
    }
}

/// An API key row. The plaintext secret is never stored; lookups go
/// through `key_hash`.
#[derive(Debug, Clone)]
pub struct ApiKey {
    pub id: ApiKeyId,
    pub user_id: UserId,
    pub team_id: Option<TeamId>,
    pub key_hash: String,
    pub key_prefix: String,
    pub revoked_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

/// Events a webhook can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebhookEventType {
    #[serde(rename = "job.completed")]
    JobCompleted,
    #[serde(rename = "job.failed")]
    JobFailed,
}

impl WebhookEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEventType::JobCompleted => "job.completed",
            WebhookEventType::JobFailed => "job.failed",
        }
    }
}

impl std::fmt::Display for WebhookEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A webhook endpoint registration. The signing secret is returned to
/// the caller exactly once, at creation.
#[derive(Debug, Clone)]
pub struct Webhook {
    pub id: WebhookId,
    pub user_id: UserId,
    pub team_id: Option<TeamId>,
    pub url: String,
    pub secret: String,
    pub events: Vec<WebhookEventType>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Webhook {
    /// Whether this webhook should receive the given event.
    pub fn subscribes_to(&self, event: WebhookEventType) -> bool {
        self.enabled && self.events.contains(&event)
    }
}

/// Mutable webhook fields, applied on update. `None` leaves the field
/// unchanged.
#[derive(Debug, Clone, Default)]
pub struct WebhookUpdate {
    pub url: Option<String>,
    pub events: Option<Vec<WebhookEventType>>,
    pub enabled: Option<bool>,
}

/// A stored HTML template with default variables.
#[derive(Debug, Clone)]
pub struct Template {
    pub id: TemplateId,
    pub user_id: UserId,
    pub team_id: Option<TeamId>,
    pub name: String,
    pub html: String,
    /// Default variable values, merged under request-supplied variables.
    pub variables: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
