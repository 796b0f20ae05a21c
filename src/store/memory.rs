//! In-memory store implementation.
//!
//! Backs the binary and the test suite. Collections are `DashMap`s;
//! idempotent job creation goes through a mutex-guarded index so the
//! lookup-then-insert is atomic across concurrent requests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::instrument;
use uuid::Uuid;

use super::models::{
    ApiKey, Job, JobAdmission, JobStatus, NewJob, Template, Webhook, WebhookEventType,
    WebhookUpdate,
};
use super::{ApiKeyStore, JobStore, StoreError, StoreResult, TemplateStore, WebhookStore};
use crate::types::{ApiKeyId, JobId, TeamId, TemplateId, UserId, WebhookId};

#[derive(Default)]
pub struct MemoryStore {
    jobs: DashMap<JobId, Job>,
    /// `(user_id, idempotency_key) → job id`. Guards the atomicity of
    /// idempotent creation; entries are never removed.
    idempotency: Mutex<HashMap<(UserId, String), JobId>>,
    download_tokens: DashMap<String, JobId>,
    api_keys: DashMap<ApiKeyId, ApiKey>,
    api_keys_by_hash: DashMap<String, ApiKeyId>,
    webhooks: DashMap<WebhookId, Webhook>,
    templates: DashMap<TemplateId, Template>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert_job(&self, new: NewJob, now: DateTime<Utc>) -> Job {
        let job = Job {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            team_id: new.team_id,
            api_key_id: new.api_key_id,
            input: new.input,
            input_content: new.input_content,
            template_id: new.template_id,
            options: new.options,
            idempotency_key: new.idempotency_key,
            status: JobStatus::Queued,
            download_token: None,
            result_path: None,
            error_code: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        self.jobs.insert(job.id, job.clone());
        job
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    #[instrument(skip(self, new), fields(user_id = %new.user_id))]
    async fn create_job(&self, new: NewJob) -> StoreResult<JobAdmission> {
        let now = Utc::now();

        let Some(key) = new.idempotency_key.clone() else {
            return Ok(JobAdmission::Created(self.insert_job(new, now)));
        };

        let mut index = self
            .idempotency
            .lock()
            .map_err(|_| StoreError::Other(anyhow::anyhow!("idempotency index poisoned")))?;

        if let Some(existing_id) = index.get(&(new.user_id, key.clone())) {
            let job = self
                .jobs
                .get(existing_id)
                .map(|entry| entry.clone())
                .ok_or(StoreError::NotFound)?;
            return Ok(JobAdmission::Existing(job));
        }

        let job = self.insert_job(new, now);
        index.insert((job.user_id, key), job.id);
        Ok(JobAdmission::Created(job))
    }

    async fn find_job(&self, id: JobId) -> StoreResult<Job> {
        self.jobs
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn find_job_by_download_token(&self, token: &str) -> StoreResult<Job> {
        let id = *self.download_tokens.get(token).ok_or(StoreError::NotFound)?;
        self.find_job(id).await
    }

    async fn mark_processing(&self, id: JobId) -> StoreResult<Job> {
        let mut entry = self.jobs.get_mut(&id).ok_or(StoreError::NotFound)?;
        if entry.status.is_terminal() {
            return Err(StoreError::InvalidTransition {
                from: entry.status,
                to: JobStatus::Processing,
            });
        }
        entry.status = JobStatus::Processing;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    #[instrument(skip(self, download_token, result_path))]
    async fn mark_succeeded(
        &self,
        id: JobId,
        download_token: String,
        result_path: PathBuf,
    ) -> StoreResult<Job> {
        let mut entry = self.jobs.get_mut(&id).ok_or(StoreError::NotFound)?;
        if entry.status.is_terminal() {
            return Err(StoreError::InvalidTransition {
                from: entry.status,
                to: JobStatus::Succeeded,
            });
        }
        entry.status = JobStatus::Succeeded;
        entry.download_token = Some(download_token.clone());
        entry.result_path = Some(result_path);
        entry.updated_at = Utc::now();
        let job = entry.clone();
        drop(entry);

        self.download_tokens.insert(download_token, id);
        Ok(job)
    }

    #[instrument(skip(self, message))]
    async fn mark_failed(&self, id: JobId, code: String, message: String) -> StoreResult<Job> {
        let mut entry = self.jobs.get_mut(&id).ok_or(StoreError::NotFound)?;
        if entry.status.is_terminal() {
            return Err(StoreError::InvalidTransition {
                from: entry.status,
                to: JobStatus::Failed,
            });
        }
        entry.status = JobStatus::Failed;
        entry.error_code = Some(code);
        entry.error_message = Some(message);
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    async fn scan_queued(&self, limit: usize) -> StoreResult<Vec<Job>> {
        let mut queued: Vec<Job> = self
            .jobs
            .iter()
            .filter(|entry| entry.status == JobStatus::Queued)
            .map(|entry| entry.clone())
            .collect();
        queued.sort_by_key(|job| job.created_at);
        queued.truncate(limit);
        Ok(queued)
    }
}

#[async_trait]
impl ApiKeyStore for MemoryStore {
    async fn create_api_key(&self, key: ApiKey) -> StoreResult<ApiKey> {
        if self.api_keys_by_hash.contains_key(&key.key_hash) {
            return Err(StoreError::Conflict {
                message: "API key already exists".to_string(),
            });
        }
        self.api_keys_by_hash.insert(key.key_hash.clone(), key.id);
        self.api_keys.insert(key.id, key.clone());
        Ok(key)
    }

    async fn find_api_key_by_hash(&self, key_hash: &str) -> StoreResult<ApiKey> {
        let id = *self.api_keys_by_hash.get(key_hash).ok_or(StoreError::NotFound)?;
        self.api_keys
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn touch_api_key(&self, id: ApiKeyId, at: DateTime<Utc>) -> StoreResult<()> {
        let mut entry = self.api_keys.get_mut(&id).ok_or(StoreError::NotFound)?;
        entry.last_used_at = Some(at);
        Ok(())
    }

    async fn revoke_api_key(&self, id: ApiKeyId, user_id: UserId) -> StoreResult<ApiKey> {
        let mut entry = self.api_keys.get_mut(&id).ok_or(StoreError::NotFound)?;
        if entry.user_id != user_id {
            return Err(StoreError::NotFound);
        }
        if entry.revoked_at.is_none() {
            entry.revoked_at = Some(Utc::now());
        }
        Ok(entry.clone())
    }
}

/// Same scope for management and delivery: the creating user, or
/// anyone on the webhook's team.
fn webhook_owned_by(webhook: &Webhook, user_id: UserId, team_id: Option<TeamId>) -> bool {
    webhook.user_id == user_id || (team_id.is_some() && webhook.team_id == team_id)
}

#[async_trait]
impl WebhookStore for MemoryStore {
    async fn create_webhook(&self, webhook: Webhook) -> StoreResult<Webhook> {
        self.webhooks.insert(webhook.id, webhook.clone());
        Ok(webhook)
    }

    async fn find_webhook(
        &self,
        id: WebhookId,
        user_id: UserId,
        team_id: Option<TeamId>,
    ) -> StoreResult<Webhook> {
        self.webhooks
            .get(&id)
            .filter(|entry| webhook_owned_by(entry, user_id, team_id))
            .map(|entry| entry.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn list_webhooks(
        &self,
        user_id: UserId,
        team_id: Option<TeamId>,
    ) -> StoreResult<Vec<Webhook>> {
        let mut hooks: Vec<Webhook> = self
            .webhooks
            .iter()
            .filter(|entry| webhook_owned_by(entry, user_id, team_id))
            .map(|entry| entry.clone())
            .collect();
        hooks.sort_by_key(|hook| hook.created_at);
        Ok(hooks)
    }

    async fn update_webhook(
        &self,
        id: WebhookId,
        user_id: UserId,
        team_id: Option<TeamId>,
        update: WebhookUpdate,
    ) -> StoreResult<Webhook> {
        let mut entry = self.webhooks.get_mut(&id).ok_or(StoreError::NotFound)?;
        if !webhook_owned_by(&entry, user_id, team_id) {
            return Err(StoreError::NotFound);
        }
        if let Some(url) = update.url {
            entry.url = url;
        }
        if let Some(events) = update.events {
            entry.events = events;
        }
        if let Some(enabled) = update.enabled {
            entry.enabled = enabled;
        }
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    async fn delete_webhook(
        &self,
        id: WebhookId,
        user_id: UserId,
        team_id: Option<TeamId>,
    ) -> StoreResult<()> {
        let owned = self
            .webhooks
            .get(&id)
            .map(|entry| webhook_owned_by(&entry, user_id, team_id))
            .unwrap_or(false);
        if !owned {
            return Err(StoreError::NotFound);
        }
        self.webhooks.remove(&id);
        Ok(())
    }

    async fn list_deliverable_webhooks(
        &self,
        user_id: UserId,
        team_id: Option<TeamId>,
        event: WebhookEventType,
    ) -> StoreResult<Vec<Webhook>> {
        let hooks = self
            .webhooks
            .iter()
            .filter(|entry| {
                webhook_owned_by(entry, user_id, team_id) && entry.subscribes_to(event)
            })
            .map(|entry| entry.clone())
            .collect();
        Ok(hooks)
    }
}

#[async_trait]
impl TemplateStore for MemoryStore {
    async fn create_template(&self, template: Template) -> StoreResult<Template> {
        self.templates.insert(template.id, template.clone());
        Ok(template)
    }

    async fn find_template_owned(
        &self,
        id: TemplateId,
        user_id: UserId,
        team_id: Option<TeamId>,
    ) -> StoreResult<Template> {
        self.templates
            .get(&id)
            .filter(|entry| {
                entry.user_id == user_id || (team_id.is_some() && entry.team_id == team_id)
            })
            .map(|entry| entry.clone())
            .ok_or(StoreError::NotFound)
    }
}
