//! Event payload construction.

use chrono::Utc;
use serde_json::{Value, json};

use crate::store::models::{Job, JobStatus, WebhookEventType};

/// Pick the event a terminal job emits. Non-terminal jobs emit nothing.
pub fn event_for_job(job: &Job) -> Option<WebhookEventType> {
    match job.status {
        JobStatus::Succeeded => Some(WebhookEventType::JobCompleted),
        JobStatus::Failed => Some(WebhookEventType::JobFailed),
        JobStatus::Queued | JobStatus::Processing => None,
    }
}

/// Event-specific fields describing a terminal job.
pub fn job_payload(job: &Job) -> Value {
    match job.status {
        JobStatus::Succeeded => json!({
            "job_id": job.id,
            "status": job.status,
            "download_token": job.download_token,
        }),
        _ => json!({
            "job_id": job.id,
            "status": job.status,
            "error_code": job.error_code,
            "error_message": job.error_message,
        }),
    }
}

/// The canonical delivery body: the payload fields plus `event` and
/// `timestamp`. This exact byte serialization is what gets signed, so
/// it is built once per dispatch and reused across retries.
pub fn build_event_body(event: WebhookEventType, payload: &Value) -> Value {
    let mut body = payload.clone();
    if let Value::Object(map) = &mut body {
        map.insert("event".to_string(), json!(event.as_str()));
        map.insert("timestamp".to_string(), json!(Utc::now().to_rfc3339()));
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn terminal_job(status: JobStatus) -> Job {
        let now = Utc::now();
        Job {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            team_id: None,
            api_key_id: None,
            input: crate::store::models::InputKind::Html,
            input_content: None,
            template_id: None,
            options: json!({}),
            idempotency_key: None,
            status,
            download_token: (status == JobStatus::Succeeded).then(|| "tok".to_string()),
            result_path: None,
            error_code: (status == JobStatus::Failed).then(|| "render_error".to_string()),
            error_message: (status == JobStatus::Failed).then(|| "boom".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_event_selection() {
        assert_eq!(
            event_for_job(&terminal_job(JobStatus::Succeeded)),
            Some(WebhookEventType::JobCompleted)
        );
        assert_eq!(
            event_for_job(&terminal_job(JobStatus::Failed)),
            Some(WebhookEventType::JobFailed)
        );
        assert_eq!(event_for_job(&terminal_job(JobStatus::Queued)), None);
    }

    #[test]
    fn test_body_carries_event_and_timestamp() {
        let job = terminal_job(JobStatus::Succeeded);
        let body = build_event_body(WebhookEventType::JobCompleted, &job_payload(&job));

        assert_eq!(body["event"], "job.completed");
        assert_eq!(body["download_token"], "tok");
        assert!(body["timestamp"].is_string());
    }

    #[test]
    fn test_failed_body_carries_error_fields() {
        let job = terminal_job(JobStatus::Failed);
        let body = build_event_body(WebhookEventType::JobFailed, &job_payload(&job));

        assert_eq!(body["event"], "job.failed");
        assert_eq!(body["error_code"], "render_error");
        assert_eq!(body["error_message"], "boom");
        assert!(body.get("download_token").is_none());
    }
}
