//! Request validation and idempotent job creation.
//!
//! All validation happens before any write: by the time a job row
//! exists, its input has passed the egress guard, template ownership
//! checks, and merge source resolution. The enqueue push afterwards is
//! best-effort.

use serde_json::json;
use tracing::{debug, instrument};

use crate::AppState;
use crate::api::models::jobs::{ConversionInput, ConvertRequest};
use crate::auth::Caller;
use crate::errors::{Error, Result};
use crate::ssrf::assert_safe_url;
use crate::store::{JobStore, StoreError, TemplateStore};
use crate::store::models::{InputKind, JobAdmission, JobStatus, NewJob};
use crate::types::abbrev_uuid;

/// Validate and admit a conversion request.
///
/// Replays of an earlier `(caller, idempotency key)` pair return the
/// original job without re-validating or re-enqueueing.
#[instrument(skip_all, fields(user = %abbrev_uuid(&caller.user_id)))]
pub async fn admit(
    state: &AppState,
    caller: &Caller,
    request: ConvertRequest,
    idempotency_key: Option<String>,
) -> Result<JobAdmission> {
    let idempotency_key = idempotency_key.filter(|key| !key.is_empty());

    let (input, input_content, template_id, options) =
        validate_input(state, caller, request.input, request.options).await?;

    let admission = state
        .store
        .create_job(NewJob {
            user_id: caller.user_id,
            team_id: caller.team_id,
            api_key_id: Some(caller.api_key_id),
            input,
            input_content,
            template_id,
            options,
            idempotency_key,
        })
        .await?;

    match &admission {
        JobAdmission::Created(job) => {
            debug!(job = %abbrev_uuid(&job.id), kind = ?job.input, "Job admitted");
            state.queue.enqueue(job.id);
        }
        JobAdmission::Existing(job) => {
            debug!(job = %abbrev_uuid(&job.id), "Idempotency key replay, returning original job");
        }
    }

    Ok(admission)
}

async fn validate_input(
    state: &AppState,
    caller: &Caller,
    input: ConversionInput,
    mut options: serde_json::Value,
) -> Result<(
    InputKind,
    Option<String>,
    Option<crate::types::TemplateId>,
    serde_json::Value,
)> {
    match input {
        ConversionInput::Html { html } => {
            if html.trim().is_empty() {
                return Err(Error::InvalidRequest {
                    message: "html must not be empty".to_string(),
                });
            }
            Ok((InputKind::Html, Some(html), None, options))
        }

        ConversionInput::Url { url } => {
            assert_safe_url(&url).await?;
            Ok((InputKind::Url, Some(url), None, options))
        }

        ConversionInput::Template {
            template_id,
            variables,
        } => {
            let template = match state
                .store
                .find_template_owned(template_id, caller.user_id, caller.team_id)
                .await
            {
                Ok(template) => template,
                Err(StoreError::NotFound) => {
                    return Err(Error::NotFound {
                        resource: "Template".to_string(),
                        id: template_id.to_string(),
                    });
                }
                Err(e) => return Err(e.into()),
            };

            let html = render_template(&template.html, &template.variables, &variables);
            Ok((InputKind::Template, Some(html), Some(template_id), options))
        }

        ConversionInput::Merge { sources } => {
            let bounds = &state.config.merge;
            if sources.len() < bounds.min_sources || sources.len() > bounds.max_sources {
                return Err(Error::InvalidRequest {
                    message: format!(
                        "merge requires between {} and {} sources, got {}",
                        bounds.min_sources,
                        bounds.max_sources,
                        sources.len()
                    ),
                });
            }

            let paths = resolve_merge_sources(state, caller, &sources).await?;
            if let serde_json::Value::Object(map) = &mut options {
                map.insert("merge_sources".to_string(), json!(paths));
            }
            Ok((InputKind::Merge, None, None, options))
        }
    }
}

/// Resolve every merge source token to an owned, succeeded job's result
/// path, preserving order. Any unresolvable source fails the whole
/// operation with a not-found before a job row is written; someone
/// else's token looks identical to one that never existed.
async fn resolve_merge_sources(
    state: &AppState,
    caller: &Caller,
    sources: &[String],
) -> Result<Vec<String>> {
    let mut paths = Vec::with_capacity(sources.len());
    let mut total_bytes: u64 = 0;

    for token in sources {
        let unresolvable = || Error::NotFound {
            resource: "Merge source".to_string(),
            id: token.clone(),
        };

        let job = match state.store.find_job_by_download_token(token).await {
            Ok(job) => job,
            Err(StoreError::NotFound) => return Err(unresolvable()),
            Err(e) => return Err(e.into()),
        };

        let owned = job.user_id == caller.user_id
            || (caller.team_id.is_some() && job.team_id == caller.team_id);
        if !owned || job.status != JobStatus::Succeeded {
            return Err(unresolvable());
        }
        let Some(path) = job.result_path.as_ref() else {
            return Err(unresolvable());
        };

        // Best-effort size accounting; a missing file surfaces later at
        // render time.
        if let Ok(meta) = tokio::fs::metadata(path).await {
            total_bytes += meta.len();
        }
        paths.push(path.to_string_lossy().into_owned());
    }

    if total_bytes > state.config.merge.max_total_bytes {
        return Err(Error::PayloadTooLarge {
            message: format!(
                "combined merge sources exceed the {} byte ceiling",
                state.config.merge.max_total_bytes
            ),
        });
    }

    Ok(paths)
}

/// Substitute `{{name}}` placeholders: template defaults first, request
/// variables on top.
fn render_template(
    html: &str,
    defaults: &serde_json::Value,
    variables: &serde_json::Map<String, serde_json::Value>,
) -> String {
    let mut merged = match defaults {
        serde_json::Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    for (key, value) in variables {
        merged.insert(key.clone(), value.clone());
    }

    let mut rendered = html.to_string();
    for (key, value) in &merged {
        let replacement = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        rendered = rendered.replace(&format!("{{{{{key}}}}}"), &replacement);
    }
    rendered
}
