//! Wire types for conversion requests and job responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};
use crate::store::models::{Job, JobStatus};
use crate::types::{JobId, TemplateId};

/// The source of a conversion, as a tagged union on `type`.
///
/// Malformed variants (unknown tag, missing fields) are rejected at
/// deserialization, before any state is touched.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConversionInput {
    /// Raw HTML to render
    Html { html: String },
    /// A public URL to fetch and render
    Url { url: String },
    /// A stored template plus variable values
    Template {
        template_id: TemplateId,
        #[serde(default)]
        variables: serde_json::Map<String, serde_json::Value>,
    },
    /// Concatenate earlier results, identified by their download tokens,
    /// in the given order
    Merge { sources: Vec<String> },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConvertRequest {
    #[serde(flatten)]
    pub input: ConversionInput,
    /// Renderer options, passed through opaquely
    #[serde(default = "empty_options")]
    pub options: serde_json::Value,
}

/// Body of `POST /merge`; sugar for a merge-typed conversion.
#[derive(Debug, Clone, Deserialize)]
pub struct MergeRequest {
    pub sources: Vec<String>,
    /// Opaque caller data, carried on the job for the renderer
    pub metadata: Option<serde_json::Value>,
    /// Name for the merged document; validated against
    /// [`validate_filename`]
    pub filename: Option<String>,
    #[serde(default = "empty_options")]
    pub options: serde_json::Value,
}

fn empty_options() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Check a caller-supplied output filename.
///
/// Plain names only: ASCII alphanumerics, space, dot, dash and
/// underscore, no leading dot, nothing that could be read as a path.
pub fn validate_filename(name: &str) -> Result<()> {
    let invalid = || Error::InvalidRequest {
        message: format!("'{name}' is not a valid filename"),
    };

    if name.is_empty() || name.len() > 128 || name.starts_with('.') || name.contains("..") {
        return Err(invalid());
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '.' | '-' | '_'))
    {
        return Err(invalid());
    }
    Ok(())
}

/// A job as callers see it. `pdf_url` and `error` are always present,
/// explicitly `null` until the corresponding terminal state.
#[derive(Debug, Clone, Serialize)]
pub struct JobResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub pdf_url: Option<String>,
    pub error: Option<JobError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobError {
    pub code: String,
    pub message: String,
}

impl From<&Job> for JobResponse {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            pdf_url: job
                .download_token
                .as_ref()
                .map(|token| format!("/files/{token}")),
            error: job.error_code.as_ref().map(|code| JobError {
                code: code.clone(),
                message: job.error_message.clone().unwrap_or_default(),
            }),
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// 202 body: the job was admitted but is not terminal yet.
#[derive(Debug, Clone, Serialize)]
pub struct AcceptedResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Where to poll for the outcome
    pub status_url: String,
}

impl From<&Job> for AcceptedResponse {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            status_url: format!("/jobs/{}", job.id),
        }
    }
}
