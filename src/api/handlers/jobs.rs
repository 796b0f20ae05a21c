//! Conversion and job status handlers.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use crate::AppState;
use crate::api::models::jobs::{
    AcceptedResponse, ConversionInput, ConvertRequest, JobResponse, MergeRequest,
    validate_filename,
};
use crate::auth::Caller;
use crate::errors::{Error, Result};
use crate::jobs::admission::admit;
use crate::jobs::wait_for_terminal;
use crate::store::{JobStore, StoreError};
use crate::store::models::{Job, JobStatus};
use crate::types::JobId;

const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(IDEMPOTENCY_KEY_HEADER)?
        .to_str()
        .ok()
        .map(|key| key.to_string())
}

/// `POST /convert` — admit a job and wait a bounded time for its
/// outcome. Success is a 200, a failed conversion is a 422, and a job
/// still running at the deadline degrades to a 202 with a poll URL.
pub async fn convert(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    headers: HeaderMap,
    Json(request): Json<ConvertRequest>,
) -> Result<Response> {
    let admission = admit(&state, &caller, request, idempotency_key(&headers)).await?;
    let job = admission.into_job();

    let outcome = wait_for_terminal(
        &state.store,
        job.id,
        state.config.wait.deadline(),
        state.config.wait.poll_interval(),
    )
    .await?;

    match outcome {
        Some(job) => terminal_response(job),
        None => Ok((StatusCode::ACCEPTED, Json(AcceptedResponse::from(&job))).into_response()),
    }
}

/// `POST /convert-async` — admit a job and return immediately with a
/// handle to poll.
pub async fn convert_async(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    headers: HeaderMap,
    Json(request): Json<ConvertRequest>,
) -> Result<Response> {
    let admission = admit(&state, &caller, request, idempotency_key(&headers)).await?;
    let job = admission.into_job();
    Ok((StatusCode::ACCEPTED, Json(AcceptedResponse::from(&job))).into_response())
}

/// `POST /merge` — admit a merge of earlier results as a job of its
/// own; it follows the same lifecycle as any conversion. The optional
/// output filename and caller metadata ride along on the job's options
/// for the renderer.
pub async fn merge(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    headers: HeaderMap,
    Json(request): Json<MergeRequest>,
) -> Result<Response> {
    if let Some(filename) = &request.filename {
        validate_filename(filename)?;
    }
    let mut options = request.options;
    if let serde_json::Value::Object(map) = &mut options {
        if let Some(filename) = request.filename {
            map.insert("filename".to_string(), serde_json::Value::String(filename));
        }
        if let Some(metadata) = request.metadata {
            map.insert("metadata".to_string(), metadata);
        }
    }

    let request = ConvertRequest {
        input: ConversionInput::Merge {
            sources: request.sources,
        },
        options,
    };
    let admission = admit(&state, &caller, request, idempotency_key(&headers)).await?;
    let job = admission.into_job();
    Ok((StatusCode::ACCEPTED, Json(AcceptedResponse::from(&job))).into_response())
}

/// `GET /jobs/{id}` — current job state. Jobs belonging to someone else
/// are indistinguishable from jobs that never existed.
pub async fn get_job(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<JobId>,
) -> Result<Json<JobResponse>> {
    let not_found = || Error::NotFound {
        resource: "Job".to_string(),
        id: id.to_string(),
    };

    let job = match state.store.find_job(id).await {
        Ok(job) => job,
        Err(StoreError::NotFound) => return Err(not_found()),
        Err(e) => return Err(e.into()),
    };

    let owned = job.user_id == caller.user_id
        || (caller.team_id.is_some() && job.team_id == caller.team_id);
    if !owned {
        return Err(not_found());
    }

    Ok(Json(JobResponse::from(&job)))
}

fn terminal_response(job: Job) -> Result<Response> {
    match job.status {
        JobStatus::Succeeded => {
            Ok((StatusCode::OK, Json(JobResponse::from(&job))).into_response())
        }
        JobStatus::Failed => Err(Error::JobFailed {
            code: job
                .error_code
                .unwrap_or_else(|| "conversion_failed".to_string()),
            message: job
                .error_message
                .unwrap_or_else(|| "The conversion failed".to_string()),
        }),
        // wait_for_terminal only hands back terminal jobs
        JobStatus::Queued | JobStatus::Processing => Err(Error::Other(anyhow::anyhow!(
            "non-terminal job returned from wait"
        ))),
    }
}
