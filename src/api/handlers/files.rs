//! Result file download.

use axum::{
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::AppState;
use crate::errors::{Error, Result};
use crate::store::{JobStore, StoreError};

/// `GET /files/{token}` — fetch a completed job's result.
///
/// The download token is the credential: this route sits outside the
/// API key gate, and an unknown token is a plain 404.
pub async fn download(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Response> {
    let not_found = || Error::NotFound {
        resource: "File".to_string(),
        id: token.clone(),
    };

    let job = match state.store.find_job_by_download_token(&token).await {
        Ok(job) => job,
        Err(StoreError::NotFound) => return Err(not_found()),
        Err(e) => return Err(e.into()),
    };

    let Some(path) = job.result_path.as_ref() else {
        return Err(not_found());
    };
    let bytes = tokio::fs::read(path).await.map_err(anyhow::Error::from)?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.pdf\"", job.id),
            ),
        ],
        bytes,
    )
        .into_response())
}
