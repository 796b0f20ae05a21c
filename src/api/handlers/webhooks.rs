//! Webhook management handlers.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use uuid::Uuid;

use crate::AppState;
use crate::api::models::webhooks::{
    CreateWebhookRequest, UpdateWebhookRequest, WebhookCreatedResponse, WebhookResponse,
};
use crate::auth::Caller;
use crate::errors::{Error, Result};
use crate::ssrf::assert_safe_url;
use crate::store::{StoreError, WebhookStore};
use crate::store::models::{Webhook, WebhookUpdate};
use crate::types::WebhookId;
use crate::webhooks::generate_webhook_secret;

fn webhook_not_found(id: WebhookId) -> Error {
    Error::NotFound {
        resource: "Webhook".to_string(),
        id: id.to_string(),
    }
}

/// `POST /webhooks` — register an endpoint. The target URL passes the
/// egress guard before anything is stored, and the response is the only
/// place the signing secret ever appears.
pub async fn create_webhook(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<CreateWebhookRequest>,
) -> Result<Response> {
    if request.events.is_empty() {
        return Err(Error::InvalidRequest {
            message: "a webhook must subscribe to at least one event".to_string(),
        });
    }
    assert_safe_url(&request.url).await?;

    let now = Utc::now();
    let webhook = state
        .store
        .create_webhook(Webhook {
            id: Uuid::new_v4(),
            user_id: caller.user_id,
            team_id: caller.team_id,
            url: request.url,
            secret: generate_webhook_secret(),
            events: request.events,
            enabled: request.enabled,
            created_at: now,
            updated_at: now,
        })
        .await?;

    let response = WebhookCreatedResponse {
        webhook: WebhookResponse::from(&webhook),
        secret: webhook.secret.clone(),
    };
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// `GET /webhooks`
pub async fn list_webhooks(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<Vec<WebhookResponse>>> {
    let webhooks = state
        .store
        .list_webhooks(caller.user_id, caller.team_id)
        .await?;
    Ok(Json(webhooks.iter().map(WebhookResponse::from).collect()))
}

/// `GET /webhooks/{id}`
pub async fn get_webhook(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<WebhookId>,
) -> Result<Json<WebhookResponse>> {
    match state
        .store
        .find_webhook(id, caller.user_id, caller.team_id)
        .await
    {
        Ok(webhook) => Ok(Json(WebhookResponse::from(&webhook))),
        Err(StoreError::NotFound) => Err(webhook_not_found(id)),
        Err(e) => Err(e.into()),
    }
}

/// `PUT /webhooks/{id}` — partial update; a new URL passes the egress
/// guard like at creation. The secret is immutable.
pub async fn update_webhook(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<WebhookId>,
    Json(request): Json<UpdateWebhookRequest>,
) -> Result<Json<WebhookResponse>> {
    if let Some(url) = &request.url {
        assert_safe_url(url).await?;
    }
    if let Some(events) = &request.events {
        if events.is_empty() {
            return Err(Error::InvalidRequest {
                message: "a webhook must subscribe to at least one event".to_string(),
            });
        }
    }

    let update = WebhookUpdate {
        url: request.url,
        events: request.events,
        enabled: request.enabled,
    };
    match state
        .store
        .update_webhook(id, caller.user_id, caller.team_id, update)
        .await
    {
        Ok(webhook) => Ok(Json(WebhookResponse::from(&webhook))),
        Err(StoreError::NotFound) => Err(webhook_not_found(id)),
        Err(e) => Err(e.into()),
    }
}

/// `DELETE /webhooks/{id}`
pub async fn delete_webhook(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<WebhookId>,
) -> Result<StatusCode> {
    match state
        .store
        .delete_webhook(id, caller.user_id, caller.team_id)
        .await
    {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(StoreError::NotFound) => Err(webhook_not_found(id)),
        Err(e) => Err(e.into()),
    }
}
