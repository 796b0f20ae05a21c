//! API key authentication and the request gate middleware.
//!
//! Every API route passes through [`require_api_key`], which resolves
//! the bearer token to a [`Caller`] identity and charges the request
//! against the key's rate limit before any handler runs.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::sync::Arc;

use crate::crypto::hash_api_key;
use crate::errors::{Error, Result};
use crate::store::{ApiKeyStore, StoreError};
use crate::types::{ApiKeyId, TeamId, UserId, abbrev_uuid};
use crate::AppState;

/// The authenticated identity attached to a request.
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    pub user_id: UserId,
    pub team_id: Option<TeamId>,
    pub api_key_id: ApiKeyId,
}

/// Pull the bearer token out of the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

/// Resolve a bearer token to a caller identity.
///
/// The token is hashed and looked up; the plaintext never reaches the
/// store. On success a detached task bumps the key's `last_used_at`,
/// and a failure there is logged but never fails the request.
pub async fn authenticate<S>(store: &Arc<S>, bearer: Option<String>) -> Result<Caller>
where
    S: ApiKeyStore + ?Sized + 'static,
{
    let token = bearer.ok_or(Error::MissingAuth)?;

    let key = match store.find_api_key_by_hash(&hash_api_key(&token)).await {
        Ok(key) => key,
        Err(StoreError::NotFound) => return Err(Error::InvalidApiKey),
        Err(e) => return Err(e.into()),
    };

    if key.is_revoked() {
        return Err(Error::RevokedApiKey);
    }

    let caller = Caller {
        user_id: key.user_id,
        team_id: key.team_id,
        api_key_id: key.id,
    };

    let store = store.clone();
    tokio::spawn(async move {
        if let Err(e) = store.touch_api_key(key.id, Utc::now()).await {
            tracing::debug!(key = %abbrev_uuid(&key.id), "Failed to update key usage timestamp: {e}");
        }
    });

    Ok(caller)
}

/// Middleware gating every API route: authenticate, then rate limit.
///
/// Successful responses and denials alike carry `x-ratelimit-limit` and
/// `x-ratelimit-remaining` headers.
pub async fn require_api_key(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let bearer = bearer_token(request.headers());
    let caller = authenticate(&state.store, bearer).await?;

    let decision = state.limiter.check(caller.api_key_id);
    let mut response = if decision.allowed {
        request.extensions_mut().insert(caller);
        next.run(request).await
    } else {
        Error::RateLimitExceeded {
            limit: decision.limit,
            retry_after_secs: decision.retry_after_secs,
        }
        .into_response()
    };

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&decision.limit.to_string()) {
        headers.insert("x-ratelimit-limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert("x-ratelimit-remaining", value);
    }

    Ok(response)
}
