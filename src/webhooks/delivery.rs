//! Webhook delivery with bounded retry.
//!
//! Dispatch is fire-and-forget from the job lifecycle's point of view:
//! each matching webhook gets its own tokio task, so one slow or broken
//! receiver never delays another and never touches the job's status.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::events::build_event_body;
use super::signing::sign_payload;
use crate::store::WebhookStore;
use crate::store::models::{Webhook, WebhookEventType};
use crate::types::{TeamId, UserId, abbrev_uuid};

pub const SIGNATURE_HEADER: &str = "x-rendr-signature";
pub const EVENT_HEADER: &str = "x-rendr-event";

pub struct WebhookDeliveryEngine {
    store: Arc<dyn WebhookStore>,
    client: reqwest::Client,
    /// Total attempts per webhook, including the first.
    retry_attempts: u32,
    /// First retry delay; doubles per attempt.
    base_backoff: Duration,
}

impl WebhookDeliveryEngine {
    pub fn new(
        store: Arc<dyn WebhookStore>,
        retry_attempts: u32,
        base_backoff: Duration,
        delivery_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(delivery_timeout).build()?;
        Ok(Self {
            store,
            client,
            retry_attempts,
            base_backoff,
        })
    }

    /// Deliver an event to every enabled, subscribed webhook of the
    /// owner. Returns the spawned task handles; callers normally drop
    /// them, since delivery outcome feeds back into nothing.
    pub async fn dispatch(
        self: &Arc<Self>,
        user_id: UserId,
        team_id: Option<TeamId>,
        event: WebhookEventType,
        payload: &serde_json::Value,
    ) -> Vec<JoinHandle<()>> {
        let webhooks = match self
            .store
            .list_deliverable_webhooks(user_id, team_id, event)
            .await
        {
            Ok(webhooks) => webhooks,
            Err(e) => {
                warn!(user = %abbrev_uuid(&user_id), %event, "Webhook lookup failed, dropping event: {e}");
                return Vec::new();
            }
        };

        if webhooks.is_empty() {
            return Vec::new();
        }

        // Serialized once so the signature covers the exact bytes every
        // attempt sends.
        let body = build_event_body(event, payload);
        let body_bytes: Arc<[u8]> = match serde_json::to_vec(&body) {
            Ok(bytes) => bytes.into(),
            Err(e) => {
                warn!(%event, "Failed to serialize webhook payload, dropping event: {e}");
                return Vec::new();
            }
        };

        debug!(
            user = %abbrev_uuid(&user_id),
            %event,
            count = webhooks.len(),
            "Dispatching webhook event"
        );

        webhooks
            .into_iter()
            .map(|webhook| {
                let engine = self.clone();
                let body_bytes = body_bytes.clone();
                tokio::spawn(async move {
                    engine.deliver(&webhook, event, &body_bytes).await;
                })
            })
            .collect()
    }

    /// Deliver one event to one webhook, retrying with exponential
    /// backoff. Exhaustion drops the event with a warning.
    async fn deliver(&self, webhook: &Webhook, event: WebhookEventType, body: &[u8]) {
        let signature = sign_payload(&webhook.secret, body);

        for attempt in 0..self.retry_attempts {
            let result = self
                .client
                .post(&webhook.url)
                .header("content-type", "application/json")
                .header(SIGNATURE_HEADER, format!("sha256={signature}"))
                .header(EVENT_HEADER, event.as_str())
                .body(body.to_vec())
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    debug!(
                        webhook = %abbrev_uuid(&webhook.id),
                        %event,
                        attempt = attempt + 1,
                        "Webhook delivered"
                    );
                    return;
                }
                Ok(response) => {
                    debug!(
                        webhook = %abbrev_uuid(&webhook.id),
                        %event,
                        attempt = attempt + 1,
                        status = %response.status(),
                        "Webhook delivery attempt rejected"
                    );
                }
                Err(e) => {
                    debug!(
                        webhook = %abbrev_uuid(&webhook.id),
                        %event,
                        attempt = attempt + 1,
                        "Webhook delivery attempt failed: {e}"
                    );
                }
            }

            if attempt + 1 < self.retry_attempts {
                tokio::time::sleep(self.base_backoff * 2u32.pow(attempt)).await;
            }
        }

        warn!(
            webhook = %abbrev_uuid(&webhook.id),
            %event,
            attempts = self.retry_attempts,
            "Webhook delivery exhausted retries, dropping event"
        );
    }
}
