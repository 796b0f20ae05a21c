pub mod api;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod jobs;
pub mod limits;
pub mod ssrf;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod webhooks;

use std::sync::Arc;

use axum::{
    Json, Router, middleware,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::jobs::{CompletionService, JobFeed, JobQueue};
use crate::limits::{FixedWindowLimiter, RateLimiter};
use crate::store::{ApiKeyStore, Store, memory::MemoryStore};
use crate::webhooks::WebhookDeliveryEngine;

/// Shared application state, cloned into every handler.
#[derive(Clone, bon::Builder)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub limiter: Arc<dyn RateLimiter>,
    pub queue: JobQueue,
    pub delivery: Arc<WebhookDeliveryEngine>,
    pub completion: Arc<CompletionService>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire up state around a store and limiter. Returns the receiving
    /// side of the work queue for whatever drives the renderer.
    pub fn new<S>(
        config: Config,
        store: Arc<S>,
        limiter: Arc<dyn RateLimiter>,
    ) -> anyhow::Result<(Self, JobFeed)>
    where
        S: Store + 'static,
    {
        let (queue, feed) = JobQueue::new(config.queue_capacity);

        let delivery = Arc::new(WebhookDeliveryEngine::new(
            store.clone(),
            config.webhooks.retry_attempts,
            config.webhooks.base_backoff(),
            config.webhooks.delivery_timeout(),
        )?);

        let completion = Arc::new(CompletionService::new(
            store.clone(),
            delivery.clone(),
            config.results_dir.clone(),
            config.max_result_bytes,
        ));

        let state = AppState::builder()
            .store(store)
            .limiter(limiter)
            .queue(queue)
            .delivery(delivery)
            .completion(completion)
            .config(Arc::new(config))
            .build();

        Ok((state, feed))
    }
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Assemble the full router.
///
/// `/healthz` and `/files/{token}` sit outside the API key gate: the
/// former is for probes, the latter's token is its own credential.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/convert", post(api::handlers::jobs::convert))
        .route("/convert-async", post(api::handlers::jobs::convert_async))
        .route("/merge", post(api::handlers::jobs::merge))
        .route("/jobs/{id}", get(api::handlers::jobs::get_job))
        .route(
            "/webhooks",
            post(api::handlers::webhooks::create_webhook)
                .get(api::handlers::webhooks::list_webhooks),
        )
        .route(
            "/webhooks/{id}",
            get(api::handlers::webhooks::get_webhook)
                .put(api::handlers::webhooks::update_webhook)
                .delete(api::handlers::webhooks::delete_webhook),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/files/{token}", get(api::handlers::files::download))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// The assembled service: state, background tasks, and the listener
/// loop with graceful shutdown.
pub struct Application {
    state: AppState,
    limiter: Arc<FixedWindowLimiter>,
    job_feed: Option<JobFeed>,
    shutdown: CancellationToken,
}

impl Application {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let store = Arc::new(MemoryStore::new());
        let limiter = Arc::new(FixedWindowLimiter::new(config.rate_limit_per_minute));
        let (state, job_feed) = AppState::new(config, store, limiter.clone())?;

        Ok(Self {
            state,
            limiter,
            job_feed: Some(job_feed),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Hand the work queue's receiving end to an embedding renderer
    /// driver. Jobs the queue misses are recoverable via
    /// [`crate::store::JobStore::scan_queued`].
    pub fn take_job_feed(&mut self) -> Option<JobFeed> {
        self.job_feed.take()
    }

    /// Bind and serve until ctrl-c or SIGTERM.
    pub async fn serve(mut self) -> anyhow::Result<()> {
        if self.state.config.bootstrap_api_key {
            self.seed_bootstrap_key().await?;
        }

        self.spawn_limiter_sweep();

        // Standalone deployments have no embedded renderer driver; the
        // external renderer discovers work via the queued-job scan, so
        // the in-process feed just gets drained.
        if let Some(mut feed) = self.job_feed.take() {
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        id = feed.recv() => match id {
                            Some(id) => tracing::debug!(job = %types::abbrev_uuid(&id), "Job queued"),
                            None => break,
                        },
                    }
                }
            });
        }

        let addr = format!("{}:{}", self.state.config.host, self.state.config.port);
        let listener = TcpListener::bind(&addr).await?;
        info!("Listening on {addr}");

        let shutdown = self.shutdown.clone();
        axum::serve(listener, build_router(self.state))
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                info!("Shutting down");
                shutdown.cancel();
            })
            .await?;

        Ok(())
    }

    /// Development convenience: mint a working API key at startup and
    /// log it, so a fresh in-memory deployment is immediately usable.
    async fn seed_bootstrap_key(&self) -> anyhow::Result<()> {
        let secret = crypto::generate_api_key();
        self.state
            .store
            .create_api_key(store::models::ApiKey {
                id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                team_id: None,
                key_hash: crypto::hash_api_key(&secret),
                key_prefix: crypto::key_prefix(&secret),
                revoked_at: None,
                last_used_at: None,
                created_at: chrono::Utc::now(),
            })
            .await?;
        warn!("Bootstrap API key (development only): {secret}");
        Ok(())
    }

    fn spawn_limiter_sweep(&self) {
        let limiter = self.limiter.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(limits::WINDOW) => limiter.sweep(),
                }
            }
        });
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
