//! End-to-end tests over the HTTP surface.
//!
//! Each test gets a fresh in-memory deployment. A fake renderer can be
//! attached to the work queue to drive jobs to a terminal state, the
//! way the real out-of-process renderer would.

use std::sync::Arc;

use axum_test::TestServer;
use bytes::Bytes;
use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use rendr::auth::Caller;
use rendr::config::Config;
use rendr::crypto::{generate_api_key, hash_api_key, key_prefix};
use rendr::jobs::JobFeed;
use rendr::limits::FixedWindowLimiter;
use rendr::store::memory::MemoryStore;
use rendr::store::models::{ApiKey, Webhook, WebhookEventType};
use rendr::store::{ApiKeyStore, WebhookStore};
use rendr::{AppState, build_router};

struct TestApp {
    server: TestServer,
    state: AppState,
    store: Arc<MemoryStore>,
    feed: Option<JobFeed>,
    api_key: String,
    caller: Caller,
    // Held for its Drop; results land in this directory
    _results_dir: tempfile::TempDir,
}

#[derive(Clone, Copy)]
enum RendererBehavior {
    Succeed(&'static [u8]),
    Fail(&'static str),
}

impl TestApp {
    async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    async fn spawn_with(tweak: impl FnOnce(&mut Config)) -> Self {
        let results_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.results_dir = results_dir.path().to_path_buf();
        // Keep the sync wait short so timeout paths run in test time
        config.wait.deadline_ms = 400;
        config.wait.poll_interval_ms = 25;
        config.webhooks.base_backoff_ms = 10;
        tweak(&mut config);

        let store = Arc::new(MemoryStore::new());
        let limiter = Arc::new(FixedWindowLimiter::new(config.rate_limit_per_minute));
        let (state, feed) = AppState::new(config, store.clone(), limiter).unwrap();
        let server = TestServer::new(build_router(state.clone())).unwrap();

        let mut app = TestApp {
            server,
            state,
            store,
            feed: Some(feed),
            api_key: String::new(),
            caller: Caller {
                user_id: Uuid::new_v4(),
                team_id: None,
                api_key_id: Uuid::new_v4(),
            },
            _results_dir: results_dir,
        };
        app.api_key = app.seed_api_key(app.caller).await;
        app
    }

    async fn seed_api_key(&self, caller: Caller) -> String {
        let secret = generate_api_key();
        self.store
            .create_api_key(ApiKey {
                id: caller.api_key_id,
                user_id: caller.user_id,
                team_id: caller.team_id,
                key_hash: hash_api_key(&secret),
                key_prefix: key_prefix(&secret),
                revoked_at: None,
                last_used_at: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        secret
    }

    /// Attach a renderer loop to the work queue that drives every job
    /// to the given terminal outcome.
    fn spawn_renderer(&mut self, behavior: RendererBehavior) {
        let mut feed = self.feed.take().expect("renderer already attached");
        let completion = self.state.completion.clone();
        tokio::spawn(async move {
            while let Some(job_id) = feed.recv().await {
                let result = match behavior {
                    RendererBehavior::Succeed(bytes) => {
                        completion.complete(job_id, Bytes::from_static(bytes)).await
                    }
                    RendererBehavior::Fail(code) => {
                        completion
                            .fail(job_id, code.to_string(), "simulated failure".to_string())
                            .await
                    }
                };
                // Oversized results intentionally fail the job
                let _ = result;
            }
        });
    }

    fn post(&self, path: &str, body: &Value) -> axum_test::TestRequest {
        self.server
            .post(path)
            .authorization_bearer(&self.api_key)
            .json(body)
    }

    fn get(&self, path: &str) -> axum_test::TestRequest {
        self.server.get(path).authorization_bearer(&self.api_key)
    }
}

fn html_body() -> Value {
    json!({"type": "html", "html": "<h1>doc</h1>"})
}

/// Pull the download token out of a succeeded job's `pdf_url`.
fn result_token(body: &Value) -> String {
    body["pdf_url"]
        .as_str()
        .and_then(|url| url.strip_prefix("/files/"))
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_healthz_is_open() {
    let app = TestApp::spawn().await;
    let response = app.server.get("/healthz").await;
    response.assert_status_ok();
    response.assert_json(&json!({"status": "ok"}));
}

#[tokio::test]
async fn test_auth_is_required() {
    let app = TestApp::spawn().await;

    let response = app.server.post("/convert").json(&html_body()).await;
    response.assert_status_unauthorized();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "missing_auth");

    let response = app
        .server
        .post("/convert")
        .authorization_bearer(&generate_api_key())
        .json(&html_body())
        .await;
    response.assert_status_unauthorized();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "invalid_api_key");
}

#[tokio::test]
async fn test_revoked_key_is_rejected() {
    let app = TestApp::spawn().await;
    app.store
        .revoke_api_key(app.caller.api_key_id, app.caller.user_id)
        .await
        .unwrap();

    let response = app.post("/convert", &html_body()).await;
    response.assert_status_unauthorized();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "revoked_api_key");
}

#[test_log::test(tokio::test)]
async fn test_sync_convert_returns_result_and_file_downloads() {
    let mut app = TestApp::spawn().await;
    app.spawn_renderer(RendererBehavior::Succeed(b"%PDF-1.7 fake"));

    let response = app.post("/convert", &html_body()).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "succeeded");
    assert_eq!(body["error"], Value::Null);
    let pdf_url = body["pdf_url"].as_str().unwrap().to_string();
    assert!(pdf_url.starts_with("/files/"));

    // The link embeds the download token; no API key needed
    let download = app.server.get(&pdf_url).await;
    download.assert_status_ok();
    assert_eq!(
        download.header("content-type").to_str().unwrap(),
        "application/pdf"
    );
    assert_eq!(download.as_bytes().as_ref(), b"%PDF-1.7 fake".as_slice());
}

#[tokio::test]
async fn test_sync_convert_surfaces_failure_as_422() {
    let mut app = TestApp::spawn().await;
    app.spawn_renderer(RendererBehavior::Fail("render_error"));

    let response = app.post("/convert", &html_body()).await;
    response.assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "render_error");
}

#[tokio::test]
async fn test_sync_convert_degrades_to_poll_on_timeout() {
    // No renderer attached, so the job never becomes terminal
    let app = TestApp::spawn().await;

    let response = app.post("/convert", &html_body()).await;
    response.assert_status(axum::http::StatusCode::ACCEPTED);
    let body: Value = response.json();
    let job_id = body["job_id"].as_str().unwrap();
    assert_eq!(body["status_url"], format!("/jobs/{job_id}"));

    let status = app.get(&format!("/jobs/{job_id}")).await;
    status.assert_status_ok();
    let status_body: Value = status.json();
    assert_eq!(status_body["status"], "queued");
    // Fields are present as explicit nulls until the job is terminal
    assert_eq!(status_body.get("pdf_url"), Some(&Value::Null));
    assert_eq!(status_body.get("error"), Some(&Value::Null));
}

#[tokio::test]
async fn test_async_convert_returns_handle_immediately() {
    let app = TestApp::spawn().await;

    let response = app.post("/convert-async", &html_body()).await;
    response.assert_status(axum::http::StatusCode::ACCEPTED);
    let body: Value = response.json();
    assert_eq!(body["status"], "queued");
    assert!(body["job_id"].as_str().is_some());
}

#[tokio::test]
async fn test_idempotency_key_collapses_duplicates() {
    let app = TestApp::spawn().await;

    let first = app
        .post("/convert-async", &html_body())
        .add_header("idempotency-key", "order-42")
        .await;
    let second = app
        .post("/convert-async", &html_body())
        .add_header("idempotency-key", "order-42")
        .await;
    let other = app
        .post("/convert-async", &html_body())
        .add_header("idempotency-key", "order-43")
        .await;

    let first: Value = first.json();
    let second: Value = second.json();
    let other: Value = other.json();
    assert_eq!(first["job_id"], second["job_id"]);
    assert_ne!(first["job_id"], other["job_id"]);
}

#[tokio::test]
async fn test_unsafe_urls_are_rejected() {
    let app = TestApp::spawn().await;

    for url in [
        "http://127.0.0.1/admin",
        "http://169.254.169.254/latest/meta-data/",
        "http://10.0.0.5/internal",
        "http://localhost:8080/",
        "file:///etc/passwd",
    ] {
        let response = app
            .post("/convert", &json!({"type": "url", "url": url}))
            .await;
        response.assert_status_bad_request();
        let body: Value = response.json();
        assert_eq!(body["error"]["code"], "invalid_request", "url: {url}");
    }
}

#[tokio::test]
async fn test_malformed_input_union_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .post("/convert", &json!({"type": "docx", "html": "<p>x</p>"}))
        .await;
    assert!(response.status_code().is_client_error());
}

#[tokio::test]
async fn test_rate_limit_denies_and_sets_headers() {
    let app = TestApp::spawn_with(|config| config.rate_limit_per_minute = 2).await;

    let first = app.get("/webhooks").await;
    first.assert_status_ok();
    assert_eq!(first.header("x-ratelimit-limit").to_str().unwrap(), "2");
    assert_eq!(first.header("x-ratelimit-remaining").to_str().unwrap(), "1");

    let second = app.get("/webhooks").await;
    second.assert_status_ok();
    assert_eq!(second.header("x-ratelimit-remaining").to_str().unwrap(), "0");

    let third = app.get("/webhooks").await;
    third.assert_status(axum::http::StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(third.header("x-ratelimit-remaining").to_str().unwrap(), "0");
    let retry_after: u64 = third.header("retry-after").to_str().unwrap().parse().unwrap();
    assert!((1..=60).contains(&retry_after));
    let body: Value = third.json();
    assert_eq!(body["error"]["code"], "rate_limit_exceeded");
}

#[tokio::test]
async fn test_job_visibility_is_per_owner() {
    let mut app = TestApp::spawn().await;
    app.spawn_renderer(RendererBehavior::Succeed(b"pdf"));

    let created = app.post("/convert", &html_body()).await;
    created.assert_status_ok();
    let job_id = created.json::<Value>()["job_id"].as_str().unwrap().to_string();

    let stranger = Caller {
        user_id: Uuid::new_v4(),
        team_id: None,
        api_key_id: Uuid::new_v4(),
    };
    let stranger_key = app.seed_api_key(stranger).await;

    let response = app
        .server
        .get(&format!("/jobs/{job_id}"))
        .authorization_bearer(&stranger_key)
        .await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn test_webhook_crud_round_trip() {
    let app = TestApp::spawn().await;

    let created = app
        .post(
            "/webhooks",
            &json!({"url": "https://example.com/hook", "events": ["job.completed"]}),
        )
        .await;
    created.assert_status(axum::http::StatusCode::CREATED);
    let created: Value = created.json();
    let id = created["id"].as_str().unwrap().to_string();
    // The secret appears exactly once, at creation
    assert!(created["secret"].as_str().unwrap().starts_with("whsec_"));

    let listed = app.get("/webhooks").await;
    listed.assert_status_ok();
    let listed: Value = listed.json();
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert!(listed[0].get("secret").is_none());

    let fetched = app.get(&format!("/webhooks/{id}")).await;
    fetched.assert_status_ok();
    assert!(fetched.json::<Value>().get("secret").is_none());

    let updated = app
        .server
        .put(&format!("/webhooks/{id}"))
        .authorization_bearer(&app.api_key)
        .json(&json!({"enabled": false}))
        .await;
    updated.assert_status_ok();
    let updated: Value = updated.json();
    assert_eq!(updated["enabled"], false);
    assert_eq!(updated["url"], "https://example.com/hook");

    let deleted = app
        .server
        .delete(&format!("/webhooks/{id}"))
        .authorization_bearer(&app.api_key)
        .await;
    deleted.assert_status(axum::http::StatusCode::NO_CONTENT);

    app.get(&format!("/webhooks/{id}")).await.assert_status_not_found();
}

#[tokio::test]
async fn test_webhook_urls_pass_the_egress_guard() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/webhooks",
            &json!({"url": "http://192.168.1.10/hook", "events": ["job.completed"]}),
        )
        .await;
    response.assert_status_bad_request();

    let response = app
        .post(
            "/webhooks",
            &json!({"url": "https://example.com/hook", "events": []}),
        )
        .await;
    response.assert_status_bad_request();
}

#[test_log::test(tokio::test)]
async fn test_completion_delivers_signed_webhook() {
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let receiver = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&receiver)
        .await;

    let mut app = TestApp::spawn().await;
    // Local receivers cannot pass the egress guard at the API, so the
    // registration is seeded directly
    let secret = rendr::webhooks::generate_webhook_secret();
    let now = Utc::now();
    app.store
        .create_webhook(Webhook {
            id: Uuid::new_v4(),
            user_id: app.caller.user_id,
            team_id: None,
            url: receiver.uri(),
            secret: secret.clone(),
            events: vec![WebhookEventType::JobCompleted],
            enabled: true,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();

    app.spawn_renderer(RendererBehavior::Succeed(b"pdf"));
    let response = app.post("/convert", &html_body()).await;
    response.assert_status_ok();
    let job_id = response.json::<Value>()["job_id"].as_str().unwrap().to_string();

    // Delivery happens on detached tasks
    let mut requests = Vec::new();
    for _ in 0..100 {
        requests = receiver.received_requests().await.unwrap();
        if !requests.is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(requests.len(), 1);
    let request = &requests[0];

    let header = request
        .headers
        .get("x-rendr-signature")
        .unwrap()
        .to_str()
        .unwrap();
    let signature = header.strip_prefix("sha256=").unwrap();
    assert!(rendr::webhooks::verify_signature(
        &secret,
        &request.body,
        signature
    ));

    let body: Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body["event"], "job.completed");
    assert_eq!(body["job_id"], job_id);
    assert!(body["download_token"].as_str().is_some());
}

#[tokio::test]
async fn test_merge_flow_end_to_end() {
    let mut app = TestApp::spawn().await;
    app.spawn_renderer(RendererBehavior::Succeed(b"part"));

    let mut tokens = Vec::new();
    for _ in 0..2 {
        let response = app.post("/convert", &html_body()).await;
        response.assert_status_ok();
        tokens.push(result_token(&response.json::<Value>()));
    }

    let response = app
        .post(
            "/merge",
            &json!({
                "sources": tokens,
                "filename": "bundle.pdf",
                "metadata": {"order": 42}
            }),
        )
        .await;
    response.assert_status(axum::http::StatusCode::ACCEPTED);
    let job_id = response.json::<Value>()["job_id"].as_str().unwrap().to_string();

    // The renderer loop also picks up the merge job
    for _ in 0..100 {
        let status = app.get(&format!("/jobs/{job_id}")).await;
        let body: Value = status.json();
        if body["status"] == "succeeded" {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("merge job never completed");
}

#[tokio::test]
async fn test_merge_rejects_unknown_source() {
    let mut app = TestApp::spawn().await;
    app.spawn_renderer(RendererBehavior::Succeed(b"part"));

    let response = app.post("/convert", &html_body()).await;
    let token = result_token(&response.json::<Value>());

    // A token that resolves to nothing looks like a missing resource
    let response = app
        .post("/merge", &json!({"sources": [token, "no-such-token"]}))
        .await;
    response.assert_status_not_found();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_merge_rejects_path_like_filename() {
    let mut app = TestApp::spawn().await;
    app.spawn_renderer(RendererBehavior::Succeed(b"part"));

    let mut tokens = Vec::new();
    for _ in 0..2 {
        let response = app.post("/convert", &html_body()).await;
        tokens.push(result_token(&response.json::<Value>()));
    }

    let response = app
        .post(
            "/merge",
            &json!({"sources": tokens, "filename": "../etc/passwd"}),
        )
        .await;
    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "invalid_request");
}

#[tokio::test]
async fn test_unknown_download_token_is_404() {
    let app = TestApp::spawn().await;
    let response = app.server.get("/files/not-a-token").await;
    response.assert_status_not_found();
}
