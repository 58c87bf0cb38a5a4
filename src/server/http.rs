use crate::pipeline::{DownloadOrchestrator, JobOutcome, JobRequest, DOWNLOAD_ROUTE};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use url::Url;
use uuid::Uuid;

const API_KEY_HEADER: &str = "x-api-key";

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<DownloadOrchestrator>,
    pub api_key: Option<String>,
    pub http: reqwest::Client,
    /// Webhook-mode jobs still running after their 202 response
    pub jobs: TaskTracker,
}

impl AppState {
    pub fn new(orchestrator: Arc<DownloadOrchestrator>, api_key: Option<String>) -> Self {
        Self {
            orchestrator,
            api_key,
            http: reqwest::Client::new(),
            jobs: TaskTracker::new(),
        }
    }

    /// Stops accepting background jobs and waits for the running ones,
    /// webhook delivery included.
    pub async fn drain_jobs(&self) {
        self.jobs.close();
        if !self.jobs.is_empty() {
            info!("Waiting for {} background job(s) to finish", self.jobs.len());
        }
        self.jobs.wait().await;
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(DOWNLOAD_ROUTE, post(download))
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn require_api_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    if let Some(expected) = &state.api_key {
        let provided = headers
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok());

        if provided != Some(expected.as_str()) {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"message": "Unauthorized"})),
            )
                .into_response();
        }
    }

    next.run(request).await
}

async fn download(State(state): State<AppState>, Json(request): Json<JobRequest>) -> Response {
    let job_id = Uuid::new_v4().to_string();

    if let Some(webhook_url) = request.webhook_url.clone() {
        info!("Job {}: Queued, result will be sent to {}", job_id, webhook_url);

        let background_job_id = job_id.clone();
        let jobs = state.jobs.clone();
        jobs.spawn(async move {
            let outcome = state.orchestrator.run(&background_job_id, &request).await;
            if let Some(kind) = outcome.error_kind() {
                warn!("Job {}: Reporting failure ({:?}) to webhook", background_job_id, kind);
            }
            let payload =
                WebhookPayload::new(&background_job_id, request.client_id.as_deref(), outcome);
            send_webhook(&state.http, &webhook_url, &payload).await;
        });

        return (
            StatusCode::ACCEPTED,
            Json(json!({"job_id": job_id, "message": "processing"})),
        )
            .into_response();
    }

    let outcome = state.orchestrator.run(&job_id, &request).await;
    if let Some(kind) = outcome.error_kind() {
        warn!("Job {}: Responding with failure ({:?})", job_id, kind);
    }

    let (body, _route, status) = outcome.into_response();
    (status, Json(body)).into_response()
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    endpoint: &'static str,
    code: u16,
    id: Option<&'a str>,
    job_id: &'a str,
    response: Option<serde_json::Value>,
    message: String,
}

impl<'a> WebhookPayload<'a> {
    fn new(job_id: &'a str, client_id: Option<&'a str>, outcome: JobOutcome) -> Self {
        let success = outcome.is_success();
        let (body, endpoint, status) = outcome.into_response();

        let (response, message) = if success {
            (Some(body), "success".to_string())
        } else {
            let message = match body {
                serde_json::Value::String(message) => message,
                other => other.to_string(),
            };
            (None, message)
        };

        Self {
            endpoint,
            code: status.as_u16(),
            id: client_id,
            job_id,
            response,
            message,
        }
    }
}

async fn send_webhook(http: &reqwest::Client, webhook_url: &Url, payload: &WebhookPayload<'_>) {
    match http.post(webhook_url.as_str()).json(payload).send().await {
        Ok(response) if response.status().is_success() => {
            info!("Job {}: Webhook delivered to {}", payload.job_id, webhook_url);
        }
        Ok(response) => {
            error!(
                "Job {}: Webhook {} responded with HTTP {}",
                payload.job_id,
                webhook_url,
                response.status()
            );
        }
        Err(e) => {
            error!(
                "Job {}: Failed to deliver webhook to {}: {}",
                payload.job_id, webhook_url, e
            );
        }
    }
}
