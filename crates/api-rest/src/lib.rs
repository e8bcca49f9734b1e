//! # API REST
//!
//! REST surface of the AI Assist SMART launch service.
//!
//! Handles:
//! - the launch entry point and the OAuth redirect back to the app
//! - launch status and the resolved patient context
//! - messages relayed from the patient-context container
//! - health and the OpenAPI document
//!
//! The launch itself is driven by [`assist_core::LaunchOrchestrator`]; this crate only maps it
//! onto HTTP.

#![warn(rust_2018_idioms)]

pub mod dto;

use assist_core::{
    wait_until_settled, ContainerMessageHandler, LaunchOrchestrator, LaunchParams,
};
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Router,
};
use dto::{
    CallbackQuery, ContainerMessageReq, ErrorRes, HealthRes, LaunchQuery, MessageRes,
    PatientContextRes, StatusRes,
};
use smart_client::{CallbackParams, SmartAuthorizer};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;

/// How long the callback request waits for the launch to settle before answering `202`.
pub const DEFAULT_SETTLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<LaunchOrchestrator>,
    authorizer: Arc<SmartAuthorizer>,
    messages: Arc<ContainerMessageHandler>,
    settle_timeout: Duration,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<LaunchOrchestrator>,
        authorizer: Arc<SmartAuthorizer>,
        messages: Arc<ContainerMessageHandler>,
    ) -> Self {
        Self {
            orchestrator,
            authorizer,
            messages,
            settle_timeout: DEFAULT_SETTLE_TIMEOUT,
        }
    }

    pub fn with_settle_timeout(mut self, timeout: Duration) -> Self {
        self.settle_timeout = timeout;
        self
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        launch,
        oauth_callback,
        status,
        patient_context,
        reset_patient_context,
        container_message,
    ),
    components(schemas(
        HealthRes,
        ErrorRes,
        StatusRes,
        PatientContextRes,
        ContainerMessageReq,
        MessageRes,
    ))
)]
pub struct ApiDoc;

/// Build the router. The OAuth callback is served at the path of the configured redirect URI.
pub fn router(state: AppState) -> Router {
    let callback_path = state.orchestrator.config().redirect_uri().path().to_string();
    tracing::debug!(%callback_path, "registering OAuth callback route");

    Router::new()
        .route("/health", get(health))
        .route("/launch", get(launch))
        .route(&callback_path, get(oauth_callback))
        .route("/status", get(status))
        .route(
            "/patient-context",
            get(patient_context).delete(reset_patient_context),
        )
        .route("/message", post(container_message))
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Liveness probe.
async fn health() -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "AI Assist launch service is alive".into(),
    })
}

#[utoipa::path(
    get,
    path = "/launch",
    params(LaunchQuery),
    responses(
        (status = 303, description = "Redirect to the authorization server"),
        (status = 200, description = "Launch settled without authorization", body = StatusRes),
        (status = 500, description = "Launch task failed", body = ErrorRes)
    )
)]
/// Start a SMART launch.
///
/// Runs the orchestrator in the background and answers with whichever comes first: the
/// authorization redirect, or the settled status (no parameters, decode failure, feature off).
async fn launch(State(state): State<AppState>, Query(query): Query<LaunchQuery>) -> Response {
    let params = LaunchParams::from(query);
    let mut redirects = state.authorizer.redirects();

    let orchestrator = state.orchestrator.clone();
    let mut run = tokio::spawn(async move { orchestrator.run(params).await });

    loop {
        tokio::select! {
            joined = &mut run => {
                return match joined {
                    Ok(status) => Json(StatusRes::from(&status)).into_response(),
                    Err(e) => {
                        tracing::error!(error = %e, "launch task failed");
                        internal_error("launch task failed")
                    }
                };
            }
            changed = redirects.changed() => {
                if changed.is_err() {
                    return match run.await {
                        Ok(status) => Json(StatusRes::from(&status)).into_response(),
                        Err(_) => internal_error("launch task failed"),
                    };
                }
                let redirect = redirects.borrow_and_update().clone();
                if let Some(redirect) = redirect {
                    tracing::info!(url = %redirect.url, "redirecting to authorization server");
                    return Redirect::to(redirect.url.as_str()).into_response();
                }
            }
        }
    }
}

#[utoipa::path(
    get,
    path = "/index.html",
    params(CallbackQuery),
    responses(
        (status = 200, description = "Launch settled", body = StatusRes),
        (status = 202, description = "Launch still running", body = StatusRes),
        (status = 400, description = "No pending authorization for this state", body = ErrorRes)
    )
)]
/// OAuth redirect target; served at the configured redirect URI path.
async fn oauth_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let mut updates = state.orchestrator.subscribe();

    if let Err(e) = state.authorizer.complete(CallbackParams::from(query)) {
        tracing::warn!(error = %e, "rejected OAuth callback");
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorRes {
                error: e.to_string(),
            }),
        )
            .into_response();
    }

    match tokio::time::timeout(state.settle_timeout, wait_until_settled(&mut updates)).await {
        Ok(Some(status)) => Json(StatusRes::from(&status)).into_response(),
        Ok(None) => internal_error("launch orchestrator stopped"),
        Err(_) => (
            StatusCode::ACCEPTED,
            Json(StatusRes::from(&state.orchestrator.status())),
        )
            .into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/status",
    responses(
        (status = 200, description = "Current launch status", body = StatusRes)
    )
)]
async fn status(State(state): State<AppState>) -> Json<StatusRes> {
    Json(StatusRes::from(&state.orchestrator.status()))
}

#[utoipa::path(
    get,
    path = "/patient-context",
    responses(
        (status = 200, description = "Patient in context", body = PatientContextRes),
        (status = 204, description = "No patient in context")
    )
)]
async fn patient_context(State(state): State<AppState>) -> Response {
    match state.orchestrator.store().current() {
        Some(patient) => Json(PatientContextRes::from(patient.as_ref())).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/patient-context",
    responses(
        (status = 204, description = "Patient context cleared")
    )
)]
/// Clear the patient context and return the launch status to `idle`.
async fn reset_patient_context(State(state): State<AppState>) -> StatusCode {
    state.orchestrator.reset();
    StatusCode::NO_CONTENT
}

#[utoipa::path(
    post,
    path = "/message",
    request_body = ContainerMessageReq,
    responses(
        (status = 200, description = "Message handled or ignored", body = MessageRes),
        (status = 400, description = "Malformed SMART event", body = ErrorRes)
    )
)]
/// Relay a message posted by the patient-context container. The sender is taken from `Origin`.
async fn container_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ContainerMessageReq>,
) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    match state.messages.handle(origin, &req.into()) {
        Ok(outcome) => Json(MessageRes::from(outcome)).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "error handling container message");
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorRes {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

fn internal_error(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorRes {
            error: message.to_string(),
        }),
    )
        .into_response()
}
