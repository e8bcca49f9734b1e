//! In-process EHR for exercising the HTTP collaborators end to end.
//!
//! One local axum server plays every remote party of a launch:
//! - `GET  /fhir/r4/.well-known/smart-configuration`
//! - `POST /token` (accepts only [`GOOD_CODE`])
//! - `GET  /fhir/r4/Patient/{id}` (requires the bearer [`ACCESS_TOKEN`])
//! - `POST /container/patient`
//! - `GET  /api/me`

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use url::Url;

pub const GOOD_CODE: &str = "code-from-ehr";
pub const ACCESS_TOKEN: &str = "access-token-1";
pub const PATIENT_ID: &str = "1234567890V123456";
pub const FHIR_BASE_PATH: &str = "fhir/r4";

pub const PATIENT_JSON: &str = r#"{
  "resourceType": "Patient",
  "id": "1234567890V123456",
  "name": [{ "use": "official", "family": "Veteran", "given": ["John", "Quincy"] }],
  "identifier": [
    { "system": "http://example.com/systems/ICN", "value": "1234567890V123456" }
  ],
  "birthDate": "1950-01-15",
  "managingOrganization": { "display": "VA Medical Center Site #530" }
}"#;

pub const CURRENT_USER_JSON: &str = r#"{
  "authenticated": true,
  "user_info": {
    "sub": "clinician-1",
    "email": "clinician@example.com",
    "first_name": "Pat",
    "last_name": "Clinician",
    "roles": ["clinician"],
    "vista_ids": [
      { "site_id": "530", "site_name": "Cheyenne", "duz": "530-DUZ" },
      { "site_id": "673", "site_name": "Tampa", "duz": "673-DUZ" }
    ]
  }
}"#;

/// Knobs for the failure paths.
#[derive(Clone, Debug)]
pub struct FakeEhrOptions {
    pub challenge_methods: Vec<String>,
    /// Status returned by `POST /container/patient`.
    pub container_status: u16,
    /// `false` makes `/api/me` answer 401.
    pub signed_in: bool,
    /// `patient` claim of issued tokens.
    pub token_patient: Option<String>,
}

impl Default for FakeEhrOptions {
    fn default() -> Self {
        Self {
            challenge_methods: vec!["S256".into()],
            container_status: 200,
            signed_in: true,
            token_patient: Some(PATIENT_ID.into()),
        }
    }
}

#[derive(Default)]
struct Recorded {
    token_requests: Vec<HashMap<String, String>>,
    container_posts: Vec<String>,
    patient_reads: usize,
}

#[derive(Clone)]
struct EhrState {
    base: Url,
    options: FakeEhrOptions,
    recorded: Arc<Mutex<Recorded>>,
}

pub struct FakeEhr {
    base: Url,
    recorded: Arc<Mutex<Recorded>>,
    server: tokio::task::JoinHandle<()>,
}

impl FakeEhr {
    pub async fn start() -> io::Result<Self> {
        Self::start_with(FakeEhrOptions::default()).await
    }

    pub async fn start_with(options: FakeEhrOptions) -> io::Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let base = Url::parse(&format!("http://{addr}/"))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let recorded = Arc::new(Mutex::new(Recorded::default()));

        let state = EhrState {
            base: base.clone(),
            options,
            recorded: recorded.clone(),
        };
        let app = Router::new()
            .route(
                "/fhir/r4/.well-known/smart-configuration",
                get(smart_configuration),
            )
            .route("/token", post(token))
            .route("/fhir/r4/Patient/:id", get(patient))
            .route("/container/patient", post(container_patient))
            .route("/api/me", get(current_user))
            .with_state(state);

        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::warn!(error = %e, "fake EHR stopped");
            }
        });

        Ok(Self {
            base,
            recorded,
            server,
        })
    }

    /// FHIR base URL to launch against.
    pub fn iss(&self) -> Url {
        self.url(FHIR_BASE_PATH)
    }

    pub fn container_url(&self) -> Url {
        self.url("container/")
    }

    pub fn api_url(&self) -> Url {
        self.base.clone()
    }

    pub fn url(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        url.set_path(path);
        url
    }

    /// Form bodies received by the token endpoint, in order.
    pub fn token_requests(&self) -> Vec<HashMap<String, String>> {
        self.recorded
            .lock()
            .map(|r| r.token_requests.clone())
            .unwrap_or_default()
    }

    /// JSON bodies received by the container endpoint, in order.
    pub fn container_posts(&self) -> Vec<String> {
        self.recorded
            .lock()
            .map(|r| r.container_posts.clone())
            .unwrap_or_default()
    }

    pub fn patient_reads(&self) -> usize {
        self.recorded.lock().map(|r| r.patient_reads).unwrap_or(0)
    }
}

impl Drop for FakeEhr {
    fn drop(&mut self) {
        self.server.abort();
    }
}

#[derive(Serialize)]
struct SmartConfigurationBody {
    authorization_endpoint: String,
    token_endpoint: String,
    code_challenge_methods_supported: Vec<String>,
}

async fn smart_configuration(State(state): State<EhrState>) -> Json<SmartConfigurationBody> {
    Json(SmartConfigurationBody {
        authorization_endpoint: format!("{}authorize?tenant=va", state.base),
        token_endpoint: format!("{}token", state.base),
        code_challenge_methods_supported: state.options.challenge_methods.clone(),
    })
}

#[derive(Serialize)]
struct TokenBody {
    access_token: &'static str,
    token_type: &'static str,
    scope: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    patient: Option<String>,
}

#[derive(Serialize)]
struct OAuthErrorBody {
    error: &'static str,
    error_description: &'static str,
}

async fn token(
    State(state): State<EhrState>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let accepted = form.get("code").map(String::as_str) == Some(GOOD_CODE);
    if let Ok(mut recorded) = state.recorded.lock() {
        recorded.token_requests.push(form);
    }

    if !accepted {
        return (
            StatusCode::BAD_REQUEST,
            Json(OAuthErrorBody {
                error: "invalid_grant",
                error_description: "Authorization code is invalid or expired",
            }),
        )
            .into_response();
    }

    Json(TokenBody {
        access_token: ACCESS_TOKEN,
        token_type: "Bearer",
        scope: "launch patient/Patient.read",
        patient: state.options.token_patient.clone(),
    })
    .into_response()
}

async fn patient(
    State(state): State<EhrState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Ok(mut recorded) = state.recorded.lock() {
        recorded.patient_reads += 1;
    }

    let bearer = format!("Bearer {ACCESS_TOKEN}");
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if authorization != Some(bearer.as_str()) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if id != PATIENT_ID {
        return StatusCode::NOT_FOUND.into_response();
    }

    ([(header::CONTENT_TYPE, "application/fhir+json")], PATIENT_JSON).into_response()
}

async fn container_patient(State(state): State<EhrState>, body: Bytes) -> StatusCode {
    if let Ok(mut recorded) = state.recorded.lock() {
        recorded
            .container_posts
            .push(String::from_utf8_lossy(&body).into_owned());
    }
    StatusCode::from_u16(state.options.container_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

async fn current_user(State(state): State<EhrState>) -> Response {
    if !state.options.signed_in {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    ([(header::CONTENT_TYPE, "application/json")], CURRENT_USER_JSON).into_response()
}
