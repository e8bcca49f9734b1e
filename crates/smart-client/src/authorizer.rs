//! SMART-on-FHIR OAuth2 authorizer.
//!
//! The authorization code flow spans two browser requests: the launch, which must be redirected
//! to the authorization server, and the callback, which brings back `code` and `state`.
//! [`SmartAuthorizer::authorize`] publishes the redirect on a watch channel and then waits on a
//! oneshot for the matching [`SmartAuthorizer::complete`] call from the callback handler.

use crate::discovery::SmartConfiguration;
use crate::pkce::{PkceData, CHALLENGE_METHOD};
use crate::session::FhirRestSession;
use assist_core::{AuthorizationError, AuthorizationRequest, FhirAuthorizer, FhirSession, OAuthStateCache};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use url::Url;

/// How long a pending authorization waits for its callback.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(600);

/// Where the browser must be sent to continue authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRedirect {
    pub url: Url,
    pub state: String,
}

/// Query parameters of the OAuth redirect back to the app.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallbackError {
    #[error("authorization callback is missing state")]
    MissingState,
    #[error("no pending authorization for this state")]
    UnknownState,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    patient: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OAuthErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

type CallbackReply = oneshot::Sender<Result<String, AuthorizationError>>;

/// Forgets a pending authorization when its waiter goes away, including when the waiting future
/// is dropped by a superseding launch.
struct PendingGuard<'a> {
    authorizer: &'a SmartAuthorizer,
    state: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.authorizer.forget(&self.state);
    }
}

pub struct SmartAuthorizer {
    http: reqwest::Client,
    callback_timeout: Duration,
    pending: Mutex<HashMap<String, CallbackReply>>,
    redirects: watch::Sender<Option<AuthorizationRedirect>>,
}

impl SmartAuthorizer {
    pub fn new(http: reqwest::Client) -> Self {
        let (redirects, _) = watch::channel(None);
        Self {
            http,
            callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
            pending: Mutex::new(HashMap::new()),
            redirects,
        }
    }

    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    /// Redirects published by in-flight authorizations.
    pub fn redirects(&self) -> watch::Receiver<Option<AuthorizationRedirect>> {
        self.redirects.subscribe()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Hand the callback parameters to the authorization waiting on `state`.
    pub fn complete(&self, params: CallbackParams) -> Result<(), CallbackError> {
        let state = params
            .state
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(CallbackError::MissingState)?;

        let reply = self
            .pending
            .lock()
            .ok()
            .and_then(|mut pending| pending.remove(state))
            .ok_or(CallbackError::UnknownState)?;

        self.forget(state);

        let outcome = match (params.error, params.code) {
            (Some(error), _) => Err(AuthorizationError::new(
                params.error_description.filter(|d| !d.is_empty()).unwrap_or(error),
            )),
            (None, Some(code)) if !code.is_empty() => Ok(code),
            (None, _) => Err(AuthorizationError::new("Authorization response is missing code")),
        };

        // The waiting side may have timed out already.
        let _ = reply.send(outcome);
        Ok(())
    }

    fn register(&self, state: &str, reply: CallbackReply) -> Result<(), AuthorizationError> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| AuthorizationError::new("Authorization state is unavailable"))?;
        pending.insert(state.to_string(), reply);
        Ok(())
    }

    /// Drop the pending entry for `state` and its redirect, if that is still the published one.
    fn forget(&self, state: &str) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(state);
        }
        self.redirects.send_if_modified(|current| {
            if current.as_ref().is_some_and(|r| r.state == state) {
                *current = None;
                true
            } else {
                false
            }
        });
    }

    async fn exchange_code(
        &self,
        token_endpoint: &Url,
        request: &AuthorizationRequest,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenResponse, AuthorizationError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", request.redirect_uri.as_str()),
            ("client_id", request.client_id.as_str()),
        ];
        if let Some(verifier) = code_verifier {
            form.push(("code_verifier", verifier));
        }

        let response = self
            .http
            .post(token_endpoint.clone())
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthorizationError::new(format!("Token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body: OAuthErrorBody = response.json().await.unwrap_or_default();
            let message = body
                .error_description
                .or(body.error)
                .unwrap_or_else(|| {
                    format!(
                        "Token request failed: {} {}",
                        status.as_u16(),
                        status.canonical_reason().unwrap_or("")
                    )
                });
            return Err(AuthorizationError::new(message));
        }

        response
            .json()
            .await
            .map_err(|e| AuthorizationError::new(format!("Invalid token response: {e}")))
    }
}

/// Authorize URL for one attempt. `code_challenge` is sent only when present.
pub fn authorize_url(
    configuration: &SmartConfiguration,
    request: &AuthorizationRequest,
    state: &str,
    code_challenge: Option<&str>,
) -> Url {
    let mut url = configuration.authorization_endpoint.clone();
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("response_type", "code")
            .append_pair("client_id", &request.client_id)
            .append_pair("scope", &request.scope)
            .append_pair("redirect_uri", request.redirect_uri.as_str())
            .append_pair("aud", &request.iss)
            .append_pair("launch", &request.launch)
            .append_pair("state", state);
        if let Some(challenge) = code_challenge {
            query
                .append_pair("code_challenge", challenge)
                .append_pair("code_challenge_method", CHALLENGE_METHOD);
        }
    }
    url
}

#[async_trait]
impl FhirAuthorizer for SmartAuthorizer {
    async fn authorize(
        &self,
        request: AuthorizationRequest,
    ) -> Result<Box<dyn FhirSession>, AuthorizationError> {
        let iss = Url::parse(&request.iss)
            .map_err(|e| AuthorizationError::new(format!("Invalid iss '{}': {e}", request.iss)))?;

        let configuration = SmartConfiguration::fetch(&self.http, &iss).await?;
        let use_pkce = configuration.use_pkce(request.pkce_mode)?;

        let pkce = PkceData::new();
        let challenge = use_pkce.then_some(pkce.code_challenge.as_str());
        let url = authorize_url(&configuration, &request, &pkce.state, challenge);

        let (reply, callback) = oneshot::channel();
        self.register(&pkce.state, reply)?;
        let pending = PendingGuard {
            authorizer: self,
            state: pkce.state.clone(),
        };
        self.redirects.send_replace(Some(AuthorizationRedirect {
            url,
            state: pkce.state.clone(),
        }));
        tracing::info!(
            pkce = use_pkce,
            pkce_mode = %request.pkce_mode,
            "awaiting authorization callback"
        );

        let waited = tokio::time::timeout(self.callback_timeout, callback).await;
        drop(pending);
        let code = match waited {
            Ok(Ok(outcome)) => outcome?,
            Ok(Err(_)) => return Err(AuthorizationError::new("Authorization was cancelled")),
            Err(_) => return Err(AuthorizationError::new("Authorization timed out")),
        };

        let verifier = use_pkce.then_some(pkce.code_verifier.as_str());
        let token = self
            .exchange_code(&configuration.token_endpoint, &request, &code, verifier)
            .await?;
        tracing::debug!(
            scope = token.scope.as_deref().unwrap_or(""),
            has_patient = token.patient.is_some(),
            "token issued"
        );

        Ok(Box::new(FhirRestSession::new(
            self.http.clone(),
            iss,
            token.access_token,
            token.patient,
        )))
    }
}

impl OAuthStateCache for SmartAuthorizer {
    /// Drop every pending authorization and the last published redirect.
    fn clear_cached_state(&self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.clear();
        }
        self.redirects.send_replace(None);
    }
}
