//! Inbound messages from the patient-context container.
//!
//! The container posts `{"smartOnFhirEvent": "<base64 JSON>"}` where the decoded JSON carries an
//! `appUrlToLoad`. Accepting one discards any cached OAuth state, so the next launch starts a
//! fresh handshake, and tells the caller where to navigate.

use crate::launch::decode_base64_text;
use crate::session::OAuthStateCache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::{Origin, Url};

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ContainerMessage {
    #[serde(rename = "smartOnFhirEvent", default, skip_serializing_if = "Option::is_none")]
    pub smart_on_fhir_event: Option<String>,
}

/// Decoded `smartOnFhirEvent` payload.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct AppLaunchRequest {
    #[serde(rename = "appUrlToLoad")]
    pub app_url_to_load: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Wrong origin or not a SMART event.
    Ignored,
    /// OAuth state was cleared; load this URL.
    Navigate(Url),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    #[error("smartOnFhirEvent is not valid base64")]
    Encoding,
    #[error("smartOnFhirEvent payload is malformed: {0}")]
    Payload(String),
    #[error("appUrlToLoad '{url}' is not a valid URL: {reason}")]
    InvalidUrl { url: String, reason: String },
}

pub struct ContainerMessageHandler {
    app_origin: Origin,
    app_base_url: Url,
    cache: Arc<dyn OAuthStateCache>,
}

impl ContainerMessageHandler {
    /// Messages are accepted only from the origin of `app_base_url`.
    pub fn new(app_base_url: Url, cache: Arc<dyn OAuthStateCache>) -> Self {
        Self {
            app_origin: app_base_url.origin(),
            app_base_url,
            cache,
        }
    }

    pub fn handle(&self, origin: &str, message: &ContainerMessage) -> Result<MessageOutcome, MessageError> {
        if !self.is_trusted(origin) {
            tracing::debug!(%origin, "ignoring message from foreign origin");
            return Ok(MessageOutcome::Ignored);
        }

        let Some(event) = message
            .smart_on_fhir_event
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
        else {
            return Ok(MessageOutcome::Ignored);
        };

        let json = decode_base64_text(event).ok_or(MessageError::Encoding)?;
        let request: AppLaunchRequest =
            serde_json::from_str(&json).map_err(|e| MessageError::Payload(e.to_string()))?;

        let target = self
            .app_base_url
            .join(request.app_url_to_load.trim())
            .map_err(|e| MessageError::InvalidUrl {
                url: request.app_url_to_load.clone(),
                reason: e.to_string(),
            })?;

        self.cache.clear_cached_state();
        tracing::info!(%target, "container requested app load; cleared cached OAuth state");
        Ok(MessageOutcome::Navigate(target))
    }

    fn is_trusted(&self, origin: &str) -> bool {
        Url::parse(origin)
            .map(|url| url.origin() == self.app_origin)
            .unwrap_or(false)
    }
}
