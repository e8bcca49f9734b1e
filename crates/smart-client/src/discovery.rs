//! SMART App Launch discovery (`<iss>/.well-known/smart-configuration`).

use crate::as_base;
use crate::pkce::CHALLENGE_METHOD;
use assist_core::{AuthorizationError, PkceMode};
use serde::Deserialize;
use url::Url;

pub const WELL_KNOWN_PATH: &str = ".well-known/smart-configuration";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SmartConfiguration {
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    #[serde(default)]
    pub code_challenge_methods_supported: Vec<String>,
}

impl SmartConfiguration {
    pub fn supports_s256(&self) -> bool {
        self.code_challenge_methods_supported
            .iter()
            .any(|m| m == CHALLENGE_METHOD)
    }

    /// Whether this authorization should carry a code challenge.
    pub fn use_pkce(&self, mode: PkceMode) -> Result<bool, AuthorizationError> {
        match mode {
            PkceMode::Disabled => Ok(false),
            PkceMode::IfSupported => Ok(self.supports_s256()),
            PkceMode::Required if self.supports_s256() => Ok(true),
            PkceMode::Required => Err(AuthorizationError::new(
                "PKCE required but not supported by server",
            )),
            PkceMode::UnsafeV1 => Ok(true),
        }
    }

    pub async fn fetch(http: &reqwest::Client, iss: &Url) -> Result<Self, AuthorizationError> {
        let url = as_base(iss)
            .join(WELL_KNOWN_PATH)
            .map_err(|e| AuthorizationError::new(format!("Invalid iss '{iss}': {e}")))?;

        tracing::debug!(%url, "fetching SMART configuration");
        let response = http
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                AuthorizationError::new(format!("Failed to fetch SMART configuration: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthorizationError::new(format!(
                "Failed to fetch SMART configuration: {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )));
        }

        response.json().await.map_err(|e| {
            AuthorizationError::new(format!("Invalid SMART configuration at {url}: {e}"))
        })
    }
}
