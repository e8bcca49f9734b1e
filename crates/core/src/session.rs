//! Capability interfaces for the external collaborators.
//!
//! The launch core does not speak OAuth, FHIR REST or the container protocol itself. It drives
//! them through these traits; `smart-client` provides the HTTP implementations and tests provide
//! in-memory fakes.

use crate::config::{AssistConfig, PkceMode};
use crate::error::{AuthorizationError, BridgeError, FetchError};
use crate::reconcile::CanonicalPatient;
use async_trait::async_trait;
use fhir::PatientResource;
use url::Url;

/// Everything the authorization client needs to run one SMART handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub client_id: String,
    pub scope: String,
    pub redirect_uri: Url,
    pub pkce_mode: PkceMode,
    /// FHIR server base URL (the `iss` launch parameter).
    pub iss: String,
    /// Raw `launch` parameter, echoed back to the authorization server.
    pub launch: String,
}

impl AuthorizationRequest {
    pub fn from_config(config: &AssistConfig, iss: &str, launch: &str) -> Self {
        Self {
            client_id: config.client_id().to_string(),
            scope: config.scope().to_string(),
            redirect_uri: config.redirect_uri().clone(),
            pkce_mode: config.pkce_mode(),
            iss: iss.to_string(),
            launch: launch.to_string(),
        }
    }
}

/// OAuth2 / SMART authorization client.
#[async_trait]
pub trait FhirAuthorizer: Send + Sync {
    /// Run the handshake to completion and return an authorized FHIR session.
    async fn authorize(
        &self,
        request: AuthorizationRequest,
    ) -> Result<Box<dyn FhirSession>, AuthorizationError>;
}

/// An authorized connection to the FHIR server, scoped to the launch patient.
#[async_trait]
pub trait FhirSession: Send + Sync {
    /// Read the in-context `Patient` resource.
    async fn read_patient(&self) -> Result<PatientResource, FetchError>;
}

/// Outbound bridge to the cross-application patient-context container.
#[async_trait]
pub trait ContextBridge: Send + Sync {
    async fn update_patient(&self, patient: &CanonicalPatient) -> Result<(), BridgeError>;
}

/// Holder of cached OAuth state that can be discarded on demand.
pub trait OAuthStateCache: Send + Sync {
    fn clear_cached_state(&self);
}
