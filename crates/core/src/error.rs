//! Error taxonomy for the launch flow.
//!
//! Every error here ends up as a single human-readable line on the orchestrator status, so the
//! `Display` output is part of the contract.

/// Launch-context field, in validation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LaunchField {
    Patient,
    Station,
    UserId,
}

impl LaunchField {
    /// Key used in the launch JSON payload.
    pub fn wire_name(self) -> &'static str {
        match self {
            LaunchField::Patient => "patient",
            LaunchField::Station => "sta3n",
            LaunchField::UserId => "duz",
        }
    }
}

impl std::fmt::Display for LaunchField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("not valid base64")]
    Encoding,
    #[error("malformed JSON: {0}")]
    Json(String),
    #[error("missing or invalid {0}")]
    Schema(LaunchField),
}

/// Failure reported by the authorization collaborator. The message is surfaced unmodified.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct AuthorizationError(pub String);

impl AuthorizationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Patient not found in FHIR server")]
    NotFound,
    #[error("FHIR API error: {status} {status_text}")]
    Api { status: u16, status_text: String },
    #[error("Failed to fetch patient: {0}")]
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("context bridge update failed: {0}")]
pub struct BridgeError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to fetch current user: {0}")]
pub struct UserError(pub String);

/// Any failure that stops an orchestration run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LaunchError {
    #[error("Invalid launch parameter: {0}")]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}
