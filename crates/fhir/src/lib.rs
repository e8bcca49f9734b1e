//! FHIR boundary support for the AI Assist launch flow.
//!
//! This crate provides:
//! - a lenient wire model for the FHIR R4 `Patient` resource as returned by a FHIR server
//! - the patient normalizer, which extracts names, identifiers and station hints
//!
//! It knows nothing about SMART launch, OAuth or reconciliation; those live in `assist-core`.

pub mod normalize;
pub mod patient;

pub use normalize::{normalize, IdentifierCategory, IdentifierMatcher, NormalizedPatient};
pub use patient::{CodeableConcept, Extension, HumanName, Identifier, PatientResource, Reference};

/// Errors returned by the `fhir` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum FhirError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("translation error: {0}")]
    Translation(String),
}

/// Type alias for Results that can fail with a [`FhirError`].
pub type FhirResult<T> = Result<T, FhirError>;
