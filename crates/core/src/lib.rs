//! # AI Assist Core
//!
//! SMART-on-FHIR launch and patient-context resolution for the AI Assist dashboard.
//!
//! This crate contains the launch flow itself:
//! - decoding the opaque `launch` parameter into a [`LaunchContext`]
//! - reconciling launch, FHIR and signed-in-user identifiers into a [`CanonicalPatient`]
//! - the [`LaunchOrchestrator`] state machine and the [`PatientContextStore`] it publishes to
//! - runtime configuration and inbound container messages
//!
//! **No transport concerns**: OAuth, FHIR REST and the container bridge are reached through the
//! traits in [`session`] and [`user`]; HTTP implementations live in `smart-client` and the web
//! surface in `api-rest`.

pub mod config;
pub mod constants;
pub mod error;
pub mod launch;
pub mod message;
pub mod orchestrator;
pub mod reconcile;
pub mod session;
pub mod store;
pub mod user;

pub use assist_types::NonEmptyText;
pub use config::{AssistConfig, ConfigError, ConfigSources, FeatureFlags, PkceMode, RuntimeMode};
pub use error::{
    AuthorizationError, BridgeError, DecodeError, FetchError, LaunchError, LaunchField, UserError,
};
pub use launch::{decode, LaunchContext, LaunchParams};
pub use message::{ContainerMessage, ContainerMessageHandler, MessageError, MessageOutcome};
pub use orchestrator::{wait_until_settled, LaunchOrchestrator, LaunchState, LaunchStatus};
pub use reconcile::{reconcile, CanonicalPatient};
pub use session::{AuthorizationRequest, ContextBridge, FhirAuthorizer, FhirSession, OAuthStateCache};
pub use store::{PatientContextStore, PatientSnapshot};
pub use user::{AuthenticatedUser, CachedUserDirectory, FacilityAffiliation, UserDirectory};
