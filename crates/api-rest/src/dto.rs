//! Request and response bodies of the REST surface.

use assist_core::{CanonicalPatient, ContainerMessage, LaunchParams, LaunchStatus, MessageOutcome};
use serde::{Deserialize, Serialize};
use smart_client::CallbackParams;
use utoipa::{IntoParams, ToSchema};

/// Query parameters of a SMART EHR launch.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LaunchQuery {
    /// Base64 launch context from the EHR.
    pub launch: Option<String>,
    /// FHIR server base URL.
    pub iss: Option<String>,
}

impl From<LaunchQuery> for LaunchParams {
    fn from(query: LaunchQuery) -> Self {
        LaunchParams::new(query.launch, query.iss)
    }
}

/// Query parameters of the OAuth redirect back to the app.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CallbackQuery {
    /// Authorization code.
    pub code: Option<String>,
    /// OAuth state issued with the authorize request.
    pub state: Option<String>,
    /// OAuth error code.
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl From<CallbackQuery> for CallbackParams {
    fn from(query: CallbackQuery) -> Self {
        CallbackParams {
            code: query.code,
            state: query.state,
            error: query.error,
            error_description: query.error_description,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub error: String,
}

/// Resolved patient context, as shared with the dashboard and sibling apps.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PatientContextRes {
    pub resource_id: String,
    pub icn: String,
    pub legacy_id: String,
    pub station_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_facility_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mrn: Option<String>,
}

impl From<&CanonicalPatient> for PatientContextRes {
    fn from(patient: &CanonicalPatient) -> Self {
        Self {
            resource_id: patient.resource_id.clone(),
            icn: patient.icn.clone(),
            legacy_id: patient.legacy_id.clone(),
            station_id: patient.station_id.clone(),
            user_facility_id: patient.user_facility_id.clone(),
            first_name: patient.first_name.clone(),
            last_name: patient.last_name.clone(),
            date_of_birth: patient.date_of_birth.clone(),
            ssn: patient.ssn.clone(),
            mrn: patient.mrn.clone(),
        }
    }
}

/// Launch status for the UI shell.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusRes {
    /// One of `idle`, `decoding`, `authorizing`, `fetchingPatient`, `reconciling`, `ready`,
    /// `errored`.
    pub state: String,
    pub loading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient: Option<PatientContextRes>,
}

impl From<&LaunchStatus> for StatusRes {
    fn from(status: &LaunchStatus) -> Self {
        Self {
            state: status.state.as_str().to_string(),
            loading: status.is_loading(),
            error: status.error.clone(),
            patient: status.patient.as_deref().map(PatientContextRes::from),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ContainerMessageReq {
    /// Base64-encoded JSON `{ "appUrlToLoad": "..." }`.
    #[serde(rename = "smartOnFhirEvent", default)]
    pub smart_on_fhir_event: Option<String>,
}

impl From<ContainerMessageReq> for ContainerMessage {
    fn from(req: ContainerMessageReq) -> Self {
        ContainerMessage {
            smart_on_fhir_event: req.smart_on_fhir_event,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageRes {
    /// `ignored` or `navigate`.
    pub outcome: String,
    #[serde(rename = "appUrlToLoad", skip_serializing_if = "Option::is_none")]
    pub app_url_to_load: Option<String>,
}

impl From<MessageOutcome> for MessageRes {
    fn from(outcome: MessageOutcome) -> Self {
        match outcome {
            MessageOutcome::Ignored => Self {
                outcome: "ignored".into(),
                app_url_to_load: None,
            },
            MessageOutcome::Navigate(url) => Self {
                outcome: "navigate".into(),
                app_url_to_load: Some(url.to_string()),
            },
        }
    }
}
