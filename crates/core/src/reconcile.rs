//! Identifier reconciliation.
//!
//! Merges the three sources of patient identity into one [`CanonicalPatient`]:
//!
//! | field | precedence |
//! | --- | --- |
//! | `icn` | launch patient, FHIR ICN (or MPI) identifier, FHIR resource id |
//! | `station_id` | launch station, user's first affiliation, station found in the resource, `"500"` |
//! | `user_facility_id` | launch user id, user's affiliation at the resolved station |
//!
//! Launch assertions come first because the launching clinical system is authoritative. Blank
//! strings are skipped at every step. The function is total: any combination of inputs yields a
//! record.

use crate::constants::DEFAULT_STATION_ID;
use crate::launch::LaunchContext;
use crate::user::AuthenticatedUser;
use assist_types::first_present;
use fhir::NormalizedPatient;
use serde::{Deserialize, Serialize};

/// The resolved patient context shared with the UI and sibling applications.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalPatient {
    /// Underlying FHIR resource id.
    pub resource_id: String,
    /// Primary cross-facility identifier.
    pub icn: String,
    /// Same as `resource_id`; kept for consumers that still key on it.
    pub legacy_id: String,
    pub station_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_facility_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mrn: Option<String>,
}

/// Reconcile launch context, normalized FHIR fields and the signed-in user.
pub fn reconcile(
    launch: Option<&LaunchContext>,
    normalized: &NormalizedPatient,
    fhir_resource_id: &str,
    auth_user: Option<&AuthenticatedUser>,
) -> CanonicalPatient {
    let resource_id = fhir_resource_id.trim().to_string();

    let icn = first_present([
        launch.map(LaunchContext::patient_identifier),
        normalized.icn.as_deref(),
    ])
    .map(String::from)
    .unwrap_or_else(|| resource_id.clone());

    let station_id = first_present([
        launch.map(LaunchContext::station_id),
        auth_user
            .and_then(AuthenticatedUser::first_affiliation)
            .map(|a| a.facility_id.as_str()),
        normalized.station_id.as_deref(),
    ])
    .map(String::from)
    .unwrap_or_else(|| DEFAULT_STATION_ID.to_string());

    let user_facility_id = first_present([
        launch.map(LaunchContext::user_id),
        auth_user
            .and_then(|user| user.affiliation_for(&station_id))
            .map(|a| a.user_facility_id.as_str()),
    ])
    .map(String::from);

    CanonicalPatient {
        legacy_id: resource_id.clone(),
        resource_id,
        icn,
        station_id,
        user_facility_id,
        first_name: normalized.first_name.clone(),
        last_name: normalized.last_name.clone(),
        date_of_birth: normalized.date_of_birth.clone(),
        ssn: normalized.ssn.clone(),
        mrn: normalized.mrn.clone(),
    }
}
