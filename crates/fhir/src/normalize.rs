//! Patient resource normalization.
//!
//! Turns a raw [`PatientResource`] into the flat, best-effort [`NormalizedPatient`] that identifier
//! reconciliation works from. Nothing here fails: every field that cannot be found is left empty
//! or `None`.
//!
//! Identifier categories are driven by [`IDENTIFIER_MATCHERS`]; supporting a new identifier system
//! means adding a row there, not another branch.

use crate::patient::{Extension, Identifier, PatientResource, Reference};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Leading three digits of an MPI-style value, e.g. `6050242829V596118` -> `605`.
static STATION_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]{3})").expect("station prefix pattern is valid"));

/// A standalone three-digit token, e.g. `Site #530` or `Station 500`.
static STATION_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([0-9]{3})\b").expect("station token pattern is valid"));

/// Semantic category of a patient identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdentifierCategory {
    /// Integration Control Number.
    Icn,
    /// Medical record number.
    Mrn,
    /// Social security number.
    Ssn,
    /// Master Patient Index identifier; its value leads with the station number.
    Mpi,
}

/// Predicate deciding whether an identifier belongs to a category.
#[derive(Clone, Copy, Debug)]
pub struct IdentifierMatcher {
    pub category: IdentifierCategory,
    needle: &'static str,
    match_type_text: bool,
}

impl IdentifierMatcher {
    /// Matches on `system` only.
    pub const fn system(category: IdentifierCategory, needle: &'static str) -> Self {
        Self {
            category,
            needle,
            match_type_text: false,
        }
    }

    /// Matches on `system` or `type.text`.
    pub const fn system_or_type(category: IdentifierCategory, needle: &'static str) -> Self {
        Self {
            category,
            needle,
            match_type_text: true,
        }
    }

    /// Case-insensitive substring match. `needle` must be lowercase.
    pub fn matches(&self, identifier: &Identifier) -> bool {
        let contains = |text: Option<&str>| {
            text.is_some_and(|t| t.to_ascii_lowercase().contains(self.needle))
        };
        contains(identifier.system.as_deref())
            || (self.match_type_text && contains(identifier.type_text()))
    }
}

/// Category -> matcher table. A category may have several rows; an identifier belongs to the
/// category if any row matches. Within a category the first matching identifier wins.
pub const IDENTIFIER_MATCHERS: &[IdentifierMatcher] = &[
    IdentifierMatcher::system_or_type(IdentifierCategory::Icn, "icn"),
    IdentifierMatcher::system_or_type(IdentifierCategory::Mrn, "mrn"),
    IdentifierMatcher::system_or_type(IdentifierCategory::Ssn, "ssn"),
    IdentifierMatcher::system(IdentifierCategory::Mpi, "mpi"),
];

/// Best-effort patient fields extracted from a FHIR resource.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedPatient {
    /// Space-joined given names of the first name entry, upper-cased.
    pub first_name: String,
    /// Family name of the first name entry, upper-cased.
    pub last_name: String,
    pub icn: Option<String>,
    pub mrn: Option<String>,
    pub ssn: Option<String>,
    pub date_of_birth: Option<String>,
    /// Station hint found in the resource, if any.
    pub station_id: Option<String>,
}

/// Normalize a FHIR `Patient` resource.
pub fn normalize(patient: &PatientResource) -> NormalizedPatient {
    let (first_name, last_name) = patient_name(patient);

    let icn = identifier_value(&patient.identifier, IdentifierCategory::Icn)
        .or_else(|| identifier_value(&patient.identifier, IdentifierCategory::Mpi));

    NormalizedPatient {
        first_name,
        last_name,
        icn,
        mrn: identifier_value(&patient.identifier, IdentifierCategory::Mrn),
        ssn: identifier_value(&patient.identifier, IdentifierCategory::Ssn),
        date_of_birth: patient.birth_date.clone().filter(|d| !d.trim().is_empty()),
        station_id: station_from_patient(patient),
    }
}

fn patient_name(patient: &PatientResource) -> (String, String) {
    let Some(name) = patient.name.first() else {
        return (String::new(), String::new());
    };
    let first = name.given.join(" ").to_uppercase();
    let last = name.family.as_deref().unwrap_or_default().to_uppercase();
    (first, last)
}

/// First non-empty value among identifiers matching `category`.
pub fn identifier_value(identifiers: &[Identifier], category: IdentifierCategory) -> Option<String> {
    let matchers: Vec<&IdentifierMatcher> = IDENTIFIER_MATCHERS
        .iter()
        .filter(|m| m.category == category)
        .collect();

    identifiers
        .iter()
        .filter(|id| matchers.iter().any(|m| m.matches(id)))
        .find_map(|id| id.value.as_deref().map(str::trim).filter(|v| !v.is_empty()))
        .map(str::to_string)
}

/// Station hint, first hit wins: MPI identifier prefix, organization display, facility extension.
pub fn station_from_patient(patient: &PatientResource) -> Option<String> {
    station_from_identifiers(&patient.identifier)
        .or_else(|| station_from_organization(patient.managing_organization.as_ref()))
        .or_else(|| station_from_extensions(&patient.extension))
}

fn station_from_identifiers(identifiers: &[Identifier]) -> Option<String> {
    let mpi = IDENTIFIER_MATCHERS
        .iter()
        .filter(|m| m.category == IdentifierCategory::Mpi);

    identifiers
        .iter()
        .filter(|id| mpi.clone().any(|m| m.matches(id)))
        .filter_map(|id| id.value.as_deref())
        .find_map(|value| capture(&STATION_PREFIX, value))
}

fn station_from_organization(organization: Option<&Reference>) -> Option<String> {
    organization
        .and_then(|org| org.display.as_deref())
        .and_then(|display| capture(&STATION_TOKEN, display))
}

fn station_from_extensions(extensions: &[Extension]) -> Option<String> {
    extensions
        .iter()
        .filter(|ext| {
            ext.url
                .as_deref()
                .is_some_and(|url| url.contains("facility") || url.contains("station"))
        })
        .filter_map(Extension::string_value)
        .find_map(|value| capture(&STATION_TOKEN, value))
}

fn capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}
