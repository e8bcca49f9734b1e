//! FHIR R4 `Patient` wire model.
//!
//! This module mirrors the subset of the `Patient` resource that the launch flow reads. Resources
//! come from a third-party FHIR server and are read leniently:
//! - unknown keys are ignored,
//! - every element is optional or defaults to empty,
//! - only `resourceType` is checked, and only when present.
//!
//! Responsibilities:
//! - Deserialize server JSON into [`PatientResource`], reporting the failing path on type errors
//! - Provide small accessors used by the normalizer

use crate::{FhirError, FhirResult};
use serde::{Deserialize, Serialize};

/// The subset of a FHIR `Patient` resource consumed by the launch flow.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PatientResource {
    #[serde(rename = "resourceType", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub name: Vec<HumanName>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifier: Vec<Identifier>,

    #[serde(rename = "birthDate", default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,

    #[serde(
        rename = "managingOrganization",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub managing_organization: Option<Reference>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<Extension>,
}

/// FHIR `HumanName`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct HumanName {
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub use_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub given: Vec<String>,
}

/// FHIR `Identifier`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Identifier {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_concept: Option<CodeableConcept>,
}

impl Identifier {
    /// Convenience constructor for a `system`/`value` pair.
    pub fn new(system: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            value: Some(value.into()),
            type_concept: None,
        }
    }

    /// The free-text label of the identifier type, if any.
    pub fn type_text(&self) -> Option<&str> {
        self.type_concept.as_ref().and_then(|t| t.text.as_deref())
    }
}

/// FHIR `CodeableConcept`, reduced to its text.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CodeableConcept {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// FHIR `Reference`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Reference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// FHIR `Extension`, reduced to the string-like value types.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Extension {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(rename = "valueString", default, skip_serializing_if = "Option::is_none")]
    pub value_string: Option<String>,

    #[serde(rename = "valueCode", default, skip_serializing_if = "Option::is_none")]
    pub value_code: Option<String>,
}

impl Extension {
    /// `valueString` if set, otherwise `valueCode`.
    pub fn string_value(&self) -> Option<&str> {
        self.value_string.as_deref().or(self.value_code.as_deref())
    }
}

impl PatientResource {
    /// Parse a patient resource from JSON text.
    ///
    /// This uses `serde_path_to_error` to surface the path (e.g. `name.0.given`) of the first
    /// element whose type does not match the model.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError`] if:
    /// - the text is not JSON,
    /// - an element has an unexpected type,
    /// - `resourceType` is present and is not `"Patient"`.
    pub fn parse(json_text: &str) -> FhirResult<Self> {
        let mut deserializer = serde_json::Deserializer::from_str(json_text);
        let resource: PatientResource = serde_path_to_error::deserialize(&mut deserializer)
            .map_err(|err| {
                let path = err.path().to_string();
                let source = err.into_inner();
                let path = if path.is_empty() || path == "." {
                    "<root>".to_string()
                } else {
                    path
                };
                FhirError::Translation(format!("Patient schema mismatch at {path}: {source}"))
            })?;

        resource.check_resource_type()?;
        Ok(resource)
    }

    /// Build a patient resource from an already-decoded JSON value.
    pub fn from_value(value: serde_json::Value) -> FhirResult<Self> {
        let resource: PatientResource = serde_json::from_value(value)?;
        resource.check_resource_type()?;
        Ok(resource)
    }

    /// The server-assigned resource id, or `""` when the server omitted it.
    pub fn resource_id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    fn check_resource_type(&self) -> FhirResult<()> {
        match self.resource_type.as_deref() {
            None | Some("Patient") => Ok(()),
            Some(other) => Err(FhirError::InvalidInput(format!(
                "Expected resourceType 'Patient', got '{other}'"
            ))),
        }
    }
}
