//! Authorized FHIR REST session.

use crate::as_base;
use assist_core::{FetchError, FhirSession};
use async_trait::async_trait;
use fhir::PatientResource;
use reqwest::StatusCode;
use url::Url;

pub const FHIR_JSON: &str = "application/fhir+json";

/// Bearer-token session against one FHIR server, scoped to the token's `patient` claim.
pub struct FhirRestSession {
    http: reqwest::Client,
    server_url: Url,
    access_token: String,
    patient_id: Option<String>,
}

impl FhirRestSession {
    pub fn new(
        http: reqwest::Client,
        server_url: Url,
        access_token: impl Into<String>,
        patient_id: Option<String>,
    ) -> Self {
        Self {
            http,
            server_url: as_base(&server_url),
            access_token: access_token.into(),
            patient_id: patient_id.filter(|id| !id.trim().is_empty()),
        }
    }

    pub fn patient_id(&self) -> Option<&str> {
        self.patient_id.as_deref()
    }

    /// `<server>/Patient/<id>`, with the id percent-encoded as a single path segment.
    pub fn patient_url(&self, id: &str) -> Result<Url, FetchError> {
        let mut url = self.server_url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::Unknown(format!("Invalid FHIR server URL: {}", self.server_url)))?
            .pop_if_empty()
            .push("Patient")
            .push(id);
        Ok(url)
    }
}

#[async_trait]
impl FhirSession for FhirRestSession {
    async fn read_patient(&self) -> Result<PatientResource, FetchError> {
        let id = self
            .patient_id
            .as_deref()
            .ok_or_else(|| FetchError::Unknown("Patient is not available".into()))?;
        let url = self.patient_url(id)?;

        tracing::debug!(%url, "reading patient");
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .header(reqwest::header::ACCEPT, FHIR_JSON)
            .send()
            .await
            .map_err(|e| FetchError::Unknown(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error_for_status(status));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Unknown(e.to_string()))?;
        PatientResource::parse(&body).map_err(|e| FetchError::Unknown(e.to_string()))
    }
}

/// 404 is "not found"; any other non-success status is an API error with its reason phrase.
pub fn fetch_error_for_status(status: StatusCode) -> FetchError {
    match status {
        StatusCode::NOT_FOUND => FetchError::NotFound,
        other => FetchError::Api {
            status: other.as_u16(),
            status_text: other.canonical_reason().unwrap_or_default().to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeEhr, ACCESS_TOKEN, PATIENT_ID};

    fn session(server: &str, patient: Option<&str>) -> FhirRestSession {
        FhirRestSession::new(
            reqwest::Client::new(),
            Url::parse(server).expect("server url"),
            "token",
            patient.map(String::from),
        )
    }

    #[test]
    fn maps_statuses_to_fetch_errors() {
        assert_eq!(fetch_error_for_status(StatusCode::NOT_FOUND), FetchError::NotFound);
        assert_eq!(
            fetch_error_for_status(StatusCode::INTERNAL_SERVER_ERROR).to_string(),
            "FHIR API error: 500 Internal Server Error"
        );
        assert_eq!(
            fetch_error_for_status(StatusCode::UNAUTHORIZED),
            FetchError::Api {
                status: 401,
                status_text: "Unauthorized".into()
            }
        );
    }

    #[test]
    fn builds_patient_url_under_server_base() {
        let s = session("https://api.example.com/services/fhir/v0/r4", Some("1234567890V123456"));
        assert_eq!(
            s.patient_url("1234567890V123456").expect("url").as_str(),
            "https://api.example.com/services/fhir/v0/r4/Patient/1234567890V123456"
        );
        assert_eq!(
            s.patient_url("a/b").expect("url").as_str(),
            "https://api.example.com/services/fhir/v0/r4/Patient/a%2Fb"
        );
    }

    #[tokio::test]
    async fn missing_patient_claim_fails_without_network() {
        let s = session("https://fhir.example.com/r4/", Some("  "));
        assert_eq!(s.patient_id(), None);
        let err = s.read_patient().await.expect_err("no patient claim");
        assert_eq!(err.to_string(), "Failed to fetch patient: Patient is not available");
    }

    fn live_session(ehr: &FakeEhr, token: &str, patient: &str) -> FhirRestSession {
        FhirRestSession::new(
            crate::http_client().expect("client"),
            ehr.iss(),
            token,
            Some(patient.to_string()),
        )
    }

    #[tokio::test]
    async fn reads_patient_with_bearer_token() {
        let ehr = FakeEhr::start().await.expect("fake EHR");
        let patient = live_session(&ehr, ACCESS_TOKEN, PATIENT_ID)
            .read_patient()
            .await
            .expect("patient read");

        assert_eq!(patient.resource_id(), PATIENT_ID);
        let normalized = fhir::normalize(&patient);
        assert_eq!(normalized.first_name, "JOHN QUINCY");
        assert_eq!(normalized.last_name, "VETERAN");
        assert_eq!(ehr.patient_reads(), 1);
    }

    #[tokio::test]
    async fn unknown_patient_is_not_found() {
        let ehr = FakeEhr::start().await.expect("fake EHR");
        let err = live_session(&ehr, ACCESS_TOKEN, "0000000000V000000")
            .read_patient()
            .await
            .expect_err("unknown patient");
        assert_eq!(err, FetchError::NotFound);
        assert_eq!(
            assist_core::LaunchError::from(err).to_string(),
            "Patient not found in FHIR server"
        );
    }

    #[tokio::test]
    async fn rejected_token_is_an_api_error() {
        let ehr = FakeEhr::start().await.expect("fake EHR");
        let err = live_session(&ehr, "expired-token", PATIENT_ID)
            .read_patient()
            .await
            .expect_err("rejected token");
        assert_eq!(err.to_string(), "FHIR API error: 401 Unauthorized");
    }
}
