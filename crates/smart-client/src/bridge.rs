//! Outbound bridge to the patient-context container.

use crate::as_base;
use assist_core::{BridgeError, CanonicalPatient, ContextBridge};
use async_trait::async_trait;
use url::Url;

/// Path, relative to the container base URL, that receives patient updates.
pub const PATIENT_PATH: &str = "patient";

/// POSTs the resolved patient as JSON to `<SMART_CONTAINER_URL>/patient`.
pub struct HttpContextBridge {
    http: reqwest::Client,
    endpoint: Url,
}

impl HttpContextBridge {
    pub fn new(http: reqwest::Client, container_url: &Url) -> Result<Self, url::ParseError> {
        Ok(Self {
            http,
            endpoint: as_base(container_url).join(PATIENT_PATH)?,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl ContextBridge for HttpContextBridge {
    async fn update_patient(&self, patient: &CanonicalPatient) -> Result<(), BridgeError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(patient)
            .send()
            .await
            .map_err(|e| BridgeError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError(format!(
                "{} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )));
        }
        tracing::debug!(icn = %patient.icn, "patient context sent to container");
        Ok(())
    }
}
