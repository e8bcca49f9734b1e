//! SMART launch context decoding.
//!
//! The launching clinical system passes an opaque `launch` query parameter: base64-encoded JSON
//! of the form `{"patient": "<ICN>", "sta3n": "<station>", "duz": "<user id>"}`. This module
//! decodes and validates it into a [`LaunchContext`].
//!
//! Decoding is forgiving in the way browsers' `atob` is: padding is optional, ASCII whitespace is
//! ignored, and the URL-safe alphabet is accepted as a fallback.

use crate::error::{DecodeError, LaunchField};
use assist_types::NonEmptyText;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

const FORGIVING_CONFIG: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_decode_padding_mode(DecodePaddingMode::Indifferent)
    .with_decode_allow_trailing_bits(true);

const FORGIVING_STANDARD: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, FORGIVING_CONFIG);
const FORGIVING_URL_SAFE: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, FORGIVING_CONFIG);

/// Validated launch context asserted by the launching system.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchContext {
    patient_identifier: NonEmptyText,
    station_id: NonEmptyText,
    user_id: NonEmptyText,
}

#[derive(Serialize)]
struct LaunchContextWire<'a> {
    patient: &'a str,
    sta3n: &'a str,
    duz: &'a str,
}

impl LaunchContext {
    pub fn new(
        patient_identifier: NonEmptyText,
        station_id: NonEmptyText,
        user_id: NonEmptyText,
    ) -> Self {
        Self {
            patient_identifier,
            station_id,
            user_id,
        }
    }

    /// Patient identifier, treated as the ICN.
    pub fn patient_identifier(&self) -> &str {
        self.patient_identifier.as_str()
    }

    /// Station (sta3n) of the launching site.
    pub fn station_id(&self) -> &str {
        self.station_id.as_str()
    }

    /// Site-specific user id (DUZ) of the launching clinician.
    pub fn user_id(&self) -> &str {
        self.user_id.as_str()
    }

    /// Encode as a `launch` parameter value (standard base64 of the JSON payload).
    pub fn encode(&self) -> String {
        let wire = LaunchContextWire {
            patient: self.patient_identifier(),
            sta3n: self.station_id(),
            duz: self.user_id(),
        };
        // Serializing three borrowed strings cannot fail.
        let json = serde_json::to_string(&wire).unwrap_or_default();
        STANDARD.encode(json)
    }
}

/// Decode and validate a raw `launch` parameter.
///
/// # Errors
///
/// - [`DecodeError::Encoding`] if the input is not base64 or does not decode to UTF-8
/// - [`DecodeError::Json`] if the decoded text is not a JSON object
/// - [`DecodeError::Schema`] naming the first missing field, checked as `patient`, `sta3n`, `duz`
pub fn decode(raw_launch: &str) -> Result<LaunchContext, DecodeError> {
    let text = decode_base64_text(raw_launch).ok_or(DecodeError::Encoding)?;

    let value: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| DecodeError::Json(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| DecodeError::Json("launch context is not a JSON object".into()))?;

    let field = |field: LaunchField| {
        object
            .get(field.wire_name())
            .and_then(serde_json::Value::as_str)
            .and_then(|s| NonEmptyText::new(s).ok())
            .ok_or(DecodeError::Schema(field))
    };

    Ok(LaunchContext {
        patient_identifier: field(LaunchField::Patient)?,
        station_id: field(LaunchField::Station)?,
        user_id: field(LaunchField::UserId)?,
    })
}

/// Forgiving base64 -> UTF-8 text. Returns `None` for anything that does not decode.
pub(crate) fn decode_base64_text(raw: &str) -> Option<String> {
    // Query-string decoding turns '+' into ' '.
    let cleaned: String = raw
        .trim()
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('+'),
            c if c.is_ascii_whitespace() => None,
            c => Some(c),
        })
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    let bytes = FORGIVING_STANDARD
        .decode(&cleaned)
        .or_else(|_| FORGIVING_URL_SAFE.decode(&cleaned))
        .ok()?;
    String::from_utf8(bytes).ok()
}

/// Launch-related query parameters of the page load. Blank values count as absent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct LaunchParams {
    #[serde(default)]
    pub launch: Option<String>,
    #[serde(default)]
    pub iss: Option<String>,
}

impl LaunchParams {
    pub fn new(launch: Option<String>, iss: Option<String>) -> Self {
        let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        Self {
            launch: present(launch),
            iss: present(iss),
        }
    }

    /// Extract `launch` and `iss` from a raw query string (without the leading `?`).
    pub fn from_query(query: &str) -> Self {
        let mut launch = None;
        let mut iss = None;
        for (key, value) in url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            match key.as_ref() {
                "launch" if launch.is_none() => launch = Some(value.into_owned()),
                "iss" if iss.is_none() => iss = Some(value.into_owned()),
                _ => {}
            }
        }
        Self::new(launch, iss)
    }

    /// Drop blank values, e.g. after deserializing from a request.
    pub fn normalized(self) -> Self {
        Self::new(self.launch, self.iss)
    }
}
