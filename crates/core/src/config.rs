//! Runtime configuration.
//!
//! Configuration is resolved once at process startup into an [`AssistConfig`] and then injected
//! into the orchestrator and collaborators. Nothing reads the environment after startup.
//!
//! Each key is looked up in layers, highest precedence first:
//! 1. the injected runtime config (a flat JSON object, the deployment-time equivalent of a
//!    `window.env` script),
//! 2. the process environment,
//! 3. built-in defaults.
//!
//! Empty values count as unset at every layer.

use crate::constants::{
    DEFAULT_APP_BASE_URL, DEFAULT_HOST_ENV, DEFAULT_PKCE_MODE, DEFAULT_REDIRECT_URI,
};
use std::collections::HashMap;
use std::path::Path;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("failed to read runtime config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("runtime config file is not a JSON object of settings: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Whether launch failures block the UI (production) or degrade to local mode (development).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeMode {
    Development,
    Production,
}

impl std::str::FromStr for RuntimeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(RuntimeMode::Development),
            "production" | "prod" => Ok(RuntimeMode::Production),
            other => Err(format!("expected development or production, got '{other}'")),
        }
    }
}

/// PKCE behaviour requested from the authorization client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkceMode {
    /// Use S256 when the server advertises it.
    IfSupported,
    /// Fail authorization unless the server advertises S256.
    Required,
    /// Never send a code challenge.
    Disabled,
    /// Always send an S256 challenge, advertised or not.
    UnsafeV1,
}

impl PkceMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PkceMode::IfSupported => "ifSupported",
            PkceMode::Required => "required",
            PkceMode::Disabled => "disabled",
            PkceMode::UnsafeV1 => "unsafeV1",
        }
    }
}

impl std::str::FromStr for PkceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ifSupported" => Ok(PkceMode::IfSupported),
            "required" => Ok(PkceMode::Required),
            "disabled" => Ok(PkceMode::Disabled),
            "unsafeV1" => Ok(PkceMode::UnsafeV1),
            other => Err(format!(
                "expected one of ifSupported, required, disabled, unsafeV1, got '{other}'"
            )),
        }
    }
}

impl std::fmt::Display for PkceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Feature switches. Unknown flags in the source object are ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Enables the whole SMART launch flow.
    pub fhir_auth: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self { fhir_auth: true }
    }
}

/// Raw key/value layers that configuration is resolved from.
#[derive(Clone, Debug, Default)]
pub struct ConfigSources {
    injected: HashMap<String, String>,
    environment: HashMap<String, String>,
}

impl ConfigSources {
    pub fn new(injected: HashMap<String, String>, environment: HashMap<String, String>) -> Self {
        Self {
            injected,
            environment,
        }
    }

    /// Snapshot the process environment, with no injected layer.
    pub fn from_process_env() -> Self {
        Self::new(HashMap::new(), std::env::vars().collect())
    }

    /// Replace the injected layer with the settings in a JSON file.
    ///
    /// The file holds a flat object; string values are taken as-is and any other JSON value
    /// (for example the `FEATURE_FLAGS` object) is kept in its JSON text form.
    pub fn with_injected_file(mut self, path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&text)?;
        self.injected = object
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (key, value)
            })
            .collect();
        Ok(self)
    }

    fn lookup(&self, key: &str) -> Option<&str> {
        fn present<'a>(layer: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
            layer
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        }
        present(&self.injected, key).or_else(|| present(&self.environment, key))
    }
}

/// Configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct AssistConfig {
    host_env: String,
    runtime_mode: RuntimeMode,
    client_id: String,
    scope: String,
    redirect_uri: Url,
    pkce_mode: PkceMode,
    default_iss: Option<Url>,
    smart_container_url: Url,
    feature_flags: FeatureFlags,
    app_base_url: Url,
    api_url: Option<Url>,
}

impl AssistConfig {
    /// Resolve configuration from the given layers.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] for an unset required key (`AUTH_CLIENT_ID`,
    /// `AUTH_SCOPES`, `SMART_CONTAINER_URL`) and [`ConfigError::Invalid`] for values that do not
    /// parse.
    pub fn resolve(sources: &ConfigSources) -> ConfigResult<Self> {
        let required = |key: &'static str| {
            sources
                .lookup(key)
                .map(str::to_string)
                .ok_or(ConfigError::Missing(key))
        };

        let runtime_mode = match sources.lookup("RUNTIME_MODE") {
            Some(v) => v.parse().map_err(|reason| ConfigError::Invalid {
                key: "RUNTIME_MODE",
                reason,
            })?,
            None => RuntimeMode::Production,
        };

        let pkce_mode = sources
            .lookup("AUTH_PKCE_MODE")
            .unwrap_or(DEFAULT_PKCE_MODE)
            .parse()
            .map_err(|reason| ConfigError::Invalid {
                key: "AUTH_PKCE_MODE",
                reason,
            })?;

        let app_base_url = parse_url(
            "APP_BASE_URL",
            sources.lookup("APP_BASE_URL").unwrap_or(DEFAULT_APP_BASE_URL),
        )?;

        // A relative redirect URI is resolved against the app base, as a browser would.
        let redirect_raw = sources
            .lookup("AUTH_REDIRECT_URI")
            .unwrap_or(DEFAULT_REDIRECT_URI);
        let redirect_uri = app_base_url
            .join(redirect_raw)
            .map_err(|e| ConfigError::Invalid {
                key: "AUTH_REDIRECT_URI",
                reason: e.to_string(),
            })?;

        let default_iss = sources
            .lookup("AUTH_ISS")
            .map(|v| parse_url("AUTH_ISS", v))
            .transpose()?;

        let smart_container_url = parse_url("SMART_CONTAINER_URL", &required("SMART_CONTAINER_URL")?)?;

        let api_url = sources
            .lookup("API_URL")
            .map(|v| parse_url("API_URL", v))
            .transpose()?;

        let feature_flags = match sources.lookup("FEATURE_FLAGS") {
            Some(raw) => parse_feature_flags(raw)?,
            None => FeatureFlags::default(),
        };

        Ok(Self {
            host_env: sources
                .lookup("HOST_ENV")
                .unwrap_or(DEFAULT_HOST_ENV)
                .to_string(),
            runtime_mode,
            client_id: required("AUTH_CLIENT_ID")?,
            scope: required("AUTH_SCOPES")?,
            redirect_uri,
            pkce_mode,
            default_iss,
            smart_container_url,
            feature_flags,
            app_base_url,
            api_url,
        })
    }

    pub fn host_env(&self) -> &str {
        &self.host_env
    }

    pub fn runtime_mode(&self) -> RuntimeMode {
        self.runtime_mode
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Absolute redirect URI registered with the authorization server.
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    pub fn pkce_mode(&self) -> PkceMode {
        self.pkce_mode
    }

    /// Issuer used when a caller needs one and none was supplied (e.g. to build test launches).
    pub fn default_iss(&self) -> Option<&Url> {
        self.default_iss.as_ref()
    }

    /// EHR-style launch URL for this app: `<app base>/launch?launch=..&iss=..`.
    ///
    /// `iss` falls back to [`AssistConfig::default_iss`]; `None` when neither is available.
    pub fn launch_url(&self, launch: &str, iss: Option<&str>) -> Option<Url> {
        let iss = iss
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .or_else(|| self.default_iss.as_ref().map(Url::as_str))?;
        let mut url = self.app_base_url.join("launch").ok()?;
        url.query_pairs_mut()
            .append_pair("launch", launch)
            .append_pair("iss", iss);
        Some(url)
    }

    pub fn smart_container_url(&self) -> &Url {
        &self.smart_container_url
    }

    pub fn feature_flags(&self) -> FeatureFlags {
        self.feature_flags
    }

    pub fn app_base_url(&self) -> &Url {
        &self.app_base_url
    }

    /// Origin that inbound container messages must come from.
    pub fn app_origin(&self) -> url::Origin {
        self.app_base_url.origin()
    }

    /// Backend base URL serving `/api/me`, if configured.
    pub fn api_url(&self) -> Option<&Url> {
        self.api_url.as_ref()
    }
}

fn parse_url(key: &'static str, value: &str) -> ConfigResult<Url> {
    Url::parse(value).map_err(|e| ConfigError::Invalid {
        key,
        reason: format!("'{value}' is not an absolute URL: {e}"),
    })
}

fn parse_feature_flags(raw: &str) -> ConfigResult<FeatureFlags> {
    let invalid = |reason: String| ConfigError::Invalid {
        key: "FEATURE_FLAGS",
        reason,
    };
    let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| invalid(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| invalid("expected a JSON object".into()))?;

    let mut flags = FeatureFlags::default();
    if let Some(v) = object.get("fhirAuth") {
        flags.fhir_auth = v
            .as_bool()
            .ok_or_else(|| invalid("fhirAuth must be a boolean".into()))?;
    }
    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn minimal_env() -> HashMap<String, String> {
        env(&[
            ("AUTH_CLIENT_ID", "test-client-id"),
            ("AUTH_SCOPES", "patient/*.read launch"),
            ("SMART_CONTAINER_URL", "https://dev.cds.example.com/smart-container/"),
        ])
    }

    #[test]
    fn applies_defaults_for_optional_settings() {
        let cfg = AssistConfig::resolve(&ConfigSources::new(HashMap::new(), minimal_env()))
            .expect("minimal config resolves");

        assert_eq!(cfg.host_env(), "dev");
        assert_eq!(cfg.runtime_mode(), RuntimeMode::Production);
        assert_eq!(cfg.pkce_mode(), PkceMode::UnsafeV1);
        assert_eq!(cfg.redirect_uri().as_str(), "http://localhost:3000/index.html");
        assert!(cfg.default_iss().is_none());
        assert!(cfg.api_url().is_none());
        assert!(cfg.feature_flags().fhir_auth);
    }

    #[test]
    fn injected_layer_wins_over_environment() {
        let injected = env(&[
            ("AUTH_CLIENT_ID", "Lighthouse_NP"),
            ("AUTH_PKCE_MODE", "required"),
            ("AUTH_REDIRECT_URI", "https://app.example.com/callback"),
        ]);
        let mut environment = minimal_env();
        environment.insert("AUTH_PKCE_MODE".into(), "disabled".into());

        let cfg = AssistConfig::resolve(&ConfigSources::new(injected, environment))
            .expect("config resolves");
        assert_eq!(cfg.client_id(), "Lighthouse_NP");
        assert_eq!(cfg.pkce_mode(), PkceMode::Required);
        assert_eq!(cfg.redirect_uri().as_str(), "https://app.example.com/callback");
        assert_eq!(cfg.scope(), "patient/*.read launch");
    }

    #[test]
    fn empty_injected_value_falls_through() {
        let injected = env(&[("AUTH_CLIENT_ID", "")]);
        let cfg = AssistConfig::resolve(&ConfigSources::new(injected, minimal_env()))
            .expect("config resolves");
        assert_eq!(cfg.client_id(), "test-client-id");
    }

    #[test]
    fn missing_client_id_is_an_error() {
        let mut environment = minimal_env();
        environment.remove("AUTH_CLIENT_ID");
        let err = AssistConfig::resolve(&ConfigSources::new(HashMap::new(), environment))
            .expect_err("client id is required");
        assert!(matches!(err, ConfigError::Missing("AUTH_CLIENT_ID")));
    }

    #[test]
    fn rejects_unknown_pkce_mode_and_runtime_mode() {
        let mut environment = minimal_env();
        environment.insert("AUTH_PKCE_MODE".into(), "S256".into());
        let err = AssistConfig::resolve(&ConfigSources::new(HashMap::new(), environment))
            .expect_err("bad pkce mode");
        assert!(matches!(err, ConfigError::Invalid { key: "AUTH_PKCE_MODE", .. }));

        let mut environment = minimal_env();
        environment.insert("RUNTIME_MODE".into(), "staging".into());
        let err = AssistConfig::resolve(&ConfigSources::new(HashMap::new(), environment))
            .expect_err("bad runtime mode");
        assert!(matches!(err, ConfigError::Invalid { key: "RUNTIME_MODE", .. }));
    }

    #[test]
    fn parses_feature_flags_object() {
        let mut environment = minimal_env();
        environment.insert("FEATURE_FLAGS".into(), r#"{"fhirAuth": false, "other": 1}"#.into());
        let cfg = AssistConfig::resolve(&ConfigSources::new(HashMap::new(), environment))
            .expect("config resolves");
        assert!(!cfg.feature_flags().fhir_auth);
    }

    #[test]
    fn loads_injected_settings_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{
                "HOST_ENV": "staging",
                "RUNTIME_MODE": "development",
                "AUTH_ISS": "https://launch.smarthealthit.org/v/r4/fhir",
                "APP_BASE_URL": "https://app.example.com/ai-assist/",
                "FEATURE_FLAGS": {{ "fhirAuth": true }}
            }}"#
        )
        .expect("write config");

        let sources = ConfigSources::new(HashMap::new(), minimal_env())
            .with_injected_file(file.path())
            .expect("read config file");
        let cfg = AssistConfig::resolve(&sources).expect("config resolves");

        assert_eq!(cfg.host_env(), "staging");
        assert_eq!(cfg.runtime_mode(), RuntimeMode::Development);
        assert_eq!(
            cfg.default_iss().map(Url::as_str),
            Some("https://launch.smarthealthit.org/v/r4/fhir")
        );
        assert_eq!(
            cfg.redirect_uri().as_str(),
            "https://app.example.com/ai-assist/index.html"
        );
        assert_eq!(
            cfg.app_origin().ascii_serialization(),
            "https://app.example.com"
        );
        assert!(cfg.feature_flags().fhir_auth);
    }

    #[test]
    fn launch_url_falls_back_to_default_iss() {
        let cfg = AssistConfig::resolve(&ConfigSources::new(HashMap::new(), minimal_env()))
            .expect("config resolves");
        assert!(cfg.launch_url("eyJ9", None).is_none());
        assert_eq!(
            cfg.launch_url("eyJ9", Some("https://fhir.example.com/r4"))
                .map(String::from)
                .as_deref(),
            Some("http://localhost:3000/launch?launch=eyJ9&iss=https%3A%2F%2Ffhir.example.com%2Fr4")
        );

        let mut environment = minimal_env();
        environment.insert("AUTH_ISS".into(), "https://launch.smarthealthit.org/v/r4/fhir".into());
        let cfg = AssistConfig::resolve(&ConfigSources::new(HashMap::new(), environment))
            .expect("config resolves");
        let url = cfg.launch_url("eyJ9", Some("  ")).expect("default iss applies");
        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(url.path(), "/launch");
        assert_eq!(params["launch"], "eyJ9");
        assert_eq!(params["iss"], "https://launch.smarthealthit.org/v/r4/fhir");
    }
}
