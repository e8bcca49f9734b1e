//! # Smart Client
//!
//! HTTP implementations of the collaborators the launch orchestrator drives:
//! - [`SmartAuthorizer`]: SMART discovery, OAuth2 authorization code flow with PKCE
//! - [`FhirRestSession`]: reads the in-context `Patient` with the issued access token
//! - [`HttpContextBridge`]: posts the resolved patient to the patient-context container
//! - [`HttpUserDirectory`]: reads the signed-in user from the backend's `/api/me`
//!
//! All of them share one `reqwest::Client` built by [`http_client`].

pub mod authorizer;
pub mod bridge;
pub mod discovery;
pub mod pkce;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod users;

pub use authorizer::{AuthorizationRedirect, CallbackError, CallbackParams, SmartAuthorizer};
pub use bridge::HttpContextBridge;
pub use discovery::SmartConfiguration;
pub use pkce::PkceData;
pub use session::FhirRestSession;
pub use users::HttpUserDirectory;

use std::time::Duration;

/// Connect and overall request limits for every outbound call.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the shared HTTP client.
pub fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()
}

/// Copy of `url` whose path ends in `/`, so relative joins append instead of replacing the
/// last segment.
pub(crate) fn as_base(url: &url::Url) -> url::Url {
    let mut base = url.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}
