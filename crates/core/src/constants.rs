//! Constants used throughout the launch core.

/// Station used when neither the launch, the user nor the resource names one.
pub const DEFAULT_STATION_ID: &str = "500";

/// Default OAuth redirect URI, relative to the app base URL.
pub const DEFAULT_REDIRECT_URI: &str = "index.html";

/// Default PKCE mode passed to the authorization client.
pub const DEFAULT_PKCE_MODE: &str = "unsafeV1";

/// Default deployment label used in logs.
pub const DEFAULT_HOST_ENV: &str = "dev";

/// Default public base URL of the dashboard.
pub const DEFAULT_APP_BASE_URL: &str = "http://localhost:3000/";

/// Path of the current-user endpoint under the backend base URL.
pub const CURRENT_USER_PATH: &str = "api/me";
