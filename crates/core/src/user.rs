//! Authenticated clinician and their facility affiliations.
//!
//! The backend's `/api/me` endpoint reports whether the caller is signed in and, if so, the
//! VistA sites they hold a user id (DUZ) at. Reconciliation uses those affiliations to fill in a
//! station and user id when the launch context does not supply them.

use crate::error::UserError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

/// A site / site-specific user id pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FacilityAffiliation {
    pub facility_id: String,
    pub user_facility_id: String,
    pub facility_name: Option<String>,
}

impl FacilityAffiliation {
    pub fn new(facility_id: impl Into<String>, user_facility_id: impl Into<String>) -> Self {
        Self {
            facility_id: facility_id.into(),
            user_facility_id: user_facility_id.into(),
            facility_name: None,
        }
    }
}

/// The signed-in user as seen by the launch flow.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub is_authenticated: bool,
    /// In the order the identity provider listed them.
    pub facility_affiliations: Vec<FacilityAffiliation>,
}

impl AuthenticatedUser {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(facility_affiliations: Vec<FacilityAffiliation>) -> Self {
        Self {
            is_authenticated: true,
            facility_affiliations,
        }
    }

    /// First usable affiliation. Unauthenticated users have none.
    pub fn first_affiliation(&self) -> Option<&FacilityAffiliation> {
        self.usable_affiliations().next()
    }

    /// Affiliation at `facility_id`. Unauthenticated users have none.
    pub fn affiliation_for(&self, facility_id: &str) -> Option<&FacilityAffiliation> {
        self.usable_affiliations()
            .find(|a| a.facility_id.trim() == facility_id.trim())
    }

    fn usable_affiliations(&self) -> impl Iterator<Item = &FacilityAffiliation> + '_ {
        self.facility_affiliations
            .iter()
            .filter(|_| self.is_authenticated)
            .filter(|a| !a.facility_id.trim().is_empty())
    }
}

/// `/api/me` response body.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CurrentUserResponse {
    pub authenticated: bool,
    #[serde(default)]
    pub user_info: Option<UserInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct UserInfo {
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub vista_ids: Vec<VistaId>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct VistaId {
    pub site_id: String,
    #[serde(default)]
    pub site_name: String,
    pub duz: String,
}

impl From<CurrentUserResponse> for AuthenticatedUser {
    fn from(response: CurrentUserResponse) -> Self {
        let affiliations = response
            .user_info
            .map(|info| {
                info.vista_ids
                    .into_iter()
                    .map(|v| FacilityAffiliation {
                        facility_id: v.site_id,
                        user_facility_id: v.duz,
                        facility_name: Some(v.site_name).filter(|n| !n.is_empty()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        AuthenticatedUser {
            is_authenticated: response.authenticated,
            facility_affiliations: affiliations,
        }
    }
}

/// Source of the current user.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn current_user(&self) -> Result<AuthenticatedUser, UserError>;
}

/// Fetches the user once and serves later calls from memory. Failures are not cached.
pub struct CachedUserDirectory<D> {
    inner: D,
    cached: OnceCell<AuthenticatedUser>,
}

impl<D: UserDirectory> CachedUserDirectory<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            cached: OnceCell::new(),
        }
    }
}

#[async_trait]
impl<D: UserDirectory> UserDirectory for CachedUserDirectory<D> {
    async fn current_user(&self) -> Result<AuthenticatedUser, UserError> {
        self.cached
            .get_or_try_init(|| self.inner.current_user())
            .await
            .cloned()
    }
}
