//! Current-user lookup against the backend's `/api/me`.

use crate::as_base;
use assist_core::constants::CURRENT_USER_PATH;
use assist_core::user::CurrentUserResponse;
use assist_core::{AuthenticatedUser, UserDirectory, UserError};
use async_trait::async_trait;
use reqwest::StatusCode;
use url::Url;

pub struct HttpUserDirectory {
    http: reqwest::Client,
    endpoint: Url,
}

impl HttpUserDirectory {
    pub fn new(http: reqwest::Client, api_url: &Url) -> Result<Self, url::ParseError> {
        Ok(Self {
            http,
            endpoint: as_base(api_url).join(CURRENT_USER_PATH)?,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn current_user(&self) -> Result<AuthenticatedUser, UserError> {
        let response = self
            .http
            .get(self.endpoint.clone())
            .send()
            .await
            .map_err(|e| UserError(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                let body: CurrentUserResponse =
                    response.json().await.map_err(|e| UserError(e.to_string()))?;
                Ok(body.into())
            }
            StatusCode::UNAUTHORIZED => Ok(AuthenticatedUser::anonymous()),
            status => Err(UserError(format!(
                "{} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            ))),
        }
    }
}
