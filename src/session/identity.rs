//! Identity endpoint calls. These carry passwords, provider tokens, and access
//! credentials, so none of the arguments are recorded in spans.

use super::types::{AuthResponse, ExternalLoginRequest, LoginRequest};
use crate::client::{ApiClient, AppError};
use secrecy::SecretString;
use tracing::instrument;

pub const LOGIN_PATH: &str = "/login";
pub const LOGIN_EXTERNAL_PATH: &str = "/login-external";
pub const RENEW_PATH: &str = "/renew";
pub const REVOKE_PATH: &str = "/revoke";

#[derive(Clone, Debug)]
pub struct IdentityClient {
    api: ApiClient,
}

impl IdentityClient {
    #[must_use]
    pub const fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Password login. The server sets the renewal cookie on success.
    #[instrument(skip_all)]
    pub(crate) async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, AppError> {
        self.api
            .post_json(LOGIN_PATH, &LoginRequest { email, password }, None)
            .await
    }

    /// Exchanges a third-party identity provider token for a session.
    #[instrument(skip_all)]
    pub(crate) async fn login_external(&self, provider_token: &str) -> Result<AuthResponse, AppError> {
        self.api
            .post_json(
                LOGIN_EXTERNAL_PATH,
                &ExternalLoginRequest { provider_token },
                None,
            )
            .await
    }

    /// Renews using only the cookie-carried long-lived credential.
    #[instrument(skip_all)]
    pub(crate) async fn renew(&self) -> Result<AuthResponse, AppError> {
        self.api.post_empty(RENEW_PATH, None).await
    }

    /// Revokes the session server-side.
    #[instrument(skip_all)]
    pub(crate) async fn revoke(&self, access: &SecretString) -> Result<(), AppError> {
        self.api
            .post_empty_no_content(REVOKE_PATH, Some(access))
            .await
    }
}
