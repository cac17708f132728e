//! HTTP helpers for the JSON API with a consistent timeout and error policy. Every
//! network call in the crate goes through `ApiClient`, so the mapping from transport
//! and status failures to `AppError` lives in one place. Helpers attach a bearer
//! credential only when the caller passes one; the renewal cookie rides along in the
//! shared cookie store.

use super::{config::ClientConfig, cookies::SessionCookies, errors::AppError};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Maximum number of error body characters surfaced to callers.
const MAX_ERROR_CHARS: usize = 200;

#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Builds a client that shares `cookies` with every other clone.
    ///
    /// # Errors
    /// Returns `AppError::Config` if the underlying HTTP client cannot be built.
    pub fn new(config: &ClientConfig, cookies: Arc<SessionCookies>) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(config.request_timeout)
            .connect_timeout(config.request_timeout)
            .cookie_provider(cookies)
            .build()
            .map_err(|err| AppError::Config(format!("Failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.clone(),
        })
    }

    /// Fetches JSON, optionally authenticated with a bearer credential.
    ///
    /// # Errors
    /// Returns the mapped `AppError` for transport, status, or decode failures.
    #[instrument(skip(self, bearer))]
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        bearer: Option<&SecretString>,
    ) -> Result<T, AppError> {
        let request = with_bearer(self.client.get(self.url(path)), bearer);
        let response = send(request).await?;
        handle_json_response(response).await
    }

    /// Posts JSON and parses a JSON response.
    ///
    /// # Errors
    /// Returns the mapped `AppError` for transport, status, or decode failures.
    #[instrument(skip(self, body, bearer))]
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        bearer: Option<&SecretString>,
    ) -> Result<T, AppError> {
        let request = with_bearer(self.client.post(self.url(path)).json(body), bearer);
        let response = send(request).await?;
        handle_json_response(response).await
    }

    /// Posts JSON and ignores the response body.
    ///
    /// # Errors
    /// Returns the mapped `AppError` for transport or status failures.
    #[instrument(skip(self, body, bearer))]
    pub async fn post_json_empty<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        bearer: Option<&SecretString>,
    ) -> Result<(), AppError> {
        let request = with_bearer(self.client.post(self.url(path)).json(body), bearer);
        let response = send(request).await?;
        handle_empty_response(response).await
    }

    /// Posts without a body and parses a JSON response. Used for cookie-driven calls.
    ///
    /// # Errors
    /// Returns the mapped `AppError` for transport, status, or decode failures.
    #[instrument(skip(self, bearer))]
    pub async fn post_empty<T: DeserializeOwned>(
        &self,
        path: &str,
        bearer: Option<&SecretString>,
    ) -> Result<T, AppError> {
        let request = with_bearer(self.client.post(self.url(path)), bearer);
        let response = send(request).await?;
        handle_json_response(response).await
    }

    /// Posts without a body and ignores the response body.
    ///
    /// # Errors
    /// Returns the mapped `AppError` for transport or status failures.
    #[instrument(skip(self, bearer))]
    pub async fn post_empty_no_content(
        &self,
        path: &str,
        bearer: Option<&SecretString>,
    ) -> Result<(), AppError> {
        let request = with_bearer(self.client.post(self.url(path)), bearer);
        let response = send(request).await?;
        handle_empty_response(response).await
    }

    fn url(&self, path: &str) -> String {
        build_url_with_base(&self.base_url, path)
    }
}

fn with_bearer(builder: RequestBuilder, bearer: Option<&SecretString>) -> RequestBuilder {
    match bearer {
        Some(token) => builder.bearer_auth(token.expose_secret()),
        None => builder,
    }
}

/// Builds a URL from an explicit base URL and the provided path.
fn build_url_with_base(base_url: &str, path: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    let path = path.trim();

    if base.is_empty() {
        path.to_string()
    } else {
        format!("{}/{}", base, path.trim_start_matches('/'))
    }
}

async fn send(request: RequestBuilder) -> Result<Response, AppError> {
    request.send().await.map_err(map_request_error)
}

/// Maps transport errors into `AppError` variants with timeout detection.
fn map_request_error(err: reqwest::Error) -> AppError {
    if err.is_timeout() {
        AppError::Timeout("Request timed out. Please try again.".to_string())
    } else if err.is_builder() {
        AppError::Serialization(format!("Failed to build request: {err}"))
    } else {
        AppError::Network(format!("Unable to reach the server: {err}"))
    }
}

async fn handle_json_response<T: DeserializeOwned>(response: Response) -> Result<T, AppError> {
    if response.status().is_success() {
        response
            .json::<T>()
            .await
            .map_err(|err| AppError::Parse(format!("Failed to decode response: {err}")))
    } else {
        Err(status_error(response).await)
    }
}

async fn handle_empty_response(response: Response) -> Result<(), AppError> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(status_error(response).await)
    }
}

/// Turns a non-success response into `Unauthorized` (401) or `Http`.
async fn status_error(response: Response) -> AppError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body);

    debug!(status = status.as_u16(), "request failed");

    if status == StatusCode::UNAUTHORIZED {
        AppError::Unauthorized(message)
    } else {
        AppError::Http {
            status: status.as_u16(),
            message,
        }
    }
}

/// Prefers the server's `detail` field; falls back to the sanitized raw body.
fn error_message(body: &str) -> String {
    let detail = serde_json::from_str::<Value>(body).ok().and_then(|json| {
        json.get("detail")
            .and_then(Value::as_str)
            .map(ToString::to_string)
    });

    match detail {
        Some(detail) if !detail.trim().is_empty() => detail,
        _ => sanitize_body(body),
    }
}

/// Sanitizes HTTP error bodies for user-facing messages by trimming and truncating.
fn sanitize_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "Request failed.".to_string()
    } else {
        trimmed.chars().take(MAX_ERROR_CHARS).collect()
    }
}
