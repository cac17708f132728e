//! Client configuration with environment overrides. Defaults are compiled in; any
//! `NORMSEARCH_*` variable that is set and non-empty replaces its default, so a
//! deployment can repoint endpoints or tune renewal without rebuilding.
//! Configuration values are public; do not store secrets here.

use std::{env, time::Duration};

/// Request timeout applied to every HTTP call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Access credential lifetime assumed when the server does not report one.
pub const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(900);
/// Fraction of the credential lifetime after which auto-renewal fires.
pub const DEFAULT_RENEW_FRACTION: f64 = 0.93;
/// How long renewal stays fenced off after a logout.
pub const DEFAULT_LOGOUT_GRACE: Duration = Duration::from_millis(1000);
/// Wait before re-reading the session when a renewed credential is not yet visible.
pub const DEFAULT_CREDENTIAL_WAIT: Duration = Duration::from_millis(100);
/// Durable storage key for the persisted session record.
pub const DEFAULT_STORAGE_KEY: &str = "normsearch.session";

pub const ENV_API_BASE_URL: &str = "NORMSEARCH_API_BASE_URL";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "NORMSEARCH_REQUEST_TIMEOUT_MS";
pub const ENV_ACCESS_TTL_SECONDS: &str = "NORMSEARCH_ACCESS_TTL_SECONDS";
pub const ENV_LOGOUT_GRACE_MS: &str = "NORMSEARCH_LOGOUT_GRACE_MS";
pub const ENV_STATUS_BATCH: &str = "NORMSEARCH_STATUS_BATCH";

/// How `check_many` talks to the status endpoints.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CheckMode {
    /// One `GET /status/{id}` per uncached id, issued concurrently.
    #[default]
    PerResource,
    /// One `POST /status/batch` per `check_many` call.
    Batch,
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub access_ttl: Duration,
    pub renew_fraction: f64,
    pub logout_grace: Duration,
    pub credential_wait: Duration,
    pub storage_key: String,
    pub check_mode: CheckMode,
}

impl ClientConfig {
    /// Builds a config with defaults for everything except the API base URL.
    #[must_use]
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            access_ttl: DEFAULT_ACCESS_TTL,
            renew_fraction: DEFAULT_RENEW_FRACTION,
            logout_grace: DEFAULT_LOGOUT_GRACE,
            credential_wait: DEFAULT_CREDENTIAL_WAIT,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            check_mode: CheckMode::default(),
        }
    }

    /// Loads defaults and applies overrides from the process environment.
    #[must_use]
    pub fn load() -> Self {
        let mut config = Self::new(String::new());
        apply_overrides(&mut config, Overrides::from_env());
        config
    }

    /// Delay before the auto-renewal timer fires for a credential of `lifetime`.
    #[must_use]
    pub fn renew_after(&self, lifetime: Duration) -> Duration {
        lifetime.mul_f64(self.renew_fraction.clamp(0.1, 1.0))
    }
}

#[derive(Default)]
struct Overrides {
    api_base_url: Option<String>,
    request_timeout_ms: Option<u64>,
    access_ttl_seconds: Option<u64>,
    logout_grace_ms: Option<u64>,
    status_batch: Option<bool>,
}

impl Overrides {
    fn from_env() -> Self {
        Self {
            api_base_url: read_value(ENV_API_BASE_URL),
            request_timeout_ms: read_value(ENV_REQUEST_TIMEOUT_MS).and_then(|v| v.parse().ok()),
            access_ttl_seconds: read_value(ENV_ACCESS_TTL_SECONDS).and_then(|v| v.parse().ok()),
            logout_grace_ms: read_value(ENV_LOGOUT_GRACE_MS).and_then(|v| v.parse().ok()),
            status_batch: read_value(ENV_STATUS_BATCH).map(|v| parse_flag(&v)),
        }
    }
}

fn apply_overrides(config: &mut ClientConfig, overrides: Overrides) {
    if let Some(value) = overrides.api_base_url {
        config.api_base_url = value;
    }
    if let Some(value) = overrides.request_timeout_ms {
        config.request_timeout = Duration::from_millis(value);
    }
    if let Some(value) = overrides.access_ttl_seconds {
        config.access_ttl = Duration::from_secs(value);
    }
    if let Some(value) = overrides.logout_grace_ms {
        config.logout_grace = Duration::from_millis(value);
    }
    if let Some(batch) = overrides.status_batch {
        config.check_mode = if batch {
            CheckMode::Batch
        } else {
            CheckMode::PerResource
        };
    }
}

fn read_value(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| normalize_value(&value))
}

fn normalize_value(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
