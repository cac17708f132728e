//! Session data model and wire payloads. Access credentials are held as
//! `SecretString` so they never show up in `Debug` output or log lines.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// The authenticated user as reported by the identity endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

/// A user and the access credential issued for them. Held as one value so the two are
/// always set and cleared together.
#[derive(Clone, Debug)]
pub struct Identity {
    pub user: UserRecord,
    pub access: SecretString,
}

/// Lifecycle phase of the session store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Uninitialized,
    /// Startup renewal in flight; any identity shown is from the durable record.
    Restoring,
    Authenticated,
    Anonymous,
    LoggingOut,
}

/// Observable session state.
#[derive(Clone, Debug, Default)]
pub struct SessionState {
    pub identity: Option<Identity>,
    pub phase: Phase,
    pub is_loading: bool,
}

impl SessionState {
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    #[must_use]
    pub fn user(&self) -> Option<&UserRecord> {
        self.identity.as_ref().map(|identity| &identity.user)
    }

    #[must_use]
    pub fn access_credential(&self) -> Option<&SecretString> {
        self.identity.as_ref().map(|identity| &identity.access)
    }

    #[must_use]
    pub fn user_id(&self) -> Option<i64> {
        self.user().map(|user| user.id)
    }
}

/// Persisted `{access_token, user}` pair used to paint an optimistic state on startup.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DurableRecord {
    pub access_token: String,
    pub user: UserRecord,
}

impl DurableRecord {
    pub(crate) fn from_identity(identity: &Identity) -> Self {
        Self {
            access_token: identity.access.expose_secret().to_string(),
            user: identity.user.clone(),
        }
    }

    pub(crate) fn into_identity(self) -> Identity {
        Identity {
            user: self.user,
            access: SecretString::from(self.access_token),
        }
    }
}

#[derive(Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Serialize)]
pub(crate) struct ExternalLoginRequest<'a> {
    pub provider_token: &'a str,
}

/// Successful response from login, external login, and renewal.
#[derive(Deserialize)]
pub(crate) struct AuthResponse {
    pub access_token: String,
    pub user: UserRecord,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl AuthResponse {
    pub(crate) fn into_identity(self) -> (Identity, Option<u64>) {
        (
            Identity {
                user: self.user,
                access: SecretString::from(self.access_token),
            },
            self.expires_in,
        )
    }
}
