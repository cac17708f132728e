//! Authenticated request dispatch.
//!
//! `Dispatcher::dispatch` runs a caller-supplied request function with the current
//! access credential. On `AppError::Unauthorized` it renews once and retries once with
//! the freshest credential; any other failure, a failed renewal, or a 401 on the retry
//! goes back to the caller unchanged. Only the outermost dispatch on a task owns
//! renewal and retry: a dispatch nested anywhere inside another runs its request once
//! and hands the result back, so one logical operation costs at most one renewal and
//! one retry.

use crate::{
    client::AppError,
    session::{RenewOutcome, SessionStore},
};
use secrecy::{ExposeSecret, SecretString};
use std::future::Future;
use tokio::time::sleep;
use tracing::{debug, instrument};

tokio::task_local! {
    static DISPATCHING: ();
}

#[derive(Clone)]
pub struct Dispatcher {
    session: SessionStore,
}

impl Dispatcher {
    #[must_use]
    pub const fn new(session: SessionStore) -> Self {
        Self { session }
    }

    #[must_use]
    pub const fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Runs `request` with the current credential, renewing and retrying once on 401.
    ///
    /// # Errors
    /// Returns the request's own error. After a failed renewal this is the original
    /// `Unauthorized`, never a renewal-specific error.
    #[instrument(skip_all)]
    pub async fn dispatch<T, F, Fut>(&self, request: F) -> Result<T, AppError>
    where
        F: Fn(Option<SecretString>) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        if DISPATCHING.try_with(|_| ()).is_ok() {
            debug!("nested dispatch; the enclosing one owns renewal");
            return request(self.session.access_credential()).await;
        }

        DISPATCHING.scope((), self.dispatch_outermost(request)).await
    }

    async fn dispatch_outermost<T, F, Fut>(&self, request: F) -> Result<T, AppError>
    where
        F: Fn(Option<SecretString>) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let stale = self.session.access_credential();

        let err = match request(stale.clone()).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_unauthorized() {
            return Err(err);
        }

        let Some(fresh) = self.fresh_credential(stale.as_ref()).await else {
            debug!("no renewed credential available; returning original error");
            return Err(err);
        };

        debug!("retrying request with renewed credential");
        request(Some(fresh)).await
    }

    /// Produces a credential newer than `stale`, renewing or joining a renewal as needed.
    async fn fresh_credential(&self, stale: Option<&SecretString>) -> Option<SecretString> {
        if let Some(current) = self.session.access_credential() {
            if !same_credential(Some(&current), stale) {
                debug!("credential already rotated by another caller");
                return Some(current);
            }
        }

        match self.session.renew_attempt().await {
            RenewOutcome::Renewed => self.freshest(None).await,
            RenewOutcome::InFlight => {
                debug!("joining in-flight renewal");
                self.session.renewal_settled().await;
                self.freshest(stale).await
            }
            outcome => {
                debug!(?outcome, "renewal did not succeed");
                None
            }
        }
    }

    /// Reads the session credential, waiting once if it is not visible yet.
    async fn freshest(&self, stale: Option<&SecretString>) -> Option<SecretString> {
        let usable = |candidate: &Option<SecretString>| {
            candidate.is_some() && (stale.is_none() || !same_credential(candidate.as_ref(), stale))
        };

        let current = self.session.access_credential();
        if usable(&current) {
            return current;
        }

        sleep(self.session.config().credential_wait).await;
        let current = self.session.access_credential();
        usable(&current).then_some(current).flatten()
    }
}

fn same_credential(left: Option<&SecretString>, right: Option<&SecretString>) -> bool {
    match (left, right) {
        (Some(left), Some(right)) => left.expose_secret() == right.expose_secret(),
        (None, None) => true,
        _ => false,
    }
}
