//! Session store: custody of the access credential, the durable record, and the
//! renewal protocol.
//!
//! State machine:
//!
//! ```text
//! Uninitialized -> Restoring -> Authenticated | Anonymous
//! Anonymous -> Authenticated            (login / login_with_external_token)
//! Authenticated -> LoggingOut -> Anonymous
//! Authenticated -> Anonymous            (renewal rejected)
//! ```
//!
//! Renewal is single-flight and fenced by logout: while a renewal is in flight, or for
//! a grace window after `logout()`, `renew()` returns `false` without touching the
//! network. A renewal that was already on the wire when logout began is discarded when
//! it resolves.

use super::{
    identity::IdentityClient,
    renew,
    storage::{DurableSlot, DurableStorage},
    types::{AuthResponse, DurableRecord, Identity, Phase, SessionState, UserRecord},
};
use crate::client::{ApiClient, AppError, ClientConfig, SessionCookies};
use parking_lot::Mutex;
use secrecy::SecretString;
use std::sync::{
    Arc, Weak,
    atomic::{AtomicBool, AtomicU64, Ordering},
};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{Duration, sleep},
};
use tracing::{debug, info, instrument, warn};

/// Shortest delay before an auto-renewal, whatever lifetime the server reports.
const MIN_RENEW_DELAY: Duration = Duration::from_secs(1);

/// Result of one call to `renew_attempt`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenewOutcome {
    /// A fresh credential was committed.
    Renewed,
    /// Another renewal was already in flight; no request was made.
    InFlight,
    /// A logout is in progress or just finished; no request was made, or its result
    /// was discarded.
    Fenced,
    /// The server rejected the long-lived credential; the session was cleared.
    Rejected,
    /// No usable answer (network failure, server error); prior state kept.
    Unavailable,
}

/// Process-wide renewal flags. `renewing` is a watch channel so callers that lost the
/// single-flight race can wait for the winner to settle.
struct RenewalGuard {
    logging_out: AtomicBool,
    logout_epoch: AtomicU64,
    renewing: watch::Sender<bool>,
}

impl RenewalGuard {
    fn new() -> Self {
        let (renewing, _) = watch::channel(false);
        Self {
            logging_out: AtomicBool::new(false),
            logout_epoch: AtomicU64::new(0),
            renewing,
        }
    }

    fn is_logging_out(&self) -> bool {
        self.logging_out.load(Ordering::SeqCst)
    }

    /// Claims the renewal slot; `None` if another renewal holds it.
    fn try_begin(&self) -> Option<InFlight<'_>> {
        let claimed = self.renewing.send_if_modified(|renewing| {
            if *renewing {
                false
            } else {
                *renewing = true;
                true
            }
        });
        claimed.then_some(InFlight { guard: self })
    }

    fn epoch(&self) -> u64 {
        self.logout_epoch.load(Ordering::SeqCst)
    }

    /// True once a logout started after `epoch` was observed, even if its grace window
    /// has already closed.
    fn fenced_since(&self, epoch: u64) -> bool {
        self.is_logging_out() || self.epoch() != epoch
    }

    /// Raises the logout fence and returns its epoch.
    fn fence(&self) -> u64 {
        self.logging_out.store(true, Ordering::SeqCst);
        self.logout_epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Lowers the fence unless a later logout raised it again.
    fn release_fence(&self, epoch: u64) {
        if self.logout_epoch.load(Ordering::SeqCst) == epoch {
            self.logging_out.store(false, Ordering::SeqCst);
        }
    }
}

/// Releases the renewal slot on every exit path, including unwinding.
struct InFlight<'a> {
    guard: &'a RenewalGuard,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.guard.renewing.send_replace(false);
    }
}

pub(crate) struct StoreInner {
    config: ClientConfig,
    api: ApiClient,
    identity: IdentityClient,
    cookies: Arc<SessionCookies>,
    durable: DurableSlot,
    state: watch::Sender<SessionState>,
    guard: RenewalGuard,
    timer: Mutex<Option<JoinHandle<()>>>,
    // serializes commit against clear so a late renewal cannot outlive a logout
    commit_lock: Mutex<()>,
}

impl StoreInner {
    fn cancel_timer(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

/// Cheap to clone; every clone shares the same session.
///
/// A new store starts in `Restoring` with whatever the durable record held and makes
/// no network call on its own. Call `restore()` once after construction: until then
/// the state stays `Restoring` and no auto-renewal is armed. `Phase::Uninitialized` is
/// only the `SessionState::default()` value seen before a store exists.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

impl SessionStore {
    /// Builds the store and paints the optimistic state from the durable record.
    /// `restore()` must follow to let the server confirm or reject it.
    ///
    /// # Errors
    /// Returns `AppError::Config` if the HTTP client cannot be built.
    pub fn new(config: ClientConfig, storage: Arc<dyn DurableStorage>) -> Result<Self, AppError> {
        let cookies = Arc::new(SessionCookies::new());
        let api = ApiClient::new(&config, Arc::clone(&cookies))?;
        let durable = DurableSlot::new(storage, config.storage_key.clone());

        let restored = durable.load().map(DurableRecord::into_identity);
        if let Some(identity) = &restored {
            debug!(user_id = identity.user.id, "restored durable session record");
        }

        let (state, _) = watch::channel(SessionState {
            identity: restored,
            phase: Phase::Restoring,
            is_loading: true,
        });

        Ok(Self {
            inner: Arc::new(StoreInner {
                identity: IdentityClient::new(api.clone()),
                api,
                config,
                cookies,
                durable,
                state,
                guard: RenewalGuard::new(),
                timer: Mutex::new(None),
                commit_lock: Mutex::new(()),
            }),
        })
    }

    pub(crate) fn from_weak(inner: &Weak<StoreInner>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    /// HTTP client sharing this session's cookie store.
    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Receiver that observes every state transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    /// The freshest access credential, if any.
    #[must_use]
    pub fn access_credential(&self) -> Option<SecretString> {
        self.inner.state.borrow().access_credential().cloned()
    }

    #[must_use]
    pub fn is_renewing(&self) -> bool {
        *self.inner.guard.renewing.borrow()
    }

    #[must_use]
    pub fn is_logging_out(&self) -> bool {
        self.inner.guard.is_logging_out()
    }

    /// Resolves once no renewal is in flight.
    pub async fn renewal_settled(&self) {
        let mut renewing = self.inner.guard.renewing.subscribe();
        let _ = renewing.wait_for(|renewing| !renewing).await;
    }

    /// Startup confirmation of the optimistic state painted from the durable record.
    pub async fn restore(&self) -> bool {
        self.renew().await
    }

    /// Password login.
    ///
    /// # Errors
    /// Transient failures come back as `Network`/`Timeout`; server rejections come back
    /// as `Http` carrying the server's message verbatim. State is untouched on error.
    #[instrument(skip_all)]
    pub async fn login(&self, email: &str, password: &str) -> Result<UserRecord, AppError> {
        let result = self.inner.identity.login(email, password).await;
        self.finish_login(result, "password")
    }

    /// Login with a token from a third-party identity provider.
    ///
    /// # Errors
    /// Same classification as `login`.
    #[instrument(skip_all)]
    pub async fn login_with_external_token(&self, token: &str) -> Result<UserRecord, AppError> {
        let result = self.inner.identity.login_external(token).await;
        self.finish_login(result, "external")
    }

    fn finish_login(
        &self,
        result: Result<AuthResponse, AppError>,
        method: &str,
    ) -> Result<UserRecord, AppError> {
        match result {
            Ok(response) => {
                let user = self.commit(response);
                info!(user_id = user.id, method, "login succeeded");
                Ok(user)
            }
            Err(err) if err.is_transient() => {
                warn!(method, "login failed, server unreachable: {}", err);
                Err(err)
            }
            Err(err) => {
                info!(method, status = err.status(), "login rejected");
                Err(err)
            }
        }
    }

    /// Renews the access credential through the cookie-carried long-lived credential.
    /// Returns `true` only when this call committed a fresh credential.
    pub async fn renew(&self) -> bool {
        self.renew_attempt().await == RenewOutcome::Renewed
    }

    /// `renew()` with the reason it did or did not renew.
    #[instrument(skip_all)]
    pub async fn renew_attempt(&self) -> RenewOutcome {
        let guard = &self.inner.guard;

        if guard.is_logging_out() {
            debug!("renewal skipped: logout in progress");
            return RenewOutcome::Fenced;
        }

        let Some(_flight) = guard.try_begin() else {
            debug!("renewal skipped: another renewal in flight");
            return RenewOutcome::InFlight;
        };

        let epoch = guard.epoch();
        if guard.is_logging_out() {
            debug!("renewal skipped: logout in progress");
            return RenewOutcome::Fenced;
        }

        let result = self.inner.identity.renew().await;

        if guard.fenced_since(epoch) {
            debug!("renewal result discarded: logout began while it was in flight");
            return RenewOutcome::Fenced;
        }

        match result {
            Ok(response) => match self.commit_unless_fenced(response, epoch) {
                Some(user) => {
                    debug!(user_id = user.id, "session renewed");
                    RenewOutcome::Renewed
                }
                None => {
                    debug!("renewal result discarded: logout began while it was in flight");
                    RenewOutcome::Fenced
                }
            },
            Err(AppError::Unauthorized(_) | AppError::Http { status: 403, .. }) => {
                info!("renewal rejected; session cleared");
                self.clear();
                RenewOutcome::Rejected
            }
            Err(err) => {
                warn!("renewal failed, keeping current session: {}", err);
                self.inner.state.send_modify(|state| {
                    state.is_loading = false;
                    state.phase = if state.is_authenticated() {
                        Phase::Authenticated
                    } else {
                        Phase::Anonymous
                    };
                });
                RenewOutcome::Unavailable
            }
        }
    }

    /// Ends the session: fences renewal, revokes server-side on a best-effort basis, and
    /// clears state, the durable record, and the cookie jar. The fence stays up for the
    /// configured grace window.
    #[instrument(skip_all)]
    pub async fn logout(&self) {
        let inner = &self.inner;
        let epoch = inner.guard.fence();
        inner.cancel_timer();

        let mut previous = None;
        inner.state.send_modify(|state| {
            previous = state.identity.clone();
            state.phase = Phase::LoggingOut;
        });

        if let Some(identity) = previous {
            if let Err(err) = inner.identity.revoke(&identity.access).await {
                warn!("revoke failed, clearing local session anyway: {}", err);
            }
        }

        self.clear();
        inner.cookies.clear();
        info!("logged out");

        let weak = Arc::downgrade(inner);
        let grace = inner.config.logout_grace;
        tokio::spawn(async move {
            sleep(grace).await;
            if let Some(inner) = weak.upgrade() {
                inner.guard.release_fence(epoch);
                debug!("logout fence released");
            }
        });
    }

    /// Drops the in-memory session and the durable record without calling the server.
    pub fn clear(&self) {
        let _commit = self.inner.commit_lock.lock();
        self.inner.cancel_timer();
        self.inner.durable.erase();
        self.inner.state.send_replace(SessionState {
            identity: None,
            phase: Phase::Anonymous,
            is_loading: false,
        });
    }

    /// Commits a fresh identity, persists it, and arms the next renewal.
    fn commit(&self, response: AuthResponse) -> UserRecord {
        let _commit = self.inner.commit_lock.lock();
        self.commit_locked(response)
    }

    /// `commit`, unless a logout started since `epoch`.
    fn commit_unless_fenced(&self, response: AuthResponse, epoch: u64) -> Option<UserRecord> {
        let _commit = self.inner.commit_lock.lock();
        if self.inner.guard.fenced_since(epoch) {
            return None;
        }
        Some(self.commit_locked(response))
    }

    fn commit_locked(&self, response: AuthResponse) -> UserRecord {
        let (identity, expires_in) = response.into_identity();
        let user = identity.user.clone();

        self.inner.durable.save(&identity);
        self.inner.state.send_replace(SessionState {
            identity: Some(identity),
            phase: Phase::Authenticated,
            is_loading: false,
        });

        let lifetime = expires_in
            .filter(|seconds| *seconds > 0)
            .map_or(self.inner.config.access_ttl, Duration::from_secs);
        self.schedule_renewal(lifetime);
        user
    }

    fn schedule_renewal(&self, lifetime: Duration) {
        let delay = renew::jittered(self.inner.config.renew_after(lifetime)).max(MIN_RENEW_DELAY);
        let handle = renew::spawn_timer(Arc::downgrade(&self.inner), delay);
        if let Some(previous) = self.inner.timer.lock().replace(handle) {
            previous.abort();
        }
    }

    #[cfg(test)]
    pub(crate) fn commit_for_test(&self, identity: Identity) {
        self.inner.durable.save(&identity);
        self.inner.state.send_replace(SessionState {
            identity: Some(identity),
            phase: Phase::Authenticated,
            is_loading: false,
        });
    }
}
