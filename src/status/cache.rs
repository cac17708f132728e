//! Per-user cache of boolean resource statuses.
//!
//! Every resource id is in one of three states: unknown, pending (one lookup in
//! flight), or checked (value known). A pending id is never looked up a second time,
//! and a checked id is only looked up again after `clear()` or a failed toggle.
//!
//! The cache belongs to whoever is signed in. When the session becomes anonymous or a
//! different user signs in, everything is dropped, and lookups that were already on the
//! wire are discarded when they resolve.

use super::lookup::StatusLookup;
use crate::{
    client::{AppError, CheckMode},
    session::{SessionState, SessionStore},
};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Weak},
};
use tokio::{runtime::Handle, sync::watch, task::JoinHandle};
use tracing::{debug, instrument, warn};

#[derive(Default)]
struct CacheState {
    values: HashMap<i64, bool>,
    checked: HashSet<i64>,
    pending: HashSet<i64>,
    owner: Option<i64>,
    generation: u64,
}

impl CacheState {
    fn reset(&mut self, owner: Option<i64>) {
        self.values.clear();
        self.checked.clear();
        self.pending.clear();
        self.owner = owner;
        self.generation += 1;
    }

    fn is_empty(&self) -> bool {
        self.values.is_empty() && self.checked.is_empty() && self.pending.is_empty()
    }
}

struct CacheInner {
    lookup: StatusLookup,
    mode: CheckMode,
    state: Mutex<CacheState>,
    // bumped whenever a pending id settles or the cache is cleared
    settled: watch::Sender<u64>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for CacheInner {
    fn drop(&mut self) {
        if let Some(handle) = self.watcher.lock().take() {
            handle.abort();
        }
    }
}

impl CacheInner {
    /// Follows the session's owner, clearing on sign-out or a change of user.
    fn sync_owner(&self, session: &SessionState) -> Option<u64> {
        let user = session.is_authenticated().then(|| session.user_id()).flatten();

        let mut state = self.state.lock();
        if user.is_none() {
            if state.owner.is_some() || !state.is_empty() {
                debug!("session is anonymous; clearing resource statuses");
                state.reset(None);
                drop(state);
                self.notify();
            }
            None
        } else if state.owner != user {
            if state.owner.is_some() {
                debug!(user_id = user, "signed-in user changed; clearing resource statuses");
            }
            state.reset(user);
            let generation = state.generation;
            drop(state);
            self.notify();
            Some(generation)
        } else {
            Some(state.generation)
        }
    }

    fn notify(&self) {
        self.settled.send_modify(|count| *count = count.wrapping_add(1));
    }

    /// Records one lookup result unless the cache was cleared while it was in flight.
    fn settle(&self, resource_id: i64, generation: u64, result: Result<Option<bool>, &AppError>) {
        let mut state = self.state.lock();
        if state.generation != generation {
            debug!(resource_id, "discarding status from a cleared cache");
            return;
        }

        state.pending.remove(&resource_id);
        match result {
            Ok(Some(marked)) => {
                state.values.insert(resource_id, marked);
                state.checked.insert(resource_id);
            }
            Ok(None) => {
                debug!(resource_id, "status missing from batch response");
            }
            Err(err) => {
                warn!(resource_id, "status lookup failed: {}", err);
            }
        }
        drop(state);
        self.notify();
    }
}

/// Cheap to clone; every clone shares the same cache.
#[derive(Clone)]
pub struct StatusCache {
    inner: Arc<CacheInner>,
}

impl StatusCache {
    /// Builds a cache over `lookup` using the session config's `check_mode`.
    ///
    /// When called inside a Tokio runtime, a background task also clears the cache as
    /// soon as the session changes hands. Without one, the same check runs lazily at
    /// the start of every operation.
    #[must_use]
    pub fn new(lookup: StatusLookup) -> Self {
        let mode = lookup.dispatcher().session().config().check_mode;
        Self::with_mode(lookup, mode)
    }

    /// Like `new`, with an explicit check mode.
    #[must_use]
    pub fn with_mode(lookup: StatusLookup, mode: CheckMode) -> Self {
        let session = lookup.dispatcher().session().clone();
        let (settled, _) = watch::channel(0);
        let inner = Arc::new(CacheInner {
            lookup,
            mode,
            state: Mutex::new(CacheState::default()),
            settled,
            watcher: Mutex::new(None),
        });

        inner.sync_owner(&session.state());
        if let Ok(runtime) = Handle::try_current() {
            let watcher = runtime.spawn(follow_session(session.subscribe(), Arc::downgrade(&inner)));
            *inner.watcher.lock() = Some(watcher);
        }

        Self { inner }
    }

    #[must_use]
    pub fn session(&self) -> &SessionStore {
        self.inner.lookup.dispatcher().session()
    }

    /// Syncs with the session; `false` when nobody is signed in.
    fn admit(&self) -> bool {
        self.inner.sync_owner(&self.session().state()).is_some()
    }

    /// Cached value for `resource_id`. Unknown and pending ids read as `false`.
    #[must_use]
    pub fn is_marked(&self, resource_id: i64) -> bool {
        if !self.admit() {
            return false;
        }
        self.inner
            .state
            .lock()
            .values
            .get(&resource_id)
            .copied()
            .unwrap_or(false)
    }

    #[must_use]
    pub fn is_checked(&self, resource_id: i64) -> bool {
        self.admit() && self.inner.state.lock().checked.contains(&resource_id)
    }

    #[must_use]
    pub fn is_pending(&self, resource_id: i64) -> bool {
        self.admit() && self.inner.state.lock().pending.contains(&resource_id)
    }

    /// Looks up every id that is neither checked nor pending, then waits until all of
    /// `resource_ids` have settled. Failures are logged and leave the id unchecked.
    #[instrument(skip_all, fields(requested = resource_ids.len()))]
    pub async fn check_many(&self, resource_ids: &[i64]) {
        if !self.admit() {
            debug!("not signed in; skipping status check");
            return;
        }

        let (claimed, waiting, generation) = {
            let mut state = self.inner.state.lock();
            if state.owner.is_none() {
                return;
            }
            let mut claimed = Vec::new();
            let mut waiting = Vec::new();
            for &id in resource_ids {
                if state.checked.contains(&id) {
                    continue;
                }
                if state.pending.insert(id) {
                    claimed.push(id);
                } else if !claimed.contains(&id) && !waiting.contains(&id) {
                    waiting.push(id);
                }
            }
            (claimed, waiting, state.generation)
        };

        if !claimed.is_empty() {
            debug!(count = claimed.len(), "looking up resource statuses");
            self.lookup(claimed, generation).await;
        }

        if !waiting.is_empty() {
            self.wait_settled(&waiting).await;
        }
    }

    /// Runs the lookups on detached tasks so pending ids settle even if the caller
    /// stops waiting.
    async fn lookup(&self, claimed: Vec<i64>, generation: u64) {
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        match self.inner.mode {
            CheckMode::PerResource => {
                for id in claimed {
                    let inner = Arc::clone(&self.inner);
                    tasks.push(tokio::spawn(async move {
                        let result = inner.lookup.status(id).await;
                        inner.settle(id, generation, result.as_ref().map(|marked| Some(*marked)));
                    }));
                }
            }
            CheckMode::Batch => {
                let inner = Arc::clone(&self.inner);
                tasks.push(tokio::spawn(async move {
                    match inner.lookup.statuses(&claimed).await {
                        Ok(statuses) => {
                            for id in claimed {
                                inner.settle(id, generation, Ok(statuses.get(&id).copied()));
                            }
                        }
                        Err(err) => {
                            for id in claimed {
                                inner.settle(id, generation, Err(&err));
                            }
                        }
                    }
                }));
            }
        }

        for task in tasks {
            if let Err(err) = task.await {
                warn!("status lookup task failed: {}", err);
            }
        }
    }

    /// Waits until none of `ids` is pending. A clear empties `pending`, so waiters
    /// never outlive the owner they started under.
    async fn wait_settled(&self, ids: &[i64]) {
        let mut settled = self.inner.settled.subscribe();
        loop {
            {
                let state = self.inner.state.lock();
                if !ids.iter().any(|id| state.pending.contains(id)) {
                    return;
                }
            }
            if settled.changed().await.is_err() {
                return;
            }
        }
    }

    /// Flips the cached value immediately, then asks the server to do the same. On
    /// failure the id is re-checked so the cache converges on the server's answer.
    #[instrument(skip(self))]
    pub async fn toggle(&self, resource_id: i64) {
        if !self.admit() {
            debug!("not signed in; ignoring toggle");
            return;
        }

        let generation = {
            let mut state = self.inner.state.lock();
            if state.owner.is_none() {
                return;
            }
            let current = state.values.get(&resource_id).copied().unwrap_or(false);
            state.values.insert(resource_id, !current);
            state.checked.insert(resource_id);
            state.generation
        };

        match self.inner.lookup.toggle(resource_id).await {
            Ok(()) => debug!(resource_id, "toggle confirmed"),
            Err(err) => {
                warn!(resource_id, "toggle failed, re-checking: {}", err);
                {
                    let mut state = self.inner.state.lock();
                    if state.generation != generation {
                        return;
                    }
                    state.checked.remove(&resource_id);
                }
                self.check_many(&[resource_id]).await;
            }
        }
    }

    /// Forgets every value, checked mark, and pending claim. Lookups still on the wire
    /// are discarded when they resolve.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        let owner = state.owner;
        state.reset(owner);
        drop(state);
        self.inner.notify();
    }
}

async fn follow_session(mut session: watch::Receiver<SessionState>, cache: Weak<CacheInner>) {
    while session.changed().await.is_ok() {
        let Some(inner) = cache.upgrade() else {
            break;
        };
        let state = session.borrow_and_update().clone();
        inner.sync_owner(&state);
    }
}
