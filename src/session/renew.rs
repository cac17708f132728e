//! Auto-renewal timer. Each committed credential arms one timer that fires at roughly
//! 93% of the credential lifetime and calls `renew()`. A successful renewal commits a
//! new credential, which arms the next timer; a failed one arms nothing, so further
//! renewal is driven only by the next request that gets a 401.

use super::store::{RenewOutcome, SessionStore, StoreInner};
use rand::Rng;
use std::sync::Weak;
use tokio::{
    task::JoinHandle,
    time::{Duration, sleep},
};
use tracing::{debug, info, instrument};

/// Lower bound of the random factor applied to the renewal delay.
const JITTER_FLOOR: f64 = 0.97;

/// Spreads timers armed at the same moment slightly earlier than `base`.
pub(crate) fn jittered(base: Duration) -> Duration {
    let jitter = rand::thread_rng().gen_range(JITTER_FLOOR..=1.0);
    base.mul_f64(jitter)
}

/// Arms a one-shot renewal timer for the store behind `inner`.
pub(crate) fn spawn_timer(inner: Weak<StoreInner>, delay: Duration) -> JoinHandle<()> {
    debug!("Will renew session in {} ms", delay.as_millis());

    tokio::spawn(async move {
        sleep(delay).await;
        fire(inner).await;
    })
}

#[instrument(skip_all)]
async fn fire(inner: Weak<StoreInner>) {
    let Some(store) = SessionStore::from_weak(&inner) else {
        debug!("session store dropped; auto-renewal stopped");
        return;
    };

    match store.renew_attempt().await {
        RenewOutcome::Renewed => debug!("auto-renewal succeeded"),
        outcome => info!(?outcome, "auto-renewal stopped"),
    }
}
