//! Session store and its collaborators: data model, durable storage, identity
//! endpoint calls, and the auto-renewal timer.
//!
//! The store is the only writer of session state. Everything else observes it through
//! `SessionStore::state`, `SessionStore::subscribe`, or `SessionStore::access_credential`.

pub mod identity;
mod renew;
pub mod storage;
pub mod store;
pub mod types;

pub use storage::{DurableSlot, DurableStorage, FileStorage, MemoryStorage, StorageError};
pub use store::{RenewOutcome, SessionStore};
pub use types::{DurableRecord, Identity, Phase, SessionState, UserRecord};
