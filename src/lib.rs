//! # Normsearch client core
//!
//! Client-side session custody and authenticated request handling for the normsearch
//! legal-document search service.
//!
//! ## Session
//!
//! [`session::SessionStore`] owns the short-lived access credential and the signed-in
//! user record. The long-lived renewal credential lives in an HTTP cookie the core never
//! reads; renewal is a cookie-carried `POST /renew`. Renewal is single-flight, fenced off
//! during and shortly after logout, and re-armed automatically at about 93% of the
//! credential's lifetime.
//!
//! A durable record (`access_token` plus user) lets a restarted client paint its
//! signed-in state before the server confirms it with [`session::SessionStore::restore`].
//!
//! ## Dispatch
//!
//! [`dispatch::Dispatcher`] attaches the current credential to a request. On a `401` it
//! renews at most once and retries at most once; if renewal fails the caller sees the
//! original `401`.
//!
//! ## Resource statuses
//!
//! [`status::StatusCache`] remembers which resources the signed-in user has marked, with
//! per-id single-flight lookups, optimistic toggles, and clearing whenever the session
//! changes hands.

pub mod cli;
pub mod client;
pub mod dispatch;
pub mod session;
pub mod status;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
