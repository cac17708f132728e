//! Shared client plumbing: configuration, the error taxonomy, the HTTP helper layer,
//! and the cookie store that carries the renewal credential.

pub mod api;
pub mod config;
pub mod cookies;
pub mod errors;

pub use api::ApiClient;
pub use config::{CheckMode, ClientConfig};
pub use cookies::SessionCookies;
pub use errors::AppError;
