//! Cookie store carrying the long-lived renewal credential.
//!
//! The server sets the renewal cookie on login and rotates it on every renewal; this
//! store only hands it back to the server on later requests. Nothing in the crate reads
//! the cookie values. Logout drops the whole jar so no trace of the credential survives
//! in this process.

use parking_lot::RwLock;
use reqwest::{
    cookie::{CookieStore, Jar},
    header::HeaderValue,
};
use std::sync::Arc;
use url::Url;

#[derive(Debug, Default)]
pub struct SessionCookies {
    jar: RwLock<Arc<Jar>>,
}

impl SessionCookies {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Discards every stored cookie.
    pub fn clear(&self) {
        *self.jar.write() = Arc::new(Jar::default());
    }

    fn current(&self) -> Arc<Jar> {
        Arc::clone(&self.jar.read())
    }
}

impl CookieStore for SessionCookies {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        self.current().set_cookies(cookie_headers, url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.current().cookies(url)
    }
}
