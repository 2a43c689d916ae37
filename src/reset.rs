//! Client state reset signal
//!
//! After a completed purchase the finalize response carries a short-lived
//! cookie telling the browser to drop its locally cached form state. The
//! client reads it once and deletes it. Nothing on the server depends on the
//! signal being seen: losing it, or reading it twice, only affects what the
//! browser keeps in local storage.

use std::time::Duration;

use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, HeaderValue};

/// Cookie name the client looks for
pub const RESET_COOKIE_NAME: &str = "clear_form_storage";

/// Cookie value
pub const RESET_COOKIE_VALUE: &str = "true";

/// Lifetime of the signal
pub const RESET_SIGNAL_MAX_AGE: Duration = Duration::from_secs(60);

/// Best-effort instruction to purge client-side claim state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetSignal {
    max_age: Duration,
    secure: bool,
}

impl Default for ResetSignal {
    fn default() -> Self {
        Self {
            max_age: RESET_SIGNAL_MAX_AGE,
            secure: false,
        }
    }
}

impl ResetSignal {
    /// The standard 60 second signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the cookie `Secure` (served over https)
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Lifetime of the cookie
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// `Set-Cookie` header value
    ///
    /// Not `HttpOnly`: the page script has to read it.
    pub fn cookie(&self) -> String {
        let mut cookie = format!(
            "{RESET_COOKIE_NAME}={RESET_COOKIE_VALUE}; Path=/; Max-Age={}; SameSite=Lax",
            self.max_age.as_secs()
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// Attach the signal to a response's headers
    pub fn apply(&self, headers: &mut HeaderMap) {
        // The cookie text is built from constants and an integer
        if let Ok(value) = HeaderValue::from_str(&self.cookie()) {
            headers.append(SET_COOKIE, value);
        }
    }
}
