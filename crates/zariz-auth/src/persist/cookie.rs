//! Renewal cookie attributes for the web tier.
//!
//! Browser clients never see the renewal credential: a server-side proxy
//! keeps it in an HTTP-only cookie. This renders the header values such a
//! proxy sets and deletes.

use std::fmt;

/// Name of the cookie carrying the renewal credential.
pub const RENEWAL_COOKIE_NAME: &str = "refresh_token";

/// A `Set-Cookie` value for the renewal credential.
#[derive(Clone, PartialEq, Eq)]
pub struct RenewalCookie {
    value: String,
    max_age_days: u32,
    secure: bool,
}

impl RenewalCookie {
    /// A cookie carrying `value` for `max_age_days`.
    pub fn new(value: impl Into<String>, max_age_days: u32) -> Self {
        Self {
            value: value.into(),
            max_age_days,
            secure: true,
        }
    }

    /// Drop the `Secure` attribute (plain-HTTP development setups only).
    pub fn insecure(mut self) -> Self {
        self.secure = false;
        self
    }

    /// Max-Age in seconds.
    pub fn max_age_seconds(&self) -> u64 {
        u64::from(self.max_age_days) * 24 * 60 * 60
    }

    /// The header value that deletes the cookie.
    pub fn deletion() -> String {
        format!("{RENEWAL_COOKIE_NAME}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0")
    }

    /// Render the `Set-Cookie` header value.
    pub fn header_value(&self) -> String {
        let mut header = format!(
            "{RENEWAL_COOKIE_NAME}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
            self.value,
            self.max_age_seconds()
        );
        if self.secure {
            header.push_str("; Secure");
        }
        header
    }
}

impl fmt::Debug for RenewalCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenewalCookie")
            .field("value", &"<redacted>")
            .field("max_age_days", &self.max_age_days)
            .field("secure", &self.secure)
            .finish()
    }
}
