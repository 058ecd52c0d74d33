//! Issued access credential and its expiry arithmetic
//!
//! A `Credential` is never mutated after construction. Refreshing produces
//! a new `Credential` that replaces the old one wherever it is held.

use std::time::SystemTime;

use common::Secret;

use crate::constants::EXPIRY_BUFFER_SECS;

/// Token material from one successful token endpoint response.
///
/// `issued_at` is captured when this value is created on the client, not
/// when the server computed `expires_in`.
#[derive(Debug, Clone)]
pub struct Credential {
    access_token: Secret<String>,
    token_type: String,
    expires_in: u64,
    refresh_token: Option<Secret<String>>,
    scope: Option<String>,
    issued_at: SystemTime,
}

impl Credential {
    pub fn new(
        access_token: impl Into<Secret<String>>,
        token_type: impl Into<String>,
        expires_in: u64,
        refresh_token: Option<Secret<String>>,
        scope: Option<String>,
        issued_at: SystemTime,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: token_type.into(),
            expires_in,
            refresh_token,
            scope,
            issued_at,
        }
    }

    pub fn access_token(&self) -> &str {
        self.access_token.expose()
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// Lifetime in seconds as declared by the server.
    pub fn expires_in(&self) -> u64 {
        self.expires_in
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_ref().map(|t| t.expose().as_str())
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn issued_at(&self) -> SystemTime {
        self.issued_at
    }

    /// `Authorization` header value, e.g. `Bearer tok1`.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token.expose())
    }

    /// `lifetime - elapsed - buffer`. Negative once past the refresh point.
    ///
    /// A `now` earlier than `issued_at` counts as zero elapsed time.
    pub fn seconds_until_expiration(&self, now: SystemTime) -> i64 {
        let elapsed = now
            .duration_since(self.issued_at)
            .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        let lifetime = i64::try_from(self.expires_in).unwrap_or(i64::MAX);
        lifetime
            .saturating_sub(elapsed)
            .saturating_sub(EXPIRY_BUFFER_SECS)
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.seconds_until_expiration(now) <= 0
    }

    /// Expired, or will be within `margin_secs`.
    pub fn expires_within(&self, now: SystemTime, margin_secs: i64) -> bool {
        self.seconds_until_expiration(now) <= margin_secs
    }

    /// Build the successor credential for a refresh response that did not
    /// rotate the refresh token: keeps `self` unless it already has one.
    pub fn or_refresh_token(self, previous: Option<&str>) -> Self {
        if self.refresh_token.is_some() {
            return self;
        }
        Self {
            refresh_token: previous.map(Secret::from),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn issued() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    fn credential(lifetime: u64, refresh: Option<&str>) -> Credential {
        Credential::new(
            "tok1",
            "Bearer",
            lifetime,
            refresh.map(Secret::from),
            None,
            issued(),
        )
    }

    #[test]
    fn buffer_forces_early_expiry() {
        let cred = credential(30, None);
        assert!(cred.is_expired(issued() + Duration::from_secs(25)));
        assert!(!cred.is_expired(issued() + Duration::from_secs(5)));
        assert_eq!(cred.seconds_until_expiration(issued() + Duration::from_secs(5)), 15);
    }

    #[test]
    fn exactly_at_buffer_boundary_is_expired() {
        let cred = credential(30, None);
        assert_eq!(cred.seconds_until_expiration(issued() + Duration::from_secs(20)), 0);
        assert!(cred.is_expired(issued() + Duration::from_secs(20)));
        assert!(!cred.is_expired(issued() + Duration::from_secs(19)));
    }

    #[test]
    fn clock_before_issue_counts_as_zero_elapsed() {
        let cred = credential(3600, None);
        let earlier = issued() - Duration::from_secs(600);
        assert_eq!(cred.seconds_until_expiration(earlier), 3590);
    }

    #[test]
    fn zero_lifetime_is_immediately_expired() {
        assert!(credential(0, None).is_expired(issued()));
    }

    #[test]
    fn expires_within_margin() {
        let cred = credential(3600, None);
        let now = issued() + Duration::from_secs(3000);
        assert!(!cred.is_expired(now));
        assert!(cred.expires_within(now, 600));
        assert!(!cred.expires_within(now, 500));
    }

    #[test]
    fn refresh_token_carry_over() {
        let fresh = credential(3600, None).or_refresh_token(Some("rt_old"));
        assert_eq!(fresh.refresh_token(), Some("rt_old"));

        let rotated = credential(3600, Some("rt_new")).or_refresh_token(Some("rt_old"));
        assert_eq!(rotated.refresh_token(), Some("rt_new"));

        let none = credential(3600, None).or_refresh_token(None);
        assert!(none.refresh_token().is_none());
    }

    #[test]
    fn authorization_header_uses_token_type() {
        assert_eq!(credential(60, None).authorization_header(), "Bearer tok1");
    }

    #[test]
    fn debug_hides_tokens() {
        let debug = format!("{:?}", credential(60, Some("rt_live")));
        assert!(!debug.contains("tok1"), "leaked: {debug}");
        assert!(!debug.contains("rt_live"), "leaked: {debug}");
    }
}
