use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::fmt;

/// Seconds subtracted from the server-declared lifetime so a token is
/// treated as stale before it really expires.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

/// Lifetime assumed when the token endpoint omits `expires_in` (or sends 0)
pub const DEFAULT_LIFETIME_SECS: i64 = 3600;

/// Upper bound applied to server-declared lifetimes
pub const MAX_LIFETIME_SECS: i64 = i32::MAX as i64;

/// Body returned by the OAuth2 token endpoint for both the password and
/// refresh grants.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Access token for API requests
    pub access_token: String,

    /// Refresh token, omitted by some servers on refresh
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Declared lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,

    #[serde(default)]
    pub token_type: Option<String>,

    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Declared lifetime, falling back to [`DEFAULT_LIFETIME_SECS`] when
    /// absent or non-positive and capped at [`MAX_LIFETIME_SECS`]
    pub fn lifetime_secs(&self) -> i64 {
        match self.expires_in {
            Some(secs) if secs > 0 => secs.min(MAX_LIFETIME_SECS),
            _ => DEFAULT_LIFETIME_SECS,
        }
    }
}

/// In-memory holder of the current access token, refresh token and expiry.
///
/// Starts empty and is overwritten as a whole by every successful token
/// response. Never persisted.
#[derive(Clone, Default)]
pub struct TokenStore {
    access_token: String,
    refresh_token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl TokenStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored token with a freshly issued one.
    ///
    /// The previous refresh token is kept when the response omits one.
    /// Returns the computed expiry instant.
    pub fn store(&mut self, response: TokenResponse, issued_at: DateTime<Utc>) -> DateTime<Utc> {
        let lifetime = response.lifetime_secs();
        let expires_at = issued_at
            .checked_add_signed(Duration::seconds(lifetime - EXPIRY_MARGIN_SECS))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        self.access_token = response.access_token;
        if let Some(refresh) = response.refresh_token.filter(|r| !r.is_empty()) {
            self.refresh_token = refresh;
        }
        self.expires_at = Some(expires_at);

        expires_at
    }

    /// True when there is no access token or `now` is at or past the expiry
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        if self.access_token.is_empty() {
            return true;
        }
        self.expires_at.map_or(true, |exp| now >= exp)
    }

    /// Current access token (empty if none has been issued)
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Current refresh token (empty if none has been issued)
    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    /// Check if we have an access token available
    pub fn has_access_token(&self) -> bool {
        !self.access_token.is_empty()
    }

    /// Check if we have a refresh token available
    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    /// Expiry instant with the safety margin already applied
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore")
            .field("has_access_token", &self.has_access_token())
            .field("has_refresh_token", &self.has_refresh_token())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(access: &str, refresh: Option<&str>, expires_in: Option<i64>) -> TokenResponse {
        TokenResponse {
            access_token: access.to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_in,
            token_type: Some("Bearer".to_string()),
            scope: None,
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_empty_store_is_stale() {
        let store = TokenStore::new();
        assert!(store.is_stale(at(0)));
        assert!(!store.has_access_token());
        assert!(!store.has_refresh_token());
        assert_eq!(store.expires_at(), None);
    }

    #[test]
    fn test_expiry_subtracts_margin() {
        let mut store = TokenStore::new();
        let issued = at(1_000_000);
        let expires_at = store.store(response("t1", Some("r1"), Some(3600)), issued);

        assert_eq!(expires_at, issued + Duration::seconds(3540));
        assert_eq!(store.access_token(), "t1");
        assert_eq!(store.refresh_token(), "r1");
    }

    #[test]
    fn test_missing_or_zero_lifetime_uses_default() {
        let issued = at(1_000_000);

        for expires_in in [None, Some(0), Some(-5)] {
            let mut store = TokenStore::new();
            let expires_at = store.store(response("t", None, expires_in), issued);
            assert_eq!(
                expires_at,
                issued + Duration::seconds(DEFAULT_LIFETIME_SECS - EXPIRY_MARGIN_SECS),
                "expires_in={:?}",
                expires_in
            );
        }
    }

    #[test]
    fn test_huge_lifetime_is_capped() {
        let mut store = TokenStore::new();
        let issued = at(1_700_000_000);
        let expires_at = store.store(response("t1", None, Some(100_000_000_000_000)), issued);

        assert_eq!(
            expires_at,
            issued + Duration::seconds(MAX_LIFETIME_SECS - EXPIRY_MARGIN_SECS)
        );
        assert!(!store.is_stale(issued));

        let expires_at = store.store(response("t2", None, Some(i64::MAX)), issued);
        assert!(expires_at > issued);
    }

    #[test]
    fn test_expiry_saturates_near_max_instant() {
        let mut store = TokenStore::new();
        let issued = DateTime::<Utc>::MAX_UTC - Duration::seconds(10);
        let expires_at = store.store(response("t1", None, Some(3600)), issued);

        assert_eq!(expires_at, DateTime::<Utc>::MAX_UTC);
        assert_eq!(store.access_token(), "t1");
    }

    #[test]
    fn test_staleness_boundary() {
        let mut store = TokenStore::new();
        let issued = at(1_000_000);
        let expires_at = store.store(response("t1", None, Some(120)), issued);

        assert!(!store.is_stale(expires_at - Duration::seconds(1)));
        assert!(store.is_stale(expires_at));
        assert!(store.is_stale(expires_at + Duration::seconds(1)));
    }

    #[test]
    fn test_refresh_token_retained_when_omitted() {
        let mut store = TokenStore::new();
        store.store(response("t1", Some("r1"), None), at(0));
        store.store(response("t2", None, None), at(10));
        assert_eq!(store.access_token(), "t2");
        assert_eq!(store.refresh_token(), "r1");

        store.store(response("t3", Some("r3"), None), at(20));
        assert_eq!(store.refresh_token(), "r3");
    }

    #[test]
    fn test_token_response_deserialization() {
        let parsed: TokenResponse = serde_json::from_str(
            r#"{"access_token":"abc","token_type":"Bearer","scope":"openid"}"#,
        )
        .unwrap();
        assert_eq!(parsed.access_token, "abc");
        assert_eq!(parsed.refresh_token, None);
        assert_eq!(parsed.lifetime_secs(), DEFAULT_LIFETIME_SECS);
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let mut store = TokenStore::new();
        store.store(response("secret-access", Some("secret-refresh"), None), at(0));
        let debug = format!("{:?}", store);
        assert!(!debug.contains("secret-access"));
        assert!(!debug.contains("secret-refresh"));
    }
}
