use thiserror::Error;

/// Failure to register the OAuth2 client or to obtain an access token.
///
/// Always fatal to the in-flight operation. The one designed fallback
/// (refresh failure followed by a password grant) is expressed by the
/// [`AuthError::RefreshFailed`] and [`AuthError::ReauthFailed`] variants.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Registration endpoint answered with a non-success status
    #[error("client registration failed (HTTP {status}): {body}")]
    RegistrationRejected { status: u16, body: String },

    /// Registration request never got an answer
    #[error("client registration request failed: {0}")]
    RegistrationTransport(String),

    /// Token endpoint answered with a non-success status
    #[error("token request failed (HTTP {status}): {body}")]
    TokenRejected { status: u16, body: String },

    /// Token request never got an answer
    #[error("token request failed: {0}")]
    TokenTransport(String),

    /// Auth endpoint answered 2xx with a body we could not use
    #[error("malformed {endpoint} response: {detail}")]
    MalformedResponse {
        endpoint: &'static str,
        detail: String,
    },

    /// Refresh grant failed; the caller is expected to fall back to a
    /// password grant
    #[error("token refresh failed: {0}")]
    RefreshFailed(#[source] Box<AuthError>),

    /// Refresh grant failed and the password-grant fallback failed too
    #[error("re-authentication failed after refresh error ({refresh}): {source}")]
    ReauthFailed {
        refresh: Box<AuthError>,
        #[source]
        source: Box<AuthError>,
    },
}

impl AuthError {
    /// HTTP status reported by the auth server, if it answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::RegistrationRejected { status, .. }
            | AuthError::TokenRejected { status, .. } => Some(*status),
            AuthError::RefreshFailed(inner) => inner.status(),
            AuthError::ReauthFailed { source, .. } => source.status(),
            _ => None,
        }
    }
}

/// Data endpoint call that did not end in a 2xx status.
///
/// `status` is 0 when the request failed at the transport level
/// (connection refused, timeout, TLS error).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("HTTP {status}: {detail}")]
pub struct ApiError {
    pub status: u16,
    pub detail: String,
}

impl ApiError {
    /// Create a new API error
    pub fn new(status: u16, detail: impl Into<String>) -> Self {
        ApiError {
            status,
            detail: detail.into(),
        }
    }

    /// Create an error for a request that never got a response
    pub fn transport(detail: impl Into<String>) -> Self {
        Self::new(0, detail)
    }

    /// Check if the request failed before any response was received
    pub fn is_transport(&self) -> bool {
        self.status == 0
    }

    /// Check if this error is an authorization failure (401)
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Check if this error is a permission denied error (403)
    pub fn is_permission_denied(&self) -> bool {
        self.status == 403
    }

    /// Check if this error is a not found error (404)
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

/// Problem with the settings a client is constructed from
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid base URL {url:?}: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("base URL {0:?} must use http or https")]
    UnsupportedScheme(String),

    #[error("invalid value {value:?} for {var}: expected true or false")]
    InvalidBool { var: &'static str, value: String },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Main error type for client operations
#[derive(Debug, Error)]
pub enum Error {
    /// Registration or token issuance failed
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Data endpoint call failed
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Client could not be constructed
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// Get the HTTP status code carried by this error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Auth(e) => e.status(),
            Error::Api(e) => Some(e.status),
            Error::Config(_) => None,
        }
    }

    /// Check if this error came from the authentication flows
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Auth(_))
    }

    /// Borrow the API error, if this is one
    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            Error::Api(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_helpers() {
        assert!(ApiError::new(403, "forbidden").is_permission_denied());
        assert!(ApiError::new(404, "missing").is_not_found());
        assert!(ApiError::new(401, "nope").is_unauthorized());
        assert!(ApiError::transport("connection refused").is_transport());
        assert!(!ApiError::new(500, "boom").is_transport());
    }

    #[test]
    fn test_api_error_display() {
        let err = ApiError::new(500, "Internal Server Error");
        assert_eq!(err.to_string(), "HTTP 500: Internal Server Error");
    }

    #[test]
    fn test_auth_error_status_through_fallback() {
        let refresh = AuthError::RefreshFailed(Box::new(AuthError::TokenRejected {
            status: 400,
            body: "invalid_grant".to_string(),
        }));
        assert_eq!(refresh.status(), Some(400));

        let reauth = AuthError::ReauthFailed {
            refresh: Box::new(refresh),
            source: Box::new(AuthError::TokenRejected {
                status: 401,
                body: "bad credentials".to_string(),
            }),
        };
        assert_eq!(reauth.status(), Some(401));
        assert!(reauth.to_string().contains("invalid_grant"));
        assert!(reauth.to_string().contains("bad credentials"));

        assert_eq!(AuthError::TokenTransport("timeout".to_string()).status(), None);
    }

    #[test]
    fn test_error_kinds_are_distinct() {
        let auth: Error = AuthError::TokenRejected {
            status: 401,
            body: "denied".to_string(),
        }
        .into();
        let api: Error = ApiError::new(401, "denied").into();

        assert!(auth.is_auth());
        assert!(auth.as_api().is_none());
        assert!(!api.is_auth());
        assert_eq!(api.as_api().map(|e| e.status), Some(401));
        assert_eq!(auth.status_code(), Some(401));
    }
}
