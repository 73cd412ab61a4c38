use crate::error::ConfigError;
use std::fmt;
use std::time::Duration;
use url::Url;

/// Default OpenEMR server
pub const DEFAULT_BASE_URL: &str = "https://localhost:9300";

/// Default OpenEMR site (tenant database)
pub const DEFAULT_SITE: &str = "default";

/// End-to-end timeout applied to every outbound call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Scopes requested at registration and token issuance.
///
/// `openid` and `offline_access` are needed to get a refresh token,
/// `api:oemr` selects the native (non-FHIR) API and the `user/*` scopes
/// grant staff-level read access.
pub const DEFAULT_SCOPES: &str = "openid \
     offline_access \
     api:oemr \
     user/patient.read \
     user/allergy.read \
     user/medication.read \
     user/encounter.read \
     user/vital.read \
     user/medical_problem.read \
     user/appointment.read \
     user/practitioner.read \
     user/insurance.read";

/// Server URLs, derived once from the base URL and site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base_url: String,
    site: String,
    oauth_base: String,
    api_base: String,
}

impl Endpoints {
    /// Build the endpoint set for `base_url` and `site`.
    ///
    /// Trailing slashes on the base URL are ignored.
    pub fn new(base_url: &str, site: &str) -> Result<Self, ConfigError> {
        let base_url = base_url.trim_end_matches('/').to_string();

        let parsed = Url::parse(&base_url).map_err(|source| ConfigError::InvalidBaseUrl {
            url: base_url.clone(),
            source,
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::UnsupportedScheme(base_url));
        }

        Ok(Endpoints {
            oauth_base: format!("{}/oauth2/{}", base_url, site),
            api_base: format!("{}/apis/{}/api", base_url, site),
            site: site.to_string(),
            base_url,
        })
    }

    /// Server URL without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Site (tenant database) name
    pub fn site(&self) -> &str {
        &self.site
    }

    /// Base for the OAuth2 endpoints (`/registration`, `/token`)
    pub fn oauth_base(&self) -> &str {
        &self.oauth_base
    }

    /// Base for the data endpoints
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Dynamic client registration endpoint
    pub fn registration_url(&self) -> String {
        format!("{}/registration", self.oauth_base)
    }

    /// Token endpoint for the password and refresh grants
    pub fn token_url(&self) -> String {
        format!("{}/token", self.oauth_base)
    }

    /// Full URL for a data endpoint path such as `/patient`
    pub fn api_url(&self, endpoint: &str) -> String {
        format!("{}{}", self.api_base, endpoint)
    }
}

/// OAuth2 client and user credentials.
///
/// An empty `client_id` means the client registers itself on
/// initialization.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub scope: String,
}

impl Credentials {
    /// Create credentials for the given user, requesting [`DEFAULT_SCOPES`]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
            scope: DEFAULT_SCOPES.to_string(),
            ..Default::default()
        }
    }

    /// Set a pre-registered OAuth2 client
    pub fn with_client(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.client_id = client_id.into();
        self.client_secret = client_secret.into();
        self
    }

    /// Override the requested scope string
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Check if we have a client ID available
    pub fn has_client_id(&self) -> bool {
        !self.client_id.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("scope", &self.scope)
            .finish()
    }
}

/// Application metadata sent when registering a new OAuth2 client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationMetadata {
    pub application_type: String,
    pub client_name: String,
    pub redirect_uris: Vec<String>,
    pub token_endpoint_auth_method: String,
    pub contacts: Vec<String>,
}

impl Default for RegistrationMetadata {
    fn default() -> Self {
        RegistrationMetadata {
            application_type: "private".to_string(),
            client_name: "OpenEMR AI Agent".to_string(),
            redirect_uris: vec!["https://localhost:9300/callback".to_string()],
            token_endpoint_auth_method: "client_secret_post".to_string(),
            contacts: vec!["agent@openemr.local".to_string()],
        }
    }
}

/// Everything needed to construct a client
#[derive(Debug, Clone)]
pub struct Settings {
    pub endpoints: Endpoints,
    pub credentials: Credentials,
    pub registration: RegistrationMetadata,
    /// Verify the server's TLS certificate
    pub verify_ssl: bool,
    /// End-to-end timeout for every outbound call
    pub timeout: Duration,
}

impl Settings {
    /// Create settings for a server with the given credentials
    pub fn new(endpoints: Endpoints, credentials: Credentials) -> Self {
        Settings {
            endpoints,
            credentials,
            registration: RegistrationMetadata::default(),
            verify_ssl: true,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Load settings from the process environment.
    ///
    /// A `.env` file in the working directory (or a parent) is read first
    /// if present. Variables already set in the environment win.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let endpoints = Endpoints::new(
            &var("OPENEMR_BASE_URL", DEFAULT_BASE_URL),
            &var("OPENEMR_SITE", DEFAULT_SITE),
        )?;

        let credentials = Credentials {
            client_id: var("OPENEMR_CLIENT_ID", ""),
            client_secret: var("OPENEMR_CLIENT_SECRET", ""),
            username: var("OPENEMR_USERNAME", ""),
            password: var("OPENEMR_PASSWORD", ""),
            scope: var("OPENEMR_SCOPES", DEFAULT_SCOPES),
        };

        // Blank counts as unset so verification stays on
        let verify_ssl = match lookup("OPENEMR_SSL_VERIFY") {
            Some(value) if !value.trim().is_empty() => {
                parse_bool("OPENEMR_SSL_VERIFY", &value)?
            }
            _ => true,
        };

        Ok(Settings::new(endpoints, credentials).with_verify_ssl(verify_ssl))
    }

    /// Enable or disable TLS certificate verification
    pub fn with_verify_ssl(mut self, verify_ssl: bool) -> Self {
        self.verify_ssl = verify_ssl;
        self
    }

    /// Set the end-to-end request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the registration metadata
    pub fn with_registration(mut self, registration: RegistrationMetadata) -> Self {
        self.registration = registration;
        self
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            var,
            value: value.to_string(),
        }),
    }
}
