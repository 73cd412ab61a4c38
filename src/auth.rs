//! OAuth2 flows against the OpenEMR authorization server.
//!
//! Three requests are supported:
//! - dynamic client registration (only when no client id is configured)
//! - the password grant, authenticating as a staff user
//! - the refresh grant, exchanging the stored refresh token
//!
//! [`Authenticator::ensure_token`] is the single place that decides whether
//! the stored token is stale and which grant to use to renew it.

use crate::client::describe_transport_error;
use crate::config::{Credentials, Endpoints, RegistrationMetadata};
use crate::error::AuthError;
use crate::time::Clock;
use crate::token::{TokenResponse, TokenStore};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Mutable authentication state: the client registration and the tokens
/// issued to it. Owned by exactly one client.
#[derive(Debug, Clone)]
pub(crate) struct Session {
    pub credentials: Credentials,
    pub tokens: TokenStore,
}

impl Session {
    pub fn new(credentials: Credentials) -> Self {
        Session {
            credentials,
            tokens: TokenStore::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct RegistrationRequest<'a> {
    application_type: &'a str,
    client_name: &'a str,
    redirect_uris: &'a [String],
    token_endpoint_auth_method: &'a str,
    contacts: &'a [String],
    scope: &'a str,
}

#[derive(Debug, Deserialize)]
struct RegistrationResponse {
    client_id: String,
    #[serde(default)]
    client_secret: Option<String>,
}

/// Issues registration and token requests
#[derive(Debug, Clone)]
pub(crate) struct Authenticator {
    pub http: Client,
    pub endpoints: Endpoints,
    pub registration: RegistrationMetadata,
    pub clock: Arc<dyn Clock>,
}

impl Authenticator {
    /// Register a new OAuth2 client and store the issued id and secret
    /// in `credentials`.
    ///
    /// Clients requesting `user/*` scopes may be created disabled and need
    /// an administrator to enable them before the password grant succeeds.
    pub async fn register(&self, credentials: &mut Credentials) -> Result<(), AuthError> {
        let url = self.endpoints.registration_url();
        let payload = RegistrationRequest {
            application_type: &self.registration.application_type,
            client_name: &self.registration.client_name,
            redirect_uris: &self.registration.redirect_uris,
            token_endpoint_auth_method: &self.registration.token_endpoint_auth_method,
            contacts: &self.registration.contacts,
            scope: &credentials.scope,
        };

        let response = self
            .http
            .post(&url)
            .header("Accept", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| AuthError::RegistrationTransport(describe_transport_error(&e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::RegistrationTransport(describe_transport_error(&e)))?;

        if !status.is_success() {
            return Err(AuthError::RegistrationRejected {
                status: status.as_u16(),
                body,
            });
        }

        let registered: RegistrationResponse =
            serde_json::from_str(&body).map_err(|e| AuthError::MalformedResponse {
                endpoint: "registration",
                detail: e.to_string(),
            })?;

        credentials.client_id = registered.client_id;
        credentials.client_secret = registered.client_secret.unwrap_or_default();

        tracing::info!(
            client_id = %credentials.client_id,
            "Registered OAuth2 client (it may need approval under Admin > System > API Clients)"
        );

        Ok(())
    }

    /// Obtain a token with the password grant, authenticating as staff
    pub async fn password_grant(&self, session: &mut Session) -> Result<DateTime<Utc>, AuthError> {
        let creds = &session.credentials;
        let form = [
            ("grant_type", "password"),
            ("client_id", creds.client_id.as_str()),
            ("client_secret", creds.client_secret.as_str()),
            ("username", creds.username.as_str()),
            ("password", creds.password.as_str()),
            ("scope", creds.scope.as_str()),
            ("user_role", "users"),
        ];

        let token = self.token_request(&form).await?;
        Ok(self.store(&mut session.tokens, token, "password"))
    }

    /// Renew the access token with the stored refresh token.
    ///
    /// Every failure is reported as [`AuthError::RefreshFailed`].
    pub async fn refresh_grant(&self, session: &mut Session) -> Result<DateTime<Utc>, AuthError> {
        let creds = &session.credentials;
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", creds.client_id.as_str()),
            ("client_secret", creds.client_secret.as_str()),
            ("refresh_token", session.tokens.refresh_token()),
        ];

        let token = self
            .token_request(&form)
            .await
            .map_err(|e| AuthError::RefreshFailed(Box::new(e)))?;
        Ok(self.store(&mut session.tokens, token, "refresh_token"))
    }

    /// Make sure `session` holds an access token that is not stale.
    ///
    /// A stale token is renewed with the refresh grant when a refresh token
    /// is held. If that fails, a password grant follows. Without a refresh
    /// token the password grant is used directly.
    pub async fn ensure_token(&self, session: &mut Session) -> Result<(), AuthError> {
        if !session.tokens.is_stale(self.clock.now()) {
            return Ok(());
        }

        if !session.tokens.has_refresh_token() {
            tracing::info!("No token held, authenticating");
            self.password_grant(session).await?;
            return Ok(());
        }

        tracing::info!("Access token expired, refreshing");
        let refresh = match self.refresh_grant(session).await {
            Ok(_) => return Ok(()),
            Err(e) => e,
        };

        tracing::warn!(error = %refresh, "Token refresh failed, falling back to password grant");
        match self.password_grant(session).await {
            Ok(_) => Ok(()),
            Err(source) => Err(AuthError::ReauthFailed {
                refresh: Box::new(refresh),
                source: Box::new(source),
            }),
        }
    }

    /// POST a form-encoded grant to the token endpoint and parse the reply
    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, AuthError> {
        let response = self
            .http
            .post(self.endpoints.token_url())
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| AuthError::TokenTransport(describe_transport_error(&e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::TokenTransport(describe_transport_error(&e)))?;

        if !status.is_success() {
            return Err(AuthError::TokenRejected {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| AuthError::MalformedResponse {
            endpoint: "token",
            detail: e.to_string(),
        })
    }

    fn store(&self, tokens: &mut TokenStore, token: TokenResponse, grant: &str) -> DateTime<Utc> {
        let lifetime = token.lifetime_secs();
        let expires_at = tokens.store(token, self.clock.now());
        tracing::debug!(
            grant,
            lifetime,
            expires_at = %expires_at.to_rfc3339(),
            "Token acquired"
        );
        expires_at
    }
}
