use crate::auth::{Authenticator, Session};
use crate::client::{create_http_client, describe_transport_error};
use crate::config::{Endpoints, Settings};
use crate::error::{ApiError, Result};
use crate::time::{Clock, SystemClock};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Authenticated client for the OpenEMR REST API.
///
/// Owns its HTTP connection pool, its credentials and its token state.
/// All methods take `&self`; token state sits behind an async mutex so one
/// client can be shared between tasks (usually through an `Arc`).
#[derive(Debug)]
pub struct OpenEmrClient {
    auth: Authenticator,
    session: Mutex<Session>,
}

/// Body or query of an outgoing data request
enum Payload<'a> {
    Query(&'a [(&'a str, &'a str)]),
    Json(&'a Value),
}

impl OpenEmrClient {
    /// Create a client from explicit settings. No network traffic happens
    /// until [`OpenEmrClient::initialize`] or the first request.
    pub fn new(settings: Settings) -> Result<Self> {
        let http = create_http_client(&settings)?;

        Ok(OpenEmrClient {
            auth: Authenticator {
                http,
                endpoints: settings.endpoints,
                registration: settings.registration,
                clock: Arc::new(SystemClock),
            },
            session: Mutex::new(Session::new(settings.credentials)),
        })
    }

    /// Create a client from the process environment
    pub fn from_env() -> Result<Self> {
        Self::new(Settings::from_env()?)
    }

    /// Use a different clock for token expiry
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.auth.clock = clock;
        self
    }

    /// Register the OAuth2 client if no client id is configured, then
    /// obtain the first token with the password grant.
    pub async fn initialize(&self) -> Result<()> {
        let mut session = self.session.lock().await;

        if !session.credentials.has_client_id() {
            tracing::info!("No client_id configured, attempting auto-registration");
            self.auth.register(&mut session.credentials).await?;
        }
        self.auth.password_grant(&mut session).await?;

        Ok(())
    }

    /// Release the underlying connection pool
    pub fn close(self) {
        tracing::debug!(base_url = %self.auth.endpoints.base_url(), "Closing OpenEMR client");
        drop(self);
    }

    /// Server URLs this client talks to
    pub fn endpoints(&self) -> &Endpoints {
        &self.auth.endpoints
    }

    /// Current OAuth2 client id (empty before registration)
    pub async fn client_id(&self) -> String {
        self.session.lock().await.credentials.client_id.clone()
    }

    /// Check if the client holds an access token that is not yet stale
    pub async fn has_valid_token(&self) -> bool {
        !self.session.lock().await.tokens.is_stale(self.auth.clock.now())
    }

    /// Authenticated GET of `endpoint` (e.g. `/patient`) with query parameters
    pub async fn get(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Value> {
        self.get_as(endpoint, params).await
    }

    /// Authenticated POST of a JSON body to `endpoint`
    pub async fn post<B>(&self, endpoint: &str, body: &B) -> Result<Value>
    where
        B: Serialize + ?Sized,
    {
        self.post_as(endpoint, body).await
    }

    /// GET and deserialize the JSON response into `T`
    pub async fn get_as<T>(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.request(Method::GET, endpoint, Payload::Query(params)).await
    }

    /// POST `body` as JSON and deserialize the response into `T`
    pub async fn post_as<T, B>(&self, endpoint: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        // Nothing is sent when the body cannot be encoded, hence status 0
        let body = serde_json::to_value(body)
            .map_err(|e| ApiError::transport(format!("could not encode request body: {}", e)))?;
        self.request(Method::POST, endpoint, Payload::Json(&body)).await
    }

    /// Shared request routine behind `get` and `post`.
    ///
    /// Ensures a fresh token, sends the request, and on a 401 re-authenticates
    /// with the password grant and resends exactly once.
    async fn request<T>(&self, method: Method, endpoint: &str, payload: Payload<'_>) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let token = {
            let mut session = self.session.lock().await;
            self.auth.ensure_token(&mut session).await?;
            session.tokens.access_token().to_string()
        };

        let url = self.auth.endpoints.api_url(endpoint);
        let start = std::time::Instant::now();

        let mut response = self.send(&method, &url, &payload, &token).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::warn!(%method, %url, "Got 401, retrying with a fresh token");

            let token = {
                let mut session = self.session.lock().await;
                self.auth.password_grant(&mut session).await?;
                session.tokens.access_token().to_string()
            };
            response = self.send(&method, &url, &payload, &token).await?;
        }

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ApiError::transport(format!(
                "Reading response from {} failed: {}",
                url,
                describe_transport_error(&e)
            ))
        })?;

        tracing::debug!(
            %method,
            %url,
            status = status.as_u16(),
            elapsed = ?start.elapsed(),
            "Request completed"
        );

        if status.is_client_error() || status.is_server_error() {
            return Err(ApiError::new(status.as_u16(), body).into());
        }

        // An empty 2xx body (e.g. 204) reads as JSON null
        let json = if body.trim().is_empty() { "null" } else { body.as_str() };
        serde_json::from_str(json).map_err(|e| {
            ApiError::new(status.as_u16(), format!("invalid JSON response: {}", e)).into()
        })
    }

    async fn send(
        &self,
        method: &Method,
        url: &str,
        payload: &Payload<'_>,
        token: &str,
    ) -> std::result::Result<reqwest::Response, ApiError> {
        let mut request = self
            .auth
            .http
            .request(method.clone(), url)
            .bearer_auth(token)
            .header("Accept", "application/json");

        request = match payload {
            Payload::Query(params) if !params.is_empty() => request.query(params),
            Payload::Query(_) => request,
            Payload::Json(body) => request.json(body),
        };

        request.send().await.map_err(|e| {
            ApiError::transport(format!(
                "Request to {} failed: {}",
                url,
                describe_transport_error(&e)
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;

    fn settings(base_url: &str) -> Settings {
        Settings::new(
            Endpoints::new(base_url, "default").unwrap(),
            Credentials::new("admin", "pass").with_client("cid", "secret"),
        )
    }

    #[test]
    fn test_client_creation() {
        let client = OpenEmrClient::new(settings("https://localhost:9300")).unwrap();
        assert_eq!(
            client.endpoints().api_base(),
            "https://localhost:9300/apis/default/api"
        );
    }

    #[tokio::test]
    async fn test_new_client_has_no_token() {
        let client = OpenEmrClient::new(settings("http://localhost:9300")).unwrap();
        assert!(!client.has_valid_token().await);
        assert_eq!(client.client_id().await, "cid");
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_authentication() {
        // Nothing listens on port 9 (discard) on a test machine
        let client = OpenEmrClient::new(settings("http://127.0.0.1:9")).unwrap();
        let err = client.get("/patient", &[]).await.unwrap_err();

        // The token request fails first, at the transport level
        assert!(err.is_auth());
        assert_eq!(err.status_code(), None);
    }
}
