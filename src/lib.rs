//! # openemr-client
//!
//! Async client for the OpenEMR REST API. It takes care of the whole
//! credential lifecycle so callers only ever see `get` and `post`:
//!
//! - OAuth2 client registration when no client id is configured
//! - token issuance through the password grant (as a staff user)
//! - transparent renewal through the refresh grant, falling back to a new
//!   password grant when the refresh token is rejected
//! - one re-authentication and retry when the API answers 401
//!
//! Failures come in two kinds: [`AuthError`] when the client cannot
//! authenticate, and [`ApiError`] (status + body, status 0 for transport
//! failures) when a data endpoint call fails.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use openemr_client::{Credentials, Endpoints, OpenEmrClient, Settings};
//!
//! # async fn run() -> openemr_client::Result<()> {
//! let settings = Settings::new(
//!     Endpoints::new("https://localhost:9300", "default")?,
//!     Credentials::new("admin", "pass").with_client("client-id", "client-secret"),
//! )
//! .with_verify_ssl(false);
//!
//! let client = OpenEmrClient::new(settings)?;
//! client.initialize().await?;
//!
//! let patients = client.get("/patient", &[("fname", "Phil")]).await?;
//! println!("{}", patients);
//! # Ok(())
//! # }
//! ```
//!
//! ## Shared client
//!
//! Most applications want one authenticated client per process:
//!
//! ```no_run
//! # async fn run() -> openemr_client::Result<()> {
//! let client = openemr_client::shared_client().await?;
//! let appointments = client.get("/appointment", &[]).await?;
//! # Ok(())
//! # }
//! ```

mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod rest;
pub mod shared;
pub mod time;
pub mod token;

// Re-export main types for convenience
pub use config::{Credentials, Endpoints, RegistrationMetadata, Settings, DEFAULT_SCOPES};
pub use error::{ApiError, AuthError, ConfigError, Error, Result};
pub use rest::OpenEmrClient;
pub use shared::{shared_client, SharedClient};
pub use time::{Clock, ManualClock, SystemClock};
pub use token::{TokenResponse, TokenStore};

// Re-export serde_json for convenience
pub use serde_json::json;
