//! Process-wide client shared by every caller.
//!
//! The first caller constructs and initializes the client. Callers that
//! arrive while that is in progress wait for it and receive the same
//! instance, so at most one client (and one connection pool) exists.
//! When initialization fails the slot stays empty, the half-built client
//! is dropped and the next caller starts over.

use crate::config::Settings;
use crate::error::Result;
use crate::rest::OpenEmrClient;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Lazily-initialized slot holding one shared [`OpenEmrClient`]
#[derive(Debug, Default)]
pub struct SharedClient {
    cell: OnceCell<Arc<OpenEmrClient>>,
}

impl SharedClient {
    /// Create an empty slot
    pub const fn new() -> Self {
        SharedClient {
            cell: OnceCell::const_new(),
        }
    }

    /// Return the shared client, building it from `settings` and
    /// initializing it if this is the first call.
    ///
    /// `settings` is only evaluated by the caller that performs the
    /// construction.
    pub async fn get_or_init<F>(&self, settings: F) -> Result<Arc<OpenEmrClient>>
    where
        F: FnOnce() -> Result<Settings>,
    {
        self.get_or_init_with(move || OpenEmrClient::new(settings()?))
            .await
    }

    /// Like [`SharedClient::get_or_init`], with full control over how the
    /// client is built (for example to install a custom clock)
    pub async fn get_or_init_with<F>(&self, build: F) -> Result<Arc<OpenEmrClient>>
    where
        F: FnOnce() -> Result<OpenEmrClient>,
    {
        let client = self
            .cell
            .get_or_try_init(move || async move {
                let client = build()?;
                client.initialize().await?;
                tracing::info!(
                    api_base = %client.endpoints().api_base(),
                    "Shared OpenEMR client initialized"
                );
                Ok::<_, crate::error::Error>(Arc::new(client))
            })
            .await?;

        Ok(Arc::clone(client))
    }

    /// The shared client, if it has been initialized
    pub fn get(&self) -> Option<Arc<OpenEmrClient>> {
        self.cell.get().cloned()
    }
}

static SHARED: SharedClient = SharedClient::new();

/// Get or create the process-wide client configured from the environment
pub async fn shared_client() -> Result<Arc<OpenEmrClient>> {
    SHARED.get_or_init(|| Ok(Settings::from_env()?)).await
}
