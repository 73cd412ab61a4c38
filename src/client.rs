use crate::config::Settings;
use crate::error::ConfigError;
use reqwest::{Client, ClientBuilder};
use std::time::Duration;

/// Create the HTTP client shared by the auth flows and data requests,
/// with connection pooling and one end-to-end timeout for every call
pub fn create_http_client(settings: &Settings) -> Result<Client, ConfigError> {
    let client = ClientBuilder::new()
        .pool_max_idle_per_host(10)
        .timeout(settings.timeout)
        .connect_timeout(Duration::from_secs(10).min(settings.timeout))
        .danger_accept_invalid_certs(!settings.verify_ssl)
        .user_agent(concat!("openemr-client/", env!("CARGO_PKG_VERSION")))
        .build()?;

    Ok(client)
}

/// Render a reqwest transport failure, naming timeouts explicitly
pub(crate) fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("timed out: {}", err)
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Credentials, Endpoints};

    #[test]
    fn test_create_http_client() {
        let settings = Settings::new(
            Endpoints::new("https://localhost:9300", "default").unwrap(),
            Credentials::new("admin", "pass"),
        )
        .with_verify_ssl(false)
        .with_timeout(Duration::from_secs(5));

        assert!(create_http_client(&settings).is_ok());
    }
}
