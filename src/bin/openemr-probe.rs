//! Check connectivity and credentials against an OpenEMR server.
//!
//! Reads the same `OPENEMR_*` variables as the library, authenticates,
//! performs one request and prints the JSON response.

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Authenticate against OpenEMR and call one API endpoint
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// API path relative to the site API base, e.g. /patient
    path: String,

    /// Query parameter as key=value (repeatable)
    #[arg(short, long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Send a POST with this JSON body instead of a GET
    #[arg(long, value_name = "JSON")]
    post: Option<String>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

fn parse_param(raw: &str) -> Result<(&str, &str)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => bail!("invalid parameter {:?}, expected key=value", raw),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let client = openemr_client::shared_client()
        .await
        .context("Failed to initialize OpenEMR client")?;

    let response = match args.post {
        Some(ref body) => {
            let body: serde_json::Value =
                serde_json::from_str(body).context("--post must be valid JSON")?;
            client.post(&args.path, &body).await
        }
        None => {
            let params = args
                .params
                .iter()
                .map(|p| parse_param(p))
                .collect::<Result<Vec<_>>>()?;
            client.get(&args.path, &params).await
        }
    }
    .with_context(|| format!("Request to {} failed", args.path))?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param("fname=Phil").unwrap(), ("fname", "Phil"));
        assert_eq!(parse_param("q=a=b").unwrap(), ("q", "a=b"));
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from(["openemr-probe", "/patient", "-p", "fname=Phil"]).unwrap();
        assert_eq!(args.path, "/patient");
        assert_eq!(args.params, vec!["fname=Phil"]);
        assert!(args.post.is_none());
    }
}
