use anyhow::{bail, Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use opensubtitles::api::{CorrelationId, RateLimitRecorder};
use opensubtitles::config::ConfigManager;
use opensubtitles::{ClientBuilder, Params};

const ENV_USERNAME: &str = "OPENSUBTITLES_USERNAME";
const ENV_PASSWORD: &str = "OPENSUBTITLES_PASSWORD";

/// Parses `key=value` arguments into query parameters
fn parse_params(args: impl IntoIterator<Item = String>) -> Result<Params> {
    let mut params = Params::new();
    for arg in args {
        let Some((key, value)) = arg.split_once('=') else {
            bail!("Expected key=value, got {arg:?}");
        };
        if key.is_empty() {
            bail!("Empty parameter name in {arg:?}");
        }
        params.insert(key, value);
    }
    Ok(params)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let params = parse_params(std::env::args().skip(1))?;
    if params.is_empty() {
        bail!("Usage: opensubtitles key=value [key=value ...]  (e.g. query=\"the matrix\" languages=en)");
    }

    let config = ConfigManager::new()?.get();
    let rate_limits = RateLimitRecorder::new();
    let client = ClientBuilder::from_config(&config)
        .request_interceptor(CorrelationId)
        .response_interceptor(rate_limits.clone())
        .build()
        .context("Failed to create client (is OPENSUBTITLES_API_KEY set?)")?;

    if let (Ok(username), Ok(password)) = (std::env::var(ENV_USERNAME), std::env::var(ENV_PASSWORD)) {
        client
            .login(&username, &password)
            .await
            .context("Login failed")?;
    }

    let result = client.subtitles(params).await;
    client.close();
    let data = result.context("Subtitle search failed")?;

    if let Some(snapshot) = rate_limits.latest() {
        tracing::info!(
            remaining = ?snapshot.remaining,
            reset_secs = ?snapshot.reset_secs,
            "Rate limit"
        );
    }

    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}
