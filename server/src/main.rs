mod ingest;
mod store;

use anyhow::{bail, Context, Result};
use ingest::AppState;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Collector settings, read from the environment at startup
#[derive(Debug, Clone)]
struct CollectorConfig {
    bind: String,
    api_key: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".into(),
            api_key: String::new(),
        }
    }
}

impl CollectorConfig {
    fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(bind) = std::env::var("COLLECTOR_BIND") {
            config.bind = bind;
        }
        config.api_key = std::env::var("COLLECTOR_API_KEY").unwrap_or_default();
        if config.api_key.is_empty() {
            bail!("COLLECTOR_API_KEY must be set");
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = CollectorConfig::from_env()?;
    let app = ingest::router(AppState::new(&config.api_key));

    let listener = TcpListener::bind(config.bind.as_str())
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    info!("Collector listening on {}", config.bind);

    axum::serve(listener, app).await?;
    Ok(())
}
