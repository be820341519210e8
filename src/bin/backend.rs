#![forbid(unsafe_code)]

//! HTTP backend: users, videos, engagement, playlists and the sprite upload
//! endpoint, all backed by a local libsql database.

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result, anyhow};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vidhub::api::{AppState, router};
use vidhub::config::{RuntimeOverrides, resolve_runtime_config};
use vidhub::media_host::HttpMediaHost;
use vidhub::store::Store;

/// Command-line overrides. Anything left unset falls back to the environment,
/// then `.env`, then the built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct BackendArgs {
    database_path: Option<PathBuf>,
    port: Option<u16>,
    host: Option<IpAddr>,
}

impl BackendArgs {
    fn parse() -> Result<Self> {
        Self::from_iter(std::env::args().skip(1))
    }

    fn from_iter<I>(iter: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = Self::default();
        let mut args = iter.into_iter();
        while let Some(arg) = args.next() {
            if let Some(value) = arg.strip_prefix("--database=") {
                parsed.database_path = Some(PathBuf::from(value));
                continue;
            }
            if let Some(value) = arg.strip_prefix("--port=") {
                parsed.port = Some(parse_port_arg(value)?);
                continue;
            }
            if let Some(value) = arg.strip_prefix("--host=") {
                parsed.host = Some(parse_host_arg(value)?);
                continue;
            }

            match arg.as_str() {
                "--database" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--database requires a value"))?;
                    parsed.database_path = Some(PathBuf::from(value));
                }
                "--port" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--port requires a value"))?;
                    parsed.port = Some(parse_port_arg(&value)?);
                }
                "--host" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--host requires a value"))?;
                    parsed.host = Some(parse_host_arg(&value)?);
                }
                _ => return Err(anyhow!("unknown argument: {arg}")),
            }
        }
        Ok(parsed)
    }

    fn overrides(&self) -> RuntimeOverrides {
        RuntimeOverrides {
            database_path: self.database_path.clone(),
            vidhub_port: self.port,
            vidhub_host: self.host.map(|host| host.to_string()),
            ..RuntimeOverrides::default()
        }
    }
}

fn parse_port_arg(value: &str) -> Result<u16> {
    value
        .parse::<u16>()
        .context("expected a numeric port between 0 and 65535")
}

fn parse_host_arg(value: &str) -> Result<IpAddr> {
    value
        .parse::<IpAddr>()
        .context("expected a valid IPv4 or IPv6 address for --host/VIDHUB_HOST")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = BackendArgs::parse()?;
    let config = resolve_runtime_config(args.overrides())?;
    let host = parse_host_arg(&config.vidhub_host)?;

    let store = Store::open(&config.database_path)
        .await
        .with_context(|| format!("opening database {}", config.database_path.display()))?;
    let media = HttpMediaHost::new(config.media_host.clone(), config.request_timeout)
        .context("building media host client")?;

    let app = router(AppState {
        store: Arc::new(store),
        media: Arc::new(media),
    });

    let addr = SocketAddr::new(host, config.vidhub_port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    info!(%addr, database = %config.database_path.display(), "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    // Only graceful shutdown is affected; Ctrl+C still terminates the process.
    if let Err(err) = signal::ctrl_c().await {
        error!("failed to install Ctrl+C handler: {err}");
    }
}
