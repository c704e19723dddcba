use anyhow::Context;
use clap::Parser;
use reviewer_service::config::{Env, Settings, StoreKind};
use reviewer_service::db;
use reviewer_service::services::http_server;
use reviewer_service::store::{MemoryStore, SqliteStore};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Pull request reviewer assignment service
#[derive(Parser, Debug)]
#[command(name = "reviewer-service", version, about)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, env = "CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Override the listen host
    #[arg(long, env = "REVIEWER_HOST")]
    host: Option<String>,

    /// Override the listen port
    #[arg(short, long, env = "REVIEWER_PORT")]
    port: Option<u16>,
}

fn init_logging(env: Env) {
    let default_directives = match env {
        Env::Prod => "info",
        Env::Local | Env::Dev => "debug,sqlx=warn",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    match env {
        Env::Local => registry.with(tracing_subscriber::fmt::layer()).init(),
        Env::Dev | Env::Prod => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings =
        Settings::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(host) = cli.host {
        settings.http_server.host = host;
    }
    if let Some(port) = cli.port {
        settings.http_server.port = port;
    }

    init_logging(settings.env);
    log::info!(
        "[main] Starting reviewer-service env={:?} store={:?}",
        settings.env,
        settings.datasource.kind
    );

    let cancel = CancellationToken::new();
    tokio::spawn(http_server::shutdown_on_signal(cancel.clone()));

    match settings.datasource.kind {
        StoreKind::Sqlite => {
            let pool = db::initialize(&settings.datasource.path, &settings.datasource)
                .await
                .with_context(|| {
                    format!(
                        "failed to open database {}",
                        settings.datasource.path.display()
                    )
                })?;
            let store = Arc::new(SqliteStore::new(pool.clone()));

            http_server::run(store, &settings.http_server, cancel)
                .await
                .context("HTTP server failed")?;

            pool.close().await;
        }
        StoreKind::Memory => {
            http_server::run(Arc::new(MemoryStore::new()), &settings.http_server, cancel)
                .await
                .context("HTTP server failed")?;
        }
    }

    log::info!("[main] Shutdown complete");
    Ok(())
}
