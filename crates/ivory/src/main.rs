//! Ivory - a REST administration API for PostgreSQL.

mod routes;
mod server;

use anyhow::Context;
use clap::Parser;
use futures_util::FutureExt;
use ivory_core::logging::{init_logging, LogConfig};
use ivory_core::{AdminService, AppConfig, BackupService, ConnectionPool};
use server::{run_shutdown, shutdown_signal, ShutdownTask};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

#[derive(Debug, Parser)]
#[command(name = "ivory", version, about = "REST administration API for PostgreSQL")]
struct Args {
    /// YAML config file (defaults to ./local.yaml when present)
    #[arg(short, long, env = "IVORY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref()).context("load config")?;

    let _logging_guard = init_logging(LogConfig::from_settings(&config.app));

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Ivory");
    tracing::debug!(?config, "Configuration loaded");

    let connection = config.postgres.connection_config();
    let password = config.postgres.password();

    // Connecting may take several attempts; a signal during that wait stops cleanly
    let pool = tokio::select! {
        pool = ConnectionPool::connect(connection.clone(), password) => {
            pool.context("connect to postgres")?
        }
        _ = shutdown_signal() => {
            tracing::info!("Shutdown requested before postgres became available");
            return Ok(());
        }
    };

    let backups = BackupService::new(connection, password.map(str::to_string))
        .with_default_dir(config.backup.dir.clone())
        .with_tools(config.backup.tools());
    let service = Arc::new(AdminService::new(Arc::new(pool), backups));

    let app = routes::router(service.clone(), &config.server);
    let address = config.server.address();
    let listener =
        TcpListener::bind(&address).await.with_context(|| format!("bind {address}"))?;
    tracing::info!(address = %address, "HTTP server listening");

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut http = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await
    });

    let early_exit = tokio::select! {
        _ = shutdown_signal() => None,
        result = &mut http => Some(result),
    };

    let mut tasks: Vec<ShutdownTask> = Vec::new();
    if early_exit.is_none() {
        tasks.push((
            "http server",
            async move {
                let _ = stop_tx.send(());
                http.await?.context("http server")?;
                Ok::<(), anyhow::Error>(())
            }
            .boxed(),
        ));
    }
    tasks.push((
        "postgres",
        async move {
            service.close();
            Ok::<(), anyhow::Error>(())
        }
        .boxed(),
    ));

    let clean = run_shutdown(tasks, config.app.shutdown_timeout).await;

    match early_exit {
        Some(result) => {
            result.context("http server task")?.context("http server")?;
            anyhow::bail!("http server stopped unexpectedly");
        }
        None if !clean => anyhow::bail!("shutdown did not complete cleanly"),
        None => Ok(()),
    }
}
