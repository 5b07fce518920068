use anyhow::Context;
use clap::Parser;
use memgate::{Gateway, GatewayConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "memgate", version, about = "Multi-tenant SQL gateway over in-memory SQLite")]
struct Args {
    /// Address the HTTP server listens on
    #[arg(long, env = "MEMGATE_LISTEN", default_value = "0.0.0.0:6000")]
    listen: String,

    /// SQLite file holding the replicated write log
    #[arg(long, env = "MEMGATE_STORE", default_value = "./memgate.logs.sqlite3")]
    store: PathBuf,

    /// Milliseconds between write-ahead log drains
    #[arg(long, env = "MEMGATE_DRAIN_INTERVAL_MS", default_value_t = 5000)]
    drain_interval_ms: u64,

    /// Maximum records persisted per drain
    #[arg(long, env = "MEMGATE_DRAIN_BATCH_SIZE", default_value_t = 1000)]
    drain_batch_size: usize,

    /// Maximum records staged in memory before writes report not-durable
    #[arg(long, env = "MEMGATE_WAL_CAPACITY", default_value_t = 100_000)]
    wal_capacity: usize,
}

impl Args {
    fn into_config(self) -> GatewayConfig {
        GatewayConfig::new(self.store)
            .listen_addr(&self.listen)
            .drain_interval(Duration::from_millis(self.drain_interval_ms))
            .drain_batch_size(self.drain_batch_size)
            .wal_capacity(self.wal_capacity)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Args::parse().into_config();
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("invalid configuration")?;

    let gateway = Arc::new(
        Gateway::open(&config)
            .with_context(|| format!("recover from '{}'", config.store_path.display()))?,
    );
    let worker = gateway.start_replication();

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "memgate listening");

    axum::serve(listener, memgate::web::router(Arc::clone(&gateway)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve http")?;

    worker.stop().await.context("stop replication worker")?;
    info!("memgate stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
