//! Matrix Dispatch - 参考计算worker入口

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use matrix_dispatch_core::api::WorkerServer;
use matrix_dispatch_core::config::{load_config, load_default_config};
use matrix_dispatch_core::Logger;

#[derive(Debug, Parser)]
#[command(name = "matrix-dispatch-worker", version, about = "Reference /sum and /multiply worker")]
struct Args {
    /// 监听主机，覆盖 worker.host
    #[arg(long)]
    host: Option<String>,

    /// 监听端口，覆盖 worker.port
    #[arg(long)]
    port: Option<u16>,

    /// 配置文件
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => load_config(path).with_context(|| format!("failed to load config {}", path.display()))?,
        None => load_default_config().context("failed to load config from environment")?,
    };
    if let Some(host) = args.host {
        settings.worker.host = host;
    }
    if let Some(port) = args.port {
        settings.worker.port = port;
    }

    Logger::init(&settings.logging).map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;
    tracing::info!("Starting Matrix Dispatch worker");

    WorkerServer::new(settings.worker)
        .start(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("worker failed: {}", e))?;

    tracing::info!("Matrix Dispatch worker shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
