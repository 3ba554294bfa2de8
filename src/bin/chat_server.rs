use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use ragstream::server::{router, AppState};
use ragstream::{logging, PipelineArgs};

#[derive(Parser, Debug)]
#[command(
    name = "ragstream-server",
    about = "Streaming chat API answering questions from a vector store"
)]
struct ServerCli {
    /// Address to bind the HTTP server to (host:port).
    #[arg(long, env = "RAGSTREAM_BIND", default_value = "127.0.0.1:3000")]
    bind: String,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = ServerCli::parse();
    let pipeline = cli.pipeline.build_pipeline().await?;
    let app = router(AppState::new(pipeline));

    let addr: SocketAddr = cli
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", cli.bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "ragstream-server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server shutdown")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
    }
}
