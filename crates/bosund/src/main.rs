//! bosund - the Bosun build agent daemon.
//!
//! Serves label-qualified build methods to a build master: resolves a
//! workspace per project, serializes builds per workspace, bounds global
//! script concurrency, syncs sources with git, and runs build scripts.

use std::sync::Arc;

use bosun_core::{Builder, GitClient, VcsClient};
use bosund::config::AgentConfig;
use bosund::server::AgentServer;
use bosund::service::{platform_runners, ServiceMap};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AgentConfig::parse();
    bosun_core::telemetry::init_tracing(config.json, Level::INFO);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        workspace = %config.workspace.display(),
        executors = config.executors,
        "starting bosund"
    );

    let vcs: Arc<dyn VcsClient> = Arc::new(GitClient::new());
    let builder = Arc::new(Builder::new(
        config.workspace.clone(),
        config.executors,
        vcs,
    ));
    let services = Arc::new(ServiceMap::new(&config.labels, platform_runners()));
    anyhow::ensure!(!services.is_empty(), "no labels configured, nothing to export");

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("shutdown signal received");
            shutdown.cancel();
        });
    }

    let server = AgentServer::bind(config.listen, config.token, builder, services).await?;
    info!(addr = %server.local_addr(), "listening for master connections");
    server.serve(shutdown).await
}

/// Completes on SIGINT or, on unix, SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
