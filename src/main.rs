// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::error;

use dispatch_core::config::AppConfig;

#[derive(Debug, Parser)]
#[command(name = "dispatch-core")]
struct Cli {
    #[command(flatten)]
    config: AppConfig,
}

#[tokio::main]
async fn main() {
    // Ignore failure: the only way this errs is a second install in the same
    // process, which cannot happen before `main` runs once.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .init();

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown_signal.cancel();
    });

    if let Err(e) = dispatch_core::run(cli.config, shutdown).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
