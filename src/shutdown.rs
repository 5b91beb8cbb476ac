// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Process interruption handling shared by the producer and consumer loops.

use tokio::{signal, sync::watch};

/// Creates the shutdown channel. The receiver reads `true` once shutdown starts.
pub fn shutdown_signal() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Resolves on SIGINT (Ctrl+C) or, on Unix, SIGTERM, then flips the channel.
pub async fn wait_for_shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    if let Err(e) = shutdown_tx.send(true) {
        tracing::error!("Failed to send shutdown signal: {}", e);
    }
}
