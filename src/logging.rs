// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Logging Setup
//!
//! Installs the global `tracing` subscriber used by both binaries.
//!
//! Environment variables:
//! - `RUST_LOG`: Override log levels (default: `info`)
//! - `LOG_FORMAT`: Set to `json` for one JSON object per event

use tracing_subscriber::{prelude::*, EnvFilter};

/// Initializes the global subscriber. Later calls are no-ops.
pub fn init_tracing(app_name: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let result = if json {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(false)
                    .flatten_event(true),
            )
            .with(filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .with(filter)
            .try_init()
    };

    if result.is_ok() {
        tracing::debug!(app = app_name, json, "tracing initialized");
    }
}
