// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use anyhow::{Context, Result};

use crate::domain::config::LoggingConfig;

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `level`. `format` is `"json"` or
/// anything else for compact text. Calling this again after a subscriber is
/// installed is a no-op.
pub fn init_tracing(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    // Err only means a global subscriber already exists
    let _ = if format.eq_ignore_ascii_case("json") {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };

    Ok(())
}

pub fn init_from_config(config: &LoggingConfig) -> Result<()> {
    init_tracing(&config.level, &config.format)
}
