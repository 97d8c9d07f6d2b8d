// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Reprise Greeter - demo endpoint.
//!
//! Serves a greeter handler that calls an `Upper` service twice, awaits the
//! responses in reverse order and remembers the last one in state.

use anyhow::Result;
use reprise_sdk::{Context, Endpoint, SdkConfig, Target, TerminalError};
use tokio::net::TcpListener;
use tracing::{error, info};

async fn greet(ctx: Context) -> Result<String, TerminalError> {
    let name: String = ctx.input()?;

    let first = ctx.call::<_, String>(Target::new("Upper", "upper"), &"Francesco");
    let second = ctx.call::<_, String>(Target::new("Upper", "upper"), &name);

    let second = second.await?;
    ctx.set_state("A2", &second)?;
    let first = first.await?;

    Ok(format!("Hello {}-{}", first, second))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("reprise_sdk=info".parse()?)
                .add_directive("reprise_core=info".parse()?),
        )
        .init();

    let config = SdkConfig::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;
    info!(
        bind_addr = %config.bind_addr,
        max_message_size = config.max_message_size,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(config.bind_addr).await?;
    let endpoint = Endpoint::new(config);

    tokio::select! {
        served = endpoint.serve(listener, greet) => served?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutting down...");
        }
    }
    Ok(())
}
