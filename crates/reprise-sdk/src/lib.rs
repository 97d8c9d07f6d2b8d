// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Reprise SDK - async handlers on top of the journal state machine.
//!
//! A handler is an async function receiving a [`Context`]. Every context
//! operation is journaled when it is called; awaiting it waits for its
//! completion. When the runtime re-invokes a handler after a suspension or a
//! crash, recorded operations are matched against the journal and resolve
//! with their recorded results, so the handler reaches the point where it
//! stopped without repeating side effects.
//!
//! # Features
//!
//! - **State**: per-key state with read-your-writes
//! - **Calls**: request/response and fire-and-forget invocations
//! - **Timers**: durable sleep
//! - **Awakeables and promises**: wait for external completion
//! - **Side effects**: `run` closures, retried with backoff on transient errors
//!
//! # Quick Start
//!
//! ```ignore
//! use reprise_sdk::{Context, Target, TerminalError};
//!
//! async fn greet(ctx: Context) -> Result<String, TerminalError> {
//!     let name: String = ctx.input()?;
//!
//!     // Both calls are journaled before either is awaited.
//!     let a = ctx.call::<_, String>(Target::new("Upper", "upper"), &"Francesco");
//!     let b = ctx.call::<_, String>(Target::new("Upper", "upper"), &name);
//!
//!     let b = b.await?;
//!     ctx.set_state("A2", &b)?;
//!     let a = a.await?;
//!
//!     Ok(format!("Hello {}-{}", a, b))
//! }
//!
//! #[tokio::main]
//! async fn main() -> reprise_sdk::Result<()> {
//!     let config = reprise_sdk::SdkConfig::from_env()?;
//!     let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
//!     reprise_sdk::Endpoint::new(config).serve(listener, greet).await
//! }
//! ```
//!
//! # Side effects
//!
//! ```ignore
//! let body: String = ctx
//!     .run("fetch", || async {
//!         let body = fetch("https://example.com").await.map_err(RunError::transient)?;
//!         Ok(body)
//!     })
//!     .await?;
//! ```
//!
//! A successful or terminally failed closure is journaled and never runs
//! again. A transient error ends the current attempt; the runtime retries the
//! invocation according to the retry policy.
//!
//! # Testing
//!
//! [`TestDriver`] plays the runtime's side of an invocation from a script of
//! messages, without I/O:
//!
//! ```ignore
//! let outcome = TestDriver::new(greet).run([start, input, completion(2), completion(1)]);
//! assert_eq!(outcome.output_value::<String>()?, "Hello FRANCESCO-TILL");
//! ```
//!
//! # Configuration
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `REPRISE_BIND_ADDR` | `127.0.0.1:9080` | Endpoint listen address |
//! | `REPRISE_MAX_MESSAGE_SIZE` | `67108864` | Largest accepted frame payload |
//! | `REPRISE_RETRY_INITIAL_INTERVAL_MS` | `50` | First run retry delay |
//! | `REPRISE_RETRY_FACTOR` | `2.0` | Retry delay growth factor |
//! | `REPRISE_RETRY_MAX_INTERVAL_MS` | - | Retry delay cap |
//! | `REPRISE_RETRY_MAX_ATTEMPTS` | - | Attempts before a run fails permanently |

pub mod config;
pub mod context;
pub mod driver;
pub mod endpoint;
pub mod error;
pub mod test_driver;

pub use config::SdkConfig;
pub use context::{Context, DurableFuture};
pub use driver::InvocationDriver;
pub use endpoint::Endpoint;
pub use error::{Result, RunError, SdkError, TerminalError};
pub use test_driver::{TestDriver, TestOutcome};

// Re-export the types handlers and tests name directly.
pub use reprise_core::{
    CloseReason, Completion, Entry, Failure, InboundMessage, InvocationRef, OutboundMessage,
    RetryPolicy, RunProposal, StartInfo, Target, VmOptions,
};
