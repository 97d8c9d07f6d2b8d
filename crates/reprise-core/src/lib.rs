// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Reprise Core - Journal State Machine for Durable Invocations
//!
//! This crate implements the per-invocation state machine that sits between
//! user code and the orchestrating runtime. Every side-effecting operation
//! issued by the user code is recorded as an entry in an ordered journal. When
//! an invocation is interrupted, the runtime re-sends the journal and the user
//! code re-executes; the state machine matches the re-issued operations against
//! the recorded ones and serves their recorded results.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────────┐
//! │                          User code (reprise-sdk)                       │
//! │        input, state, sleep, call, send, awakeable, promise, run        │
//! └────────────────────────────────────────────────────────────────────────┘
//!                 │ operations                  ▲ PendingOperation polls
//!                 ▼                             │
//! ┌────────────────────────────────────────────────────────────────────────┐
//! │                       InvocationStateMachine                           │
//! │  ┌──────────┐   ┌──────────────────┐   ┌──────────────────────────┐    │
//! │  │ Journal  │──▶│ CompletionTable  │──▶│ PendingRegistry (wakers) │    │
//! │  └──────────┘   └──────────────────┘   └──────────────────────────┘    │
//! │        EagerState · run proposals · outbox · fatal-error hooks         │
//! └────────────────────────────────────────────────────────────────────────┘
//!                 │ OutboundMessage             ▲ InboundMessage
//!                 ▼                             │
//! ┌────────────────────────────────────────────────────────────────────────┐
//! │                    codec  ⇄  reprise-protocol frames                   │
//! └────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Invocation protocol
//!
//! | Direction | Message | Effect |
//! |-----------|---------|--------|
//! | in  | `Start` | invocation id, known entry count, eager state, retry count |
//! | in  | entries | historical journal, inline results go to the completion table |
//! | in  | `Completion` | result of a completable entry, resolves its pending operation |
//! | in  | `EntryAck` | runtime stored a proposed run result |
//! | in  | `InputClosed` | no further messages; a waiting invocation suspends |
//! | out | entries | new operations, in journal order, at issue time |
//! | out | `ProposeRunCompletion` | outcome of a run closure |
//! | out | `Suspension` | indices the invocation waits on |
//! | out | `Error` | fatal error, the invocation is closed |
//!
//! # Errors
//!
//! Protocol violations (duplicate completions, journal mismatches, messages in
//! the wrong state) are fatal: the invocation closes, an error message is
//! queued and the fatal-error hooks fire. Business failures are ordinary
//! [`Completion::Failure`] values delivered to the awaiting operation.
//!
//! # Example
//!
//! ```ignore
//! let mut vm = InvocationStateMachine::new(VmOptions::from_env()?);
//! vm.notify(InboundMessage::Start(start))?;
//! vm.notify(InboundMessage::Entry(input_entry))?;
//!
//! let input = vm.input()?;
//! let call = vm.call(Target::new("Greeter", "greet"), input)?;
//! for msg in vm.take_output() {
//!     // send to the runtime
//! }
//! ```

pub mod awakeable;
pub mod codec;
pub mod completion;
pub mod config;
pub mod eager_state;
pub mod entry;
pub mod error;
pub mod journal;
pub mod message;
pub mod registry;
pub mod retry;
pub mod state_machine;

pub use awakeable::{AWAKEABLE_ID_PREFIX, awakeable_id, parse_awakeable_id};
pub use codec::CodecError;
pub use completion::{Completion, CompletionTable, Failure};
pub use config::{ConfigError, VmOptions};
pub use entry::{Entry, EntryKind, InvocationRef, Target};
pub use error::{
    CANCELLED_ERROR_CODE, INTERNAL_ERROR_CODE, JOURNAL_MISMATCH_CODE, PROTOCOL_VIOLATION_CODE,
    Result, VmError,
};
pub use journal::{Appended, Journal};
pub use message::{
    InboundMessage, OutboundMessage, RunProposal, RunResult, StartInfo, TransientFailure,
};
pub use registry::{PendingOperation, PendingRegistry};
pub use retry::RetryPolicy;
pub use state_machine::{CloseReason, InvocationStateMachine, LifecycleState, RunEnter};
