// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Typed messages exchanged with the runtime.

use std::time::Duration;

use bytes::Bytes;

use crate::completion::{Completion, Failure};
use crate::entry::Entry;

/// Start of an invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StartInfo {
    pub invocation_id: Bytes,
    /// Human readable id, used in logs.
    pub debug_id: String,
    /// Number of historical entries that follow the start message.
    pub known_entries: u32,
    /// State values eagerly sent by the runtime.
    pub state_map: Vec<(String, Bytes)>,
    /// When set, `state_map` may not contain every key.
    pub partial_state: bool,
    /// Attempts since the last stored entry, used for run retry metadata.
    pub retry_count: u32,
}

/// Messages received from the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Start(StartInfo),
    /// Historical entry, in index order after the start message.
    Entry(Entry),
    Completion { index: u32, completion: Completion },
    EntryAck { index: u32 },
    InputClosed,
    Error { code: u32, message: String },
}

impl InboundMessage {
    pub fn name(&self) -> &'static str {
        match self {
            InboundMessage::Start(_) => "start",
            InboundMessage::Entry(_) => "entry",
            InboundMessage::Completion { .. } => "completion",
            InboundMessage::EntryAck { .. } => "entry ack",
            InboundMessage::InputClosed => "input closed",
            InboundMessage::Error { .. } => "error",
        }
    }
}

/// Transient run failure with the metadata the runtime needs to retry it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransientFailure {
    pub failure: Failure,
    /// 1-indexed attempt that just failed.
    pub attempt: u32,
    pub next_retry_delay: Duration,
    pub max_attempts: Option<u32>,
    pub max_delay: Option<Duration>,
}

/// Result of a run proposed to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunProposal {
    Success(Bytes),
    Failure(Failure),
    Transient(TransientFailure),
}

impl RunProposal {
    /// Completion recorded once the runtime acknowledges the proposal.
    /// Transient failures are never recorded.
    pub fn to_completion(&self) -> Option<Completion> {
        match self {
            RunProposal::Success(value) => Some(Completion::Success(value.clone())),
            RunProposal::Failure(failure) => Some(Completion::Failure(failure.clone())),
            RunProposal::Transient(_) => None,
        }
    }
}

/// Outcome of executing a run closure, as reported by the user code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunResult {
    Success(Bytes),
    /// Non-retryable failure.
    Failure(Failure),
    /// Failure that the runtime may retry.
    Transient(Failure),
}

/// Messages sent to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Entry { index: u32, entry: Entry },
    ProposeRunCompletion { index: u32, proposal: RunProposal },
    Suspension { waiting: Vec<u32> },
    Error {
        code: u32,
        message: String,
        related_index: Option<u32>,
    },
}

impl OutboundMessage {
    /// Journal entry carried by this message, if any.
    pub fn entry(&self) -> Option<&Entry> {
        match self {
            OutboundMessage::Entry { entry, .. } => Some(entry),
            _ => None,
        }
    }
}
