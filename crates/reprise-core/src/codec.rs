// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Conversion between typed messages and protocol frames.
//!
//! Both directions are provided for every message so the same codec serves
//! the service endpoint and runtime simulators in tests.

use std::time::Duration;

use bytes::Bytes;
use reprise_protocol::proto::{self, EntryResult};
use reprise_protocol::{Frame, FrameError, MessageType};
use thiserror::Error;

use crate::completion::{Completion, Failure};
use crate::entry::{Entry, InvocationRef, Target};
use crate::error::VmError;
use crate::message::{
    InboundMessage, OutboundMessage, RunProposal, StartInfo, TransientFailure,
};

/// Errors converting frames into typed messages.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("unexpected {0:?} message")]
    UnexpectedMessageType(MessageType),

    #[error("missing field {0}")]
    MissingField(&'static str),

    #[error("field {0} is not valid UTF-8")]
    InvalidUtf8(&'static str),
}

impl From<CodecError> for VmError {
    fn from(err: CodecError) -> Self {
        VmError::Decode(err.to_string())
    }
}

type Result<T> = std::result::Result<T, CodecError>;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

impl From<proto::Failure> for Failure {
    fn from(failure: proto::Failure) -> Self {
        Failure::new(failure.code, failure.message)
    }
}

impl From<&Failure> for proto::Failure {
    fn from(failure: &Failure) -> Self {
        proto::Failure {
            code: failure.code,
            message: failure.message.clone(),
        }
    }
}

fn completion_from_proto(result: EntryResult) -> Completion {
    match result {
        EntryResult::Empty(_) => Completion::Empty,
        EntryResult::Value(value) => Completion::Success(value),
        EntryResult::Failure(failure) => Completion::Failure(failure.into()),
    }
}

fn completion_to_proto(completion: &Completion) -> EntryResult {
    match completion {
        Completion::Empty => EntryResult::Empty(proto::Empty {}),
        Completion::Success(value) => EntryResult::Value(value.clone()),
        Completion::Failure(failure) => EntryResult::Failure(failure.into()),
    }
}

fn outcome_from_proto(
    result: Option<EntryResult>,
    field: &'static str,
) -> Result<std::result::Result<Bytes, Failure>> {
    match result.ok_or(CodecError::MissingField(field))? {
        EntryResult::Empty(_) => Ok(Ok(Bytes::new())),
        EntryResult::Value(value) => Ok(Ok(value)),
        EntryResult::Failure(failure) => Ok(Err(failure.into())),
    }
}

fn outcome_to_proto(outcome: &std::result::Result<Bytes, Failure>) -> EntryResult {
    match outcome {
        Ok(value) => EntryResult::Value(value.clone()),
        Err(failure) => EntryResult::Failure(failure.into()),
    }
}

fn key_from_bytes(key: Bytes, field: &'static str) -> Result<String> {
    String::from_utf8(key.to_vec()).map_err(|_| CodecError::InvalidUtf8(field))
}

fn target(service: String, handler: String, key: Option<String>) -> Target {
    Target {
        service,
        handler,
        key,
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// Encodes a journal entry, setting `completed` when it carries its result.
pub fn encode_entry(entry: &Entry) -> std::result::Result<Frame, FrameError> {
    let result = entry.result().map(completion_to_proto);
    let completed = result.is_some();
    let frame = match entry {
        Entry::Input { value } => Frame::new(
            MessageType::InputEntry,
            &proto::InputEntryMessage {
                value: value.clone(),
            },
        )?,
        Entry::Output { result } => Frame::new(
            MessageType::OutputEntry,
            &proto::OutputEntryMessage {
                result: Some(outcome_to_proto(result)),
            },
        )?,
        Entry::GetState { key, .. } => Frame::new(
            MessageType::GetStateEntry,
            &proto::GetStateEntryMessage {
                key: Bytes::copy_from_slice(key.as_bytes()),
                result,
            },
        )?,
        Entry::SetState { key, value } => Frame::new(
            MessageType::SetStateEntry,
            &proto::SetStateEntryMessage {
                key: Bytes::copy_from_slice(key.as_bytes()),
                value: value.clone(),
            },
        )?,
        Entry::ClearState { key } => Frame::new(
            MessageType::ClearStateEntry,
            &proto::ClearStateEntryMessage {
                key: Bytes::copy_from_slice(key.as_bytes()),
            },
        )?,
        Entry::ClearAllState => Frame::new(
            MessageType::ClearAllStateEntry,
            &proto::ClearAllStateEntryMessage {},
        )?,
        Entry::Sleep { wake_up_time, .. } => Frame::new(
            MessageType::SleepEntry,
            &proto::SleepEntryMessage {
                wake_up_time: *wake_up_time,
                result,
            },
        )?,
        Entry::Call {
            target, parameter, ..
        } => Frame::new(
            MessageType::CallEntry,
            &proto::CallEntryMessage {
                service_name: target.service.clone(),
                handler_name: target.handler.clone(),
                parameter: parameter.clone(),
                key: target.key.clone(),
                result,
            },
        )?,
        Entry::Send {
            target,
            parameter,
            invoke_time,
        } => Frame::new(
            MessageType::SendEntry,
            &proto::SendEntryMessage {
                service_name: target.service.clone(),
                handler_name: target.handler.clone(),
                parameter: parameter.clone(),
                invoke_time: *invoke_time,
                key: target.key.clone(),
            },
        )?,
        Entry::Awakeable { .. } => Frame::new(
            MessageType::AwakeableEntry,
            &proto::AwakeableEntryMessage { result },
        )?,
        Entry::CompleteAwakeable { id, result } => Frame::new(
            MessageType::CompleteAwakeableEntry,
            &proto::CompleteAwakeableEntryMessage {
                id: id.clone(),
                result: Some(outcome_to_proto(result)),
            },
        )?,
        Entry::GetPromise { key, .. } => Frame::new(
            MessageType::GetPromiseEntry,
            &proto::GetPromiseEntryMessage {
                key: key.clone(),
                result,
            },
        )?,
        Entry::PeekPromise { key, .. } => Frame::new(
            MessageType::PeekPromiseEntry,
            &proto::PeekPromiseEntryMessage {
                key: key.clone(),
                result,
            },
        )?,
        Entry::CompletePromise { key, completion } => Frame::new(
            MessageType::CompletePromiseEntry,
            &proto::CompletePromiseEntryMessage {
                key: key.clone(),
                completion: Some(outcome_to_proto(completion)),
            },
        )?,
        Entry::Run { name, .. } => Frame::new(
            MessageType::RunEntry,
            &proto::RunEntryMessage {
                name: name.clone(),
                result,
            },
        )?,
        Entry::CancelInvocation { target } => Frame::new(
            MessageType::CancelInvocationEntry,
            &proto::CancelInvocationEntryMessage {
                target: Some(match target {
                    InvocationRef::Id(id) => proto::CancelTarget::InvocationId(id.clone()),
                    InvocationRef::Call(index) => proto::CancelTarget::CallEntryIndex(*index),
                }),
            },
        )?,
    };
    Ok(frame.completed(completed))
}

/// Decodes a journal entry frame.
pub fn decode_entry(frame: &Frame) -> Result<Entry> {
    let entry = match frame.message_type {
        MessageType::InputEntry => {
            let msg: proto::InputEntryMessage = frame.decode()?;
            Entry::Input { value: msg.value }
        }
        MessageType::OutputEntry => {
            let msg: proto::OutputEntryMessage = frame.decode()?;
            Entry::Output {
                result: outcome_from_proto(msg.result, "OutputEntry.result")?,
            }
        }
        MessageType::GetStateEntry => {
            let msg: proto::GetStateEntryMessage = frame.decode()?;
            Entry::GetState {
                key: key_from_bytes(msg.key, "GetStateEntry.key")?,
                result: msg.result.map(completion_from_proto),
            }
        }
        MessageType::SetStateEntry => {
            let msg: proto::SetStateEntryMessage = frame.decode()?;
            Entry::SetState {
                key: key_from_bytes(msg.key, "SetStateEntry.key")?,
                value: msg.value,
            }
        }
        MessageType::ClearStateEntry => {
            let msg: proto::ClearStateEntryMessage = frame.decode()?;
            Entry::ClearState {
                key: key_from_bytes(msg.key, "ClearStateEntry.key")?,
            }
        }
        MessageType::ClearAllStateEntry => Entry::ClearAllState,
        MessageType::SleepEntry => {
            let msg: proto::SleepEntryMessage = frame.decode()?;
            Entry::Sleep {
                wake_up_time: msg.wake_up_time,
                result: msg.result.map(completion_from_proto),
            }
        }
        MessageType::CallEntry => {
            let msg: proto::CallEntryMessage = frame.decode()?;
            Entry::Call {
                target: target(msg.service_name, msg.handler_name, msg.key),
                parameter: msg.parameter,
                result: msg.result.map(completion_from_proto),
            }
        }
        MessageType::SendEntry => {
            let msg: proto::SendEntryMessage = frame.decode()?;
            Entry::Send {
                target: target(msg.service_name, msg.handler_name, msg.key),
                parameter: msg.parameter,
                invoke_time: msg.invoke_time,
            }
        }
        MessageType::AwakeableEntry => {
            let msg: proto::AwakeableEntryMessage = frame.decode()?;
            Entry::Awakeable {
                result: msg.result.map(completion_from_proto),
            }
        }
        MessageType::CompleteAwakeableEntry => {
            let msg: proto::CompleteAwakeableEntryMessage = frame.decode()?;
            Entry::CompleteAwakeable {
                id: msg.id,
                result: outcome_from_proto(msg.result, "CompleteAwakeableEntry.result")?,
            }
        }
        MessageType::GetPromiseEntry => {
            let msg: proto::GetPromiseEntryMessage = frame.decode()?;
            Entry::GetPromise {
                key: msg.key,
                result: msg.result.map(completion_from_proto),
            }
        }
        MessageType::PeekPromiseEntry => {
            let msg: proto::PeekPromiseEntryMessage = frame.decode()?;
            Entry::PeekPromise {
                key: msg.key,
                result: msg.result.map(completion_from_proto),
            }
        }
        MessageType::CompletePromiseEntry => {
            let msg: proto::CompletePromiseEntryMessage = frame.decode()?;
            Entry::CompletePromise {
                key: msg.key,
                completion: outcome_from_proto(
                    msg.completion,
                    "CompletePromiseEntry.completion",
                )?,
            }
        }
        MessageType::RunEntry => {
            let msg: proto::RunEntryMessage = frame.decode()?;
            Entry::Run {
                name: msg.name,
                result: msg.result.map(completion_from_proto),
            }
        }
        MessageType::CancelInvocationEntry => {
            let msg: proto::CancelInvocationEntryMessage = frame.decode()?;
            let target = match msg
                .target
                .ok_or(CodecError::MissingField("CancelInvocationEntry.target"))?
            {
                proto::CancelTarget::InvocationId(id) => InvocationRef::Id(id),
                proto::CancelTarget::CallEntryIndex(index) => InvocationRef::Call(index),
            };
            Entry::CancelInvocation { target }
        }
        other => return Err(CodecError::UnexpectedMessageType(other)),
    };
    Ok(entry)
}

// ---------------------------------------------------------------------------
// Runtime -> service
// ---------------------------------------------------------------------------

/// Decodes a frame sent by the runtime.
pub fn decode_inbound(frame: &Frame) -> Result<InboundMessage> {
    let msg = match frame.message_type {
        MessageType::Start => {
            let msg: proto::StartMessage = frame.decode()?;
            let state_map = msg
                .state_map
                .into_iter()
                .map(|entry| Ok((key_from_bytes(entry.key, "StateEntry.key")?, entry.value)))
                .collect::<Result<Vec<_>>>()?;
            InboundMessage::Start(StartInfo {
                invocation_id: msg.id,
                debug_id: msg.debug_id,
                known_entries: msg.known_entries,
                state_map,
                partial_state: msg.partial_state,
                retry_count: msg.retry_count_since_last_stored_entry,
            })
        }
        MessageType::Completion => {
            let msg: proto::CompletionMessage = frame.decode()?;
            InboundMessage::Completion {
                index: msg.entry_index,
                completion: completion_from_proto(
                    msg.result
                        .ok_or(CodecError::MissingField("CompletionMessage.result"))?,
                ),
            }
        }
        MessageType::EntryAck => {
            let msg: proto::EntryAckMessage = frame.decode()?;
            InboundMessage::EntryAck {
                index: msg.entry_index,
            }
        }
        MessageType::InputClosed => InboundMessage::InputClosed,
        MessageType::Error => {
            let msg: proto::ErrorMessage = frame.decode()?;
            InboundMessage::Error {
                code: msg.code,
                message: msg.message,
            }
        }
        ty if ty.is_entry() => InboundMessage::Entry(decode_entry(frame)?),
        other => return Err(CodecError::UnexpectedMessageType(other)),
    };
    Ok(msg)
}

/// Encodes a message as the runtime would send it.
pub fn encode_inbound(msg: &InboundMessage) -> std::result::Result<Frame, FrameError> {
    match msg {
        InboundMessage::Start(start) => Frame::new(
            MessageType::Start,
            &proto::StartMessage {
                id: start.invocation_id.clone(),
                debug_id: start.debug_id.clone(),
                known_entries: start.known_entries,
                state_map: start
                    .state_map
                    .iter()
                    .map(|(key, value)| proto::StateEntry {
                        key: Bytes::copy_from_slice(key.as_bytes()),
                        value: value.clone(),
                    })
                    .collect(),
                partial_state: start.partial_state,
                retry_count_since_last_stored_entry: start.retry_count,
            },
        ),
        InboundMessage::Entry(entry) => encode_entry(entry),
        InboundMessage::Completion { index, completion } => Frame::new(
            MessageType::Completion,
            &proto::CompletionMessage {
                entry_index: *index,
                result: Some(completion_to_proto(completion)),
            },
        ),
        InboundMessage::EntryAck { index } => Frame::new(
            MessageType::EntryAck,
            &proto::EntryAckMessage {
                entry_index: *index,
            },
        ),
        InboundMessage::InputClosed => {
            Frame::new(MessageType::InputClosed, &proto::InputClosedMessage {})
        }
        InboundMessage::Error { code, message } => Frame::new(
            MessageType::Error,
            &proto::ErrorMessage {
                code: *code,
                message: message.clone(),
                related_entry_index: None,
            },
        ),
    }
}

// ---------------------------------------------------------------------------
// Service -> runtime
// ---------------------------------------------------------------------------

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Encodes a message emitted by the state machine.
pub fn encode_outbound(msg: &OutboundMessage) -> std::result::Result<Frame, FrameError> {
    match msg {
        OutboundMessage::Entry { entry, .. } => encode_entry(entry),
        OutboundMessage::ProposeRunCompletion { index, proposal } => {
            let (result, requires_ack) = match proposal {
                RunProposal::Success(value) => (proto::RunProposal::Value(value.clone()), true),
                RunProposal::Failure(failure) => {
                    (proto::RunProposal::Failure(failure.into()), true)
                }
                RunProposal::Transient(transient) => (
                    proto::RunProposal::TransientFailure(proto::TransientFailure {
                        failure: Some((&transient.failure).into()),
                        attempt: transient.attempt,
                        next_retry_delay_millis: duration_millis(transient.next_retry_delay),
                        max_attempts: transient.max_attempts,
                        max_delay_millis: transient.max_delay.map(duration_millis),
                    }),
                    false,
                ),
            };
            Ok(Frame::new(
                MessageType::ProposeRunCompletion,
                &proto::ProposeRunCompletionMessage {
                    entry_index: *index,
                    result: Some(result),
                },
            )?
            .requires_ack(requires_ack))
        }
        OutboundMessage::Suspension { waiting } => Frame::new(
            MessageType::Suspension,
            &proto::SuspensionMessage {
                entry_indexes: waiting.clone(),
            },
        ),
        OutboundMessage::Error {
            code,
            message,
            related_index,
        } => Frame::new(
            MessageType::Error,
            &proto::ErrorMessage {
                code: *code,
                message: message.clone(),
                related_entry_index: *related_index,
            },
        ),
    }
}

/// Decodes a frame emitted by a service.
///
/// Entry frames carry no index on the wire; `entry_index` is the index the
/// receiver expects for the next entry.
pub fn decode_outbound(frame: &Frame, entry_index: u32) -> Result<OutboundMessage> {
    let msg = match frame.message_type {
        MessageType::ProposeRunCompletion => {
            let msg: proto::ProposeRunCompletionMessage = frame.decode()?;
            let proposal = match msg
                .result
                .ok_or(CodecError::MissingField("ProposeRunCompletion.result"))?
            {
                proto::RunProposal::Value(value) => RunProposal::Success(value),
                proto::RunProposal::Failure(failure) => RunProposal::Failure(failure.into()),
                proto::RunProposal::TransientFailure(transient) => {
                    RunProposal::Transient(TransientFailure {
                        failure: transient
                            .failure
                            .ok_or(CodecError::MissingField("TransientFailure.failure"))?
                            .into(),
                        attempt: transient.attempt,
                        next_retry_delay: Duration::from_millis(
                            transient.next_retry_delay_millis,
                        ),
                        max_attempts: transient.max_attempts,
                        max_delay: transient.max_delay_millis.map(Duration::from_millis),
                    })
                }
            };
            OutboundMessage::ProposeRunCompletion {
                index: msg.entry_index,
                proposal,
            }
        }
        MessageType::Suspension => {
            let msg: proto::SuspensionMessage = frame.decode()?;
            OutboundMessage::Suspension {
                waiting: msg.entry_indexes,
            }
        }
        MessageType::Error => {
            let msg: proto::ErrorMessage = frame.decode()?;
            OutboundMessage::Error {
                code: msg.code,
                message: msg.message,
                related_index: msg.related_entry_index,
            }
        }
        ty if ty.is_entry() => OutboundMessage::Entry {
            index: entry_index,
            entry: decode_entry(frame)?,
        },
        other => return Err(CodecError::UnexpectedMessageType(other)),
    };
    Ok(msg)
}
