// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Protobuf messages exchanged on the invocation stream.
//!
//! Field tags 13/14/15 are reserved across entries for the
//! empty/value/failure result, so a single [`EntryResult`] oneof serves every
//! completable entry and the completion message.

use prost::bytes::Bytes;

/// Empty marker message.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Empty {}

/// Failure with a numeric code.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Failure {
    #[prost(uint32, tag = "1")]
    pub code: u32,
    #[prost(string, tag = "2")]
    pub message: ::prost::alloc::string::String,
}

/// Result of an entry, inline or delivered by a completion.
#[derive(Clone, PartialEq, ::prost::Oneof)]
pub enum EntryResult {
    #[prost(message, tag = "13")]
    Empty(Empty),
    #[prost(bytes = "bytes", tag = "14")]
    Value(Bytes),
    #[prost(message, tag = "15")]
    Failure(Failure),
}

// ---------------------------------------------------------------------------
// Control messages
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StateEntry {
    #[prost(bytes = "bytes", tag = "1")]
    pub key: Bytes,
    #[prost(bytes = "bytes", tag = "2")]
    pub value: Bytes,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StartMessage {
    #[prost(bytes = "bytes", tag = "1")]
    pub id: Bytes,
    #[prost(string, tag = "2")]
    pub debug_id: ::prost::alloc::string::String,
    #[prost(uint32, tag = "3")]
    pub known_entries: u32,
    #[prost(message, repeated, tag = "4")]
    pub state_map: ::prost::alloc::vec::Vec<StateEntry>,
    #[prost(bool, tag = "5")]
    pub partial_state: bool,
    #[prost(uint32, tag = "6")]
    pub retry_count_since_last_stored_entry: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CompletionMessage {
    #[prost(uint32, tag = "1")]
    pub entry_index: u32,
    #[prost(oneof = "EntryResult", tags = "13, 14, 15")]
    pub result: ::core::option::Option<EntryResult>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SuspensionMessage {
    #[prost(uint32, repeated, tag = "1")]
    pub entry_indexes: ::prost::alloc::vec::Vec<u32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ErrorMessage {
    #[prost(uint32, tag = "1")]
    pub code: u32,
    #[prost(string, tag = "2")]
    pub message: ::prost::alloc::string::String,
    #[prost(uint32, optional, tag = "3")]
    pub related_entry_index: ::core::option::Option<u32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EntryAckMessage {
    #[prost(uint32, tag = "1")]
    pub entry_index: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InputClosedMessage {}

/// Failure that the runtime may retry, with the metadata it needs to schedule it.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransientFailure {
    #[prost(message, optional, tag = "1")]
    pub failure: ::core::option::Option<Failure>,
    #[prost(uint32, tag = "2")]
    pub attempt: u32,
    #[prost(uint64, tag = "3")]
    pub next_retry_delay_millis: u64,
    #[prost(uint32, optional, tag = "4")]
    pub max_attempts: ::core::option::Option<u32>,
    #[prost(uint64, optional, tag = "5")]
    pub max_delay_millis: ::core::option::Option<u64>,
}

#[derive(Clone, PartialEq, ::prost::Oneof)]
pub enum RunProposal {
    #[prost(bytes = "bytes", tag = "14")]
    Value(Bytes),
    #[prost(message, tag = "15")]
    Failure(Failure),
    #[prost(message, tag = "16")]
    TransientFailure(TransientFailure),
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProposeRunCompletionMessage {
    #[prost(uint32, tag = "1")]
    pub entry_index: u32,
    #[prost(oneof = "RunProposal", tags = "14, 15, 16")]
    pub result: ::core::option::Option<RunProposal>,
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InputEntryMessage {
    #[prost(bytes = "bytes", tag = "14")]
    pub value: Bytes,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OutputEntryMessage {
    #[prost(oneof = "EntryResult", tags = "13, 14, 15")]
    pub result: ::core::option::Option<EntryResult>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetStateEntryMessage {
    #[prost(bytes = "bytes", tag = "1")]
    pub key: Bytes,
    #[prost(oneof = "EntryResult", tags = "13, 14, 15")]
    pub result: ::core::option::Option<EntryResult>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SetStateEntryMessage {
    #[prost(bytes = "bytes", tag = "1")]
    pub key: Bytes,
    #[prost(bytes = "bytes", tag = "3")]
    pub value: Bytes,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClearStateEntryMessage {
    #[prost(bytes = "bytes", tag = "1")]
    pub key: Bytes,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClearAllStateEntryMessage {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SleepEntryMessage {
    /// Wake up time, milliseconds since unix epoch
    #[prost(uint64, tag = "1")]
    pub wake_up_time: u64,
    #[prost(oneof = "EntryResult", tags = "13, 14, 15")]
    pub result: ::core::option::Option<EntryResult>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CallEntryMessage {
    #[prost(string, tag = "1")]
    pub service_name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub handler_name: ::prost::alloc::string::String,
    #[prost(bytes = "bytes", tag = "3")]
    pub parameter: Bytes,
    #[prost(string, optional, tag = "5")]
    pub key: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(oneof = "EntryResult", tags = "13, 14, 15")]
    pub result: ::core::option::Option<EntryResult>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SendEntryMessage {
    #[prost(string, tag = "1")]
    pub service_name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub handler_name: ::prost::alloc::string::String,
    #[prost(bytes = "bytes", tag = "3")]
    pub parameter: Bytes,
    /// Delivery time, milliseconds since unix epoch. Absent means immediately.
    #[prost(uint64, optional, tag = "4")]
    pub invoke_time: ::core::option::Option<u64>,
    #[prost(string, optional, tag = "5")]
    pub key: ::core::option::Option<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AwakeableEntryMessage {
    #[prost(oneof = "EntryResult", tags = "13, 14, 15")]
    pub result: ::core::option::Option<EntryResult>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CompleteAwakeableEntryMessage {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
    #[prost(oneof = "EntryResult", tags = "13, 14, 15")]
    pub result: ::core::option::Option<EntryResult>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RunEntryMessage {
    #[prost(string, tag = "12")]
    pub name: ::prost::alloc::string::String,
    #[prost(oneof = "EntryResult", tags = "13, 14, 15")]
    pub result: ::core::option::Option<EntryResult>,
}

#[derive(Clone, PartialEq, ::prost::Oneof)]
pub enum CancelTarget {
    #[prost(string, tag = "1")]
    InvocationId(::prost::alloc::string::String),
    #[prost(uint32, tag = "2")]
    CallEntryIndex(u32),
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CancelInvocationEntryMessage {
    #[prost(oneof = "CancelTarget", tags = "1, 2")]
    pub target: ::core::option::Option<CancelTarget>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetPromiseEntryMessage {
    #[prost(string, tag = "1")]
    pub key: ::prost::alloc::string::String,
    #[prost(oneof = "EntryResult", tags = "13, 14, 15")]
    pub result: ::core::option::Option<EntryResult>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PeekPromiseEntryMessage {
    #[prost(string, tag = "1")]
    pub key: ::prost::alloc::string::String,
    #[prost(oneof = "EntryResult", tags = "13, 14, 15")]
    pub result: ::core::option::Option<EntryResult>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CompletePromiseEntryMessage {
    #[prost(string, tag = "1")]
    pub key: ::prost::alloc::string::String,
    /// The value or failure the promise is completed with.
    #[prost(oneof = "EntryResult", tags = "13, 14, 15")]
    pub completion: ::core::option::Option<EntryResult>,
}
