// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Reprise Protocol - framing and Protobuf messages for the invocation stream
//!
//! This crate provides the wire contract between a service endpoint running
//! user code and the orchestrating runtime. It knows nothing about journal
//! semantics: it turns bytes into typed frames and back.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    reprise-protocol                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Messages: Start, Completion, EntryAck, entries, ... (prost)│
//! ├─────────────────────────────────────────────────────────────┤
//! │  Framing: 8-byte header (type, flags, length) + payload     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  IO: push/consume Decoder, async read/write over tokio      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use reprise_protocol::{Decoder, Frame, MessageType, proto};
//!
//! let ack = Frame::new(MessageType::EntryAck, &proto::EntryAckMessage { entry_index: 3 })?;
//! let bytes = ack.encode();
//!
//! let mut decoder = Decoder::default();
//! decoder.push(bytes);
//! while let Some(frame) = decoder.consume_next()? {
//!     let msg: proto::EntryAckMessage = frame.decode()?;
//! }
//! ```

pub mod frame;
pub mod header;
pub mod proto;

pub use frame::{
    Decoder, Frame, FrameError, FramedStream, MAX_FRAME_SIZE, read_frame, write_frame,
};
pub use header::{HEADER_SIZE, HeaderError, MessageHeader, MessageType};
