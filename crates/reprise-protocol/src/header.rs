// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Message header layout.
//!
//! Every message on the invocation stream starts with a 64-bit big-endian
//! header:
//!
//! ```text
//!  63            48 47        34  33   32  31                      0
//! ┌────────────────┬────────────┬────┬────┬─────────────────────────┐
//! │  message type  │  reserved  │ ack│ cpl│     payload length      │
//! └────────────────┴────────────┴────┴────┴─────────────────────────┘
//! ```
//!
//! `cpl` is the `completed` flag (entry carries its result inline) and `ack`
//! is the `requires_ack` flag (the sender expects an `EntryAck`).

use thiserror::Error;

/// Header size in bytes.
pub const HEADER_SIZE: usize = 8;

const COMPLETED_MASK: u64 = 0x0000_0001_0000_0000;
const REQUIRES_ACK_MASK: u64 = 0x0000_0002_0000_0000;

/// Message type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageType {
    /// Start of an invocation
    Start = 0x0000,
    /// Completion of a journal entry
    Completion = 0x0001,
    /// The invocation suspended, waiting on entries
    Suspension = 0x0002,
    /// Fatal error, the stream is closed after it
    Error = 0x0003,
    /// Acknowledgement of an entry sent with `requires_ack`
    EntryAck = 0x0004,
    /// Proposed result of a run entry
    ProposeRunCompletion = 0x0005,
    /// The runtime will not send any further message
    InputClosed = 0x0006,

    /// Input entry
    InputEntry = 0x0400,
    /// Output entry
    OutputEntry = 0x0401,

    /// Get state entry
    GetStateEntry = 0x0800,
    /// Set state entry
    SetStateEntry = 0x0801,
    /// Clear state entry
    ClearStateEntry = 0x0802,
    /// Clear all state entry
    ClearAllStateEntry = 0x0803,

    /// Sleep entry
    SleepEntry = 0x0C00,
    /// Call entry
    CallEntry = 0x0C01,
    /// One-way call entry
    SendEntry = 0x0C02,
    /// Awakeable entry
    AwakeableEntry = 0x0C03,
    /// Complete awakeable entry
    CompleteAwakeableEntry = 0x0C04,
    /// Run (side effect) entry
    RunEntry = 0x0C05,
    /// Cancel invocation entry
    CancelInvocationEntry = 0x0C06,
    /// Get promise entry
    GetPromiseEntry = 0x0C07,
    /// Peek promise entry
    PeekPromiseEntry = 0x0C08,
    /// Complete promise entry
    CompletePromiseEntry = 0x0C09,
}

impl MessageType {
    /// All known message types, in code order.
    pub const ALL: [MessageType; 23] = [
        MessageType::Start,
        MessageType::Completion,
        MessageType::Suspension,
        MessageType::Error,
        MessageType::EntryAck,
        MessageType::ProposeRunCompletion,
        MessageType::InputClosed,
        MessageType::InputEntry,
        MessageType::OutputEntry,
        MessageType::GetStateEntry,
        MessageType::SetStateEntry,
        MessageType::ClearStateEntry,
        MessageType::ClearAllStateEntry,
        MessageType::SleepEntry,
        MessageType::CallEntry,
        MessageType::SendEntry,
        MessageType::AwakeableEntry,
        MessageType::CompleteAwakeableEntry,
        MessageType::RunEntry,
        MessageType::CancelInvocationEntry,
        MessageType::GetPromiseEntry,
        MessageType::PeekPromiseEntry,
        MessageType::CompletePromiseEntry,
    ];

    /// Whether this message is a journal entry.
    pub fn is_entry(&self) -> bool {
        (*self as u16) >= 0x0400
    }

    /// Whether this entry can carry a result inline (and thus the `completed` flag).
    pub fn allows_completed_flag(&self) -> bool {
        matches!(
            self,
            MessageType::GetStateEntry
                | MessageType::SleepEntry
                | MessageType::CallEntry
                | MessageType::AwakeableEntry
                | MessageType::RunEntry
                | MessageType::GetPromiseEntry
                | MessageType::PeekPromiseEntry
        )
    }

    /// Whether the sender of this message can ask for an acknowledgement.
    pub fn allows_requires_ack_flag(&self) -> bool {
        matches!(self, MessageType::ProposeRunCompletion)
    }
}

impl From<MessageType> for u16 {
    fn from(ty: MessageType) -> Self {
        ty as u16
    }
}

impl TryFrom<u16> for MessageType {
    type Error = HeaderError;

    fn try_from(value: u16) -> Result<Self, <Self as TryFrom<u16>>::Error> {
        MessageType::ALL
            .iter()
            .copied()
            .find(|ty| *ty as u16 == value)
            .ok_or(HeaderError::UnknownMessageType(value))
    }
}

/// Errors decoding a header.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("unknown message type {0:#06x}")]
    UnknownMessageType(u16),
}

/// Decoded message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    ty: MessageType,
    length: u32,
    completed: bool,
    requires_ack: bool,
}

impl MessageHeader {
    pub fn new(ty: MessageType, length: u32) -> Self {
        Self {
            ty,
            length,
            completed: false,
            requires_ack: false,
        }
    }

    /// Header of an entry, setting `completed` when the entry carries its result.
    /// The flag is ignored for entries that cannot be completed.
    pub fn new_entry(ty: MessageType, completed: bool, length: u32) -> Self {
        Self {
            completed: completed && ty.allows_completed_flag(),
            ..Self::new(ty, length)
        }
    }

    /// Set the `requires_ack` flag, when the type allows it.
    pub fn with_requires_ack(mut self, requires_ack: bool) -> Self {
        self.requires_ack = requires_ack && self.ty.allows_requires_ack_flag();
        self
    }

    #[inline]
    pub fn message_type(&self) -> MessageType {
        self.ty
    }

    #[inline]
    pub fn frame_length(&self) -> u32 {
        self.length
    }

    #[inline]
    pub fn completed(&self) -> bool {
        self.completed
    }

    #[inline]
    pub fn requires_ack(&self) -> bool {
        self.requires_ack
    }
}

impl TryFrom<u64> for MessageHeader {
    type Error = HeaderError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        let ty = MessageType::try_from((value >> 48) as u16)?;
        Ok(MessageHeader {
            ty,
            length: value as u32,
            completed: ty.allows_completed_flag() && (value & COMPLETED_MASK) != 0,
            requires_ack: ty.allows_requires_ack_flag() && (value & REQUIRES_ACK_MASK) != 0,
        })
    }
}

impl From<MessageHeader> for u64 {
    fn from(header: MessageHeader) -> Self {
        let mut res = ((header.ty as u16 as u64) << 48) | (header.length as u64);
        if header.completed {
            res |= COMPLETED_MASK;
        }
        if header.requires_ack {
            res |= REQUIRES_ACK_MASK;
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_codes_round_trip() {
        for ty in MessageType::ALL {
            assert_eq!(MessageType::try_from(ty as u16).unwrap(), ty);
        }
    }

    #[test]
    fn test_unknown_message_type() {
        assert_eq!(
            MessageType::try_from(0x0007),
            Err(HeaderError::UnknownMessageType(0x0007))
        );
        assert!(MessageType::try_from(0xFFFF).is_err());
    }

    #[test]
    fn test_entry_classification() {
        assert!(!MessageType::Start.is_entry());
        assert!(!MessageType::InputClosed.is_entry());
        assert!(MessageType::InputEntry.is_entry());
        assert!(MessageType::CompletePromiseEntry.is_entry());
    }

    #[test]
    fn test_header_bit_layout() {
        let header = MessageHeader::new_entry(MessageType::CallEntry, true, 0x1234);
        let raw: u64 = header.into();
        assert_eq!(raw >> 48, 0x0C01);
        assert_eq!(raw & 0xFFFF_FFFF, 0x1234);
        assert_ne!(raw & COMPLETED_MASK, 0);
        assert_eq!(raw & REQUIRES_ACK_MASK, 0);
    }

    #[test]
    fn test_completed_flag_dropped_on_non_completable_entries() {
        let header = MessageHeader::new_entry(MessageType::SetStateEntry, true, 3);
        assert!(!header.completed());

        let raw: u64 = u64::from(MessageHeader::new(MessageType::SetStateEntry, 3)) | COMPLETED_MASK;
        let decoded = MessageHeader::try_from(raw).unwrap();
        assert!(!decoded.completed());
    }

    #[test]
    fn test_requires_ack_flag() {
        let header = MessageHeader::new(MessageType::ProposeRunCompletion, 10).with_requires_ack(true);
        let decoded = MessageHeader::try_from(u64::from(header)).unwrap();
        assert!(decoded.requires_ack());
        assert_eq!(decoded.frame_length(), 10);

        let not_allowed = MessageHeader::new(MessageType::CallEntry, 10).with_requires_ack(true);
        assert!(!not_allowed.requires_ack());
    }

    #[test]
    fn test_max_length() {
        let header = MessageHeader::new(MessageType::Completion, u32::MAX);
        let decoded = MessageHeader::try_from(u64::from(header)).unwrap();
        assert_eq!(decoded.frame_length(), u32::MAX);
        assert_eq!(decoded.message_type(), MessageType::Completion);
    }
}
