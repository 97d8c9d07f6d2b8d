// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for reprise-core.
//!
//! Every [`VmError`] maps to the numeric code sent in the outbound error
//! message. Fatal errors close the invocation; the few non-fatal ones reject a
//! single operation and leave the invocation running.

use thiserror::Error;

use crate::entry::EntryKind;
use crate::state_machine::LifecycleState;

/// Result type using VmError
pub type Result<T> = std::result::Result<T, VmError>;

/// Internal error.
pub const INTERNAL_ERROR_CODE: u32 = 500;
/// Cancelled operation.
pub const CANCELLED_ERROR_CODE: u32 = 409;
/// Re-executed code diverged from the recorded journal.
pub const JOURNAL_MISMATCH_CODE: u32 = 570;
/// The runtime or the caller broke the protocol.
pub const PROTOCOL_VIOLATION_CODE: u32 = 571;

/// Errors raised by the invocation state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    #[error("journal mismatch at index {index}: recorded {expected}, replayed {actual}")]
    JournalMismatch {
        index: u32,
        expected: String,
        actual: String,
    },

    #[error("duplicate completion for entry {index}")]
    DuplicateCompletion { index: u32 },

    #[error("completion for entry {index}, which is not journaled")]
    UnknownEntry { index: u32 },

    #[error("entry {index} of kind {kind} cannot be completed")]
    NotCompletable { index: u32, kind: EntryKind },

    #[error("entry {index} is already awaited")]
    AlreadyAwaited { index: u32 },

    #[error("received more entries than the {known} announced by the start message")]
    TooManyEntries { known: u32 },

    #[error("unexpected {message} message in state {state}")]
    UnexpectedMessage {
        message: &'static str,
        state: LifecycleState,
    },

    #[error("unexpected ack for entry {index}")]
    UnexpectedAck { index: u32 },

    #[error("invocation has no input entry")]
    MissingInput,

    #[error("entry {index} is not a run awaiting its result")]
    InvalidRunProposal { index: u32 },

    #[error("runtime closed the invocation with error {code}: {message}")]
    Runtime { code: u32, message: String },

    #[error("malformed message: {0}")]
    Decode(String),

    #[error("invocation is closed")]
    Closed,

    #[error("invocation is not ready to execute")]
    NotReady,

    #[error("cancel target {index} is not a journaled call")]
    InvalidCancelTarget { index: u32 },

    #[error("awakeable {id} was already completed")]
    AwakeableAlreadyCompleted { id: String },
}

impl VmError {
    /// Code sent to the runtime when this error closes the invocation.
    pub fn code(&self) -> u32 {
        match self {
            VmError::JournalMismatch { .. } => JOURNAL_MISMATCH_CODE,
            VmError::Runtime { code, .. } => *code,
            VmError::InvalidCancelTarget { .. }
            | VmError::AwakeableAlreadyCompleted { .. }
            | VmError::NotReady
            | VmError::Closed => INTERNAL_ERROR_CODE,
            _ => PROTOCOL_VIOLATION_CODE,
        }
    }

    /// Journal index the error relates to, if any.
    pub fn related_index(&self) -> Option<u32> {
        match self {
            VmError::JournalMismatch { index, .. }
            | VmError::DuplicateCompletion { index }
            | VmError::UnknownEntry { index }
            | VmError::NotCompletable { index, .. }
            | VmError::AlreadyAwaited { index }
            | VmError::UnexpectedAck { index }
            | VmError::InvalidRunProposal { index } => Some(*index),
            _ => None,
        }
    }

    /// Whether the error closes the invocation.
    ///
    /// Non-fatal errors reject one operation without touching the journal.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            VmError::InvalidCancelTarget { .. }
                | VmError::AwakeableAlreadyCompleted { .. }
                | VmError::NotReady
                | VmError::Closed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let mismatch = VmError::JournalMismatch {
            index: 1,
            expected: "Call(Greeter/greet)".into(),
            actual: "Sleep".into(),
        };
        assert_eq!(mismatch.code(), 570);
        assert!(mismatch.is_fatal());
        assert!(mismatch.to_string().contains("Call(Greeter/greet)"));

        assert_eq!(VmError::DuplicateCompletion { index: 0 }.code(), 571);
        assert_eq!(VmError::DuplicateCompletion { index: 4 }.related_index(), Some(4));
        assert_eq!(VmError::MissingInput.related_index(), None);
        assert_eq!(
            VmError::Runtime {
                code: 503,
                message: "gone".into()
            }
            .code(),
            503
        );
    }

    #[test]
    fn test_non_fatal_errors() {
        assert!(!VmError::Closed.is_fatal());
        assert!(!VmError::InvalidCancelTarget { index: 2 }.is_fatal());
        assert!(
            !VmError::AwakeableAlreadyCompleted {
                id: "prom_1abc".into()
            }
            .is_fatal()
        );
        assert!(VmError::UnexpectedAck { index: 3 }.is_fatal());
    }
}
