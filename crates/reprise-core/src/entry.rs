// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Journal entries.

use std::fmt;

use bytes::Bytes;

use crate::completion::{Completion, Failure};

/// Target of a call or send.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub service: String,
    pub handler: String,
    /// Key of a keyed (virtual object) target.
    pub key: Option<String>,
}

impl Target {
    pub fn new(service: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            handler: handler.into(),
            key: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{}/{}/{}", self.service, key, self.handler),
            None => write!(f, "{}/{}", self.service, self.handler),
        }
    }
}

/// Invocation targeted by a cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationRef {
    /// An invocation known by its id.
    Id(String),
    /// The invocation started by the call entry at this journal index.
    Call(u32),
}

/// Kind of a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Input,
    Output,
    GetState,
    SetState,
    ClearState,
    ClearAllState,
    Sleep,
    Call,
    Send,
    Awakeable,
    CompleteAwakeable,
    GetPromise,
    PeekPromise,
    CompletePromise,
    Run,
    CancelInvocation,
}

impl EntryKind {
    /// Whether entries of this kind receive a completion.
    pub fn is_completable(&self) -> bool {
        matches!(
            self,
            EntryKind::GetState
                | EntryKind::Sleep
                | EntryKind::Call
                | EntryKind::Awakeable
                | EntryKind::GetPromise
                | EntryKind::PeekPromise
                | EntryKind::Run
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Input => "Input",
            EntryKind::Output => "Output",
            EntryKind::GetState => "GetState",
            EntryKind::SetState => "SetState",
            EntryKind::ClearState => "ClearState",
            EntryKind::ClearAllState => "ClearAllState",
            EntryKind::Sleep => "Sleep",
            EntryKind::Call => "Call",
            EntryKind::Send => "Send",
            EntryKind::Awakeable => "Awakeable",
            EntryKind::CompleteAwakeable => "CompleteAwakeable",
            EntryKind::GetPromise => "GetPromise",
            EntryKind::PeekPromise => "PeekPromise",
            EntryKind::CompletePromise => "CompletePromise",
            EntryKind::Run => "Run",
            EntryKind::CancelInvocation => "CancelInvocation",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A journal entry.
///
/// Completable entries carry an optional inline `result`: set on historical
/// entries that were completed before the invocation was interrupted, and on
/// live entries resolved locally (eager state).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Input {
        value: Bytes,
    },
    Output {
        result: Result<Bytes, Failure>,
    },
    GetState {
        key: String,
        result: Option<Completion>,
    },
    SetState {
        key: String,
        value: Bytes,
    },
    ClearState {
        key: String,
    },
    ClearAllState,
    Sleep {
        /// Milliseconds since unix epoch.
        wake_up_time: u64,
        result: Option<Completion>,
    },
    Call {
        target: Target,
        parameter: Bytes,
        result: Option<Completion>,
    },
    Send {
        target: Target,
        parameter: Bytes,
        /// Milliseconds since unix epoch, `None` for immediate delivery.
        invoke_time: Option<u64>,
    },
    Awakeable {
        result: Option<Completion>,
    },
    CompleteAwakeable {
        id: String,
        result: Result<Bytes, Failure>,
    },
    GetPromise {
        key: String,
        result: Option<Completion>,
    },
    PeekPromise {
        key: String,
        result: Option<Completion>,
    },
    CompletePromise {
        key: String,
        completion: Result<Bytes, Failure>,
    },
    Run {
        name: String,
        result: Option<Completion>,
    },
    CancelInvocation {
        target: InvocationRef,
    },
}

impl Entry {
    pub fn kind(&self) -> EntryKind {
        match self {
            Entry::Input { .. } => EntryKind::Input,
            Entry::Output { .. } => EntryKind::Output,
            Entry::GetState { .. } => EntryKind::GetState,
            Entry::SetState { .. } => EntryKind::SetState,
            Entry::ClearState { .. } => EntryKind::ClearState,
            Entry::ClearAllState => EntryKind::ClearAllState,
            Entry::Sleep { .. } => EntryKind::Sleep,
            Entry::Call { .. } => EntryKind::Call,
            Entry::Send { .. } => EntryKind::Send,
            Entry::Awakeable { .. } => EntryKind::Awakeable,
            Entry::CompleteAwakeable { .. } => EntryKind::CompleteAwakeable,
            Entry::GetPromise { .. } => EntryKind::GetPromise,
            Entry::PeekPromise { .. } => EntryKind::PeekPromise,
            Entry::CompletePromise { .. } => EntryKind::CompletePromise,
            Entry::Run { .. } => EntryKind::Run,
            Entry::CancelInvocation { .. } => EntryKind::CancelInvocation,
        }
    }

    /// Inline result of a completable entry.
    pub fn result(&self) -> Option<&Completion> {
        match self {
            Entry::GetState { result, .. }
            | Entry::Sleep { result, .. }
            | Entry::Call { result, .. }
            | Entry::Awakeable { result }
            | Entry::GetPromise { result, .. }
            | Entry::PeekPromise { result, .. }
            | Entry::Run { result, .. } => result.as_ref(),
            _ => None,
        }
    }

    /// Removes and returns the inline result.
    pub fn take_result(&mut self) -> Option<Completion> {
        match self {
            Entry::GetState { result, .. }
            | Entry::Sleep { result, .. }
            | Entry::Call { result, .. }
            | Entry::Awakeable { result }
            | Entry::GetPromise { result, .. }
            | Entry::PeekPromise { result, .. }
            | Entry::Run { result, .. } => result.take(),
            _ => None,
        }
    }

    /// Whether a re-issued entry is the same operation as this historical one.
    ///
    /// Compares the kind plus the stable identity of the operation. Payloads
    /// that legitimately vary between executions (wake-up times, parameters,
    /// inline results) are not compared.
    pub fn matches(&self, other: &Entry) -> bool {
        match (self, other) {
            (Entry::GetState { key: a, .. }, Entry::GetState { key: b, .. })
            | (Entry::SetState { key: a, .. }, Entry::SetState { key: b, .. })
            | (Entry::ClearState { key: a }, Entry::ClearState { key: b })
            | (Entry::GetPromise { key: a, .. }, Entry::GetPromise { key: b, .. })
            | (Entry::PeekPromise { key: a, .. }, Entry::PeekPromise { key: b, .. })
            | (Entry::CompletePromise { key: a, .. }, Entry::CompletePromise { key: b, .. })
            | (Entry::Run { name: a, .. }, Entry::Run { name: b, .. })
            | (Entry::CompleteAwakeable { id: a, .. }, Entry::CompleteAwakeable { id: b, .. }) => {
                a == b
            }
            (Entry::Call { target: a, .. }, Entry::Call { target: b, .. })
            | (Entry::Send { target: a, .. }, Entry::Send { target: b, .. }) => a == b,
            _ => self.kind() == other.kind(),
        }
    }

    /// Short description used in diagnostics, e.g. `Call(Greeter/greet)`.
    pub fn describe(&self) -> String {
        match self {
            Entry::GetState { key, .. }
            | Entry::SetState { key, .. }
            | Entry::ClearState { key }
            | Entry::GetPromise { key, .. }
            | Entry::PeekPromise { key, .. }
            | Entry::CompletePromise { key, .. } => format!("{}({})", self.kind(), key),
            Entry::Run { name, .. } => format!("Run({})", name),
            Entry::CompleteAwakeable { id, .. } => format!("CompleteAwakeable({})", id),
            Entry::Call { target, .. } | Entry::Send { target, .. } => {
                format!("{}({})", self.kind(), target)
            }
            _ => self.kind().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(service: &str, handler: &str, parameter: &'static [u8]) -> Entry {
        Entry::Call {
            target: Target::new(service, handler),
            parameter: Bytes::from_static(parameter),
            result: None,
        }
    }

    #[test]
    fn test_completable_kinds() {
        assert!(EntryKind::Call.is_completable());
        assert!(EntryKind::Run.is_completable());
        assert!(EntryKind::PeekPromise.is_completable());
        assert!(!EntryKind::Send.is_completable());
        assert!(!EntryKind::Output.is_completable());
        assert!(!EntryKind::CompletePromise.is_completable());
    }

    #[test]
    fn test_matches_compares_identity_not_payload() {
        let historical = call("Greeter", "greet", b"\"Francesco\"");
        assert!(historical.matches(&call("Greeter", "greet", b"\"Till\"")));
        assert!(!historical.matches(&call("Greeter", "farewell", b"\"Francesco\"")));
        assert!(!historical.matches(&Entry::Awakeable { result: None }));

        let sleep_a = Entry::Sleep {
            wake_up_time: 10,
            result: None,
        };
        let sleep_b = Entry::Sleep {
            wake_up_time: 99,
            result: None,
        };
        assert!(sleep_a.matches(&sleep_b));
    }

    #[test]
    fn test_matches_state_key() {
        let set_a = Entry::SetState {
            key: "A".into(),
            value: Bytes::new(),
        };
        let set_b = Entry::SetState {
            key: "B".into(),
            value: Bytes::new(),
        };
        assert!(!set_a.matches(&set_b));
        assert!(set_a.matches(&set_a.clone()));
    }

    #[test]
    fn test_take_result() {
        let mut entry = Entry::Run {
            name: "fetch".into(),
            result: Some(Completion::Empty),
        };
        assert_eq!(entry.result(), Some(&Completion::Empty));
        assert_eq!(entry.take_result(), Some(Completion::Empty));
        assert_eq!(entry.result(), None);
    }

    #[test]
    fn test_describe() {
        assert_eq!(
            call("Greeter", "greet", b"").describe(),
            "Call(Greeter/greet)"
        );
        assert_eq!(Entry::ClearAllState.describe(), "ClearAllState");
    }
}
