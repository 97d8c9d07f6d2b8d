// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared helpers for reprise-core integration tests.

#![allow(dead_code)]

use bytes::Bytes;
use reprise_core::{
    Completion, Entry, InboundMessage, InvocationStateMachine, OutboundMessage, StartInfo, Target,
    VmOptions,
};

pub const INVOCATION_ID: &[u8] = b"inv-0001";

pub fn json(value: &str) -> Bytes {
    Bytes::from(format!("\"{}\"", value))
}

pub fn greeter() -> Target {
    Target::new("Greeter", "greet")
}

pub fn start_message(known_entries: u32) -> InboundMessage {
    InboundMessage::Start(StartInfo {
        invocation_id: Bytes::from_static(INVOCATION_ID),
        debug_id: "inv-0001".to_string(),
        known_entries,
        ..Default::default()
    })
}

pub fn input_entry(value: &str) -> Entry {
    Entry::Input { value: json(value) }
}

pub fn call_entry(parameter: &str, result: Option<Completion>) -> Entry {
    Entry::Call {
        target: greeter(),
        parameter: json(parameter),
        result,
    }
}

pub fn completion(index: u32, value: &str) -> InboundMessage {
    InboundMessage::Completion {
        index,
        completion: Completion::Success(json(value)),
    }
}

/// Starts a state machine and feeds it the historical journal.
pub fn replaying(options: VmOptions, historical: Vec<Entry>) -> InvocationStateMachine {
    let mut vm = InvocationStateMachine::new(options);
    vm.notify(start_message(historical.len() as u32))
        .expect("start");
    for entry in historical {
        vm.notify(InboundMessage::Entry(entry)).expect("entry");
    }
    assert!(vm.is_ready_to_execute());
    vm
}

/// A fresh invocation whose only historical entry is the input.
pub fn with_input(value: &str) -> InvocationStateMachine {
    replaying(VmOptions::default(), vec![input_entry(value)])
}

/// Entries of the outbound messages, in order.
pub fn sent_entries(output: &[OutboundMessage]) -> Vec<Entry> {
    output
        .iter()
        .filter_map(|msg| msg.entry().cloned())
        .collect()
}
