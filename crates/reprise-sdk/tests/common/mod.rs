// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared helpers for reprise-sdk integration tests.

#![allow(dead_code)]

use bytes::Bytes;
use reprise_sdk::{
    Completion, Context, Entry, Failure, InboundMessage, StartInfo, Target, TerminalError,
};
use serde::Serialize;

pub const INVOCATION_ID: &[u8] = b"inv-0001";

pub fn json<T: Serialize + ?Sized>(value: &T) -> Bytes {
    Bytes::from(serde_json::to_vec(value).unwrap())
}

pub fn upper() -> Target {
    Target::new("Upper", "upper")
}

pub fn start(known_entries: u32) -> InboundMessage {
    InboundMessage::Start(StartInfo {
        invocation_id: Bytes::from_static(INVOCATION_ID),
        debug_id: "inv-0001".to_string(),
        known_entries,
        ..Default::default()
    })
}

pub fn input(value: &str) -> InboundMessage {
    InboundMessage::Entry(Entry::Input { value: json(value) })
}

pub fn completion<T: Serialize + ?Sized>(index: u32, value: &T) -> InboundMessage {
    InboundMessage::Completion {
        index,
        completion: Completion::Success(json(value)),
    }
}

pub fn failed(index: u32, code: u32, message: &str) -> InboundMessage {
    InboundMessage::Completion {
        index,
        completion: Completion::Failure(Failure::new(code, message)),
    }
}

pub fn call_entry(parameter: &str, result: Option<&str>) -> Entry {
    Entry::Call {
        target: upper(),
        parameter: json(parameter),
        result: result.map(|value| Completion::Success(json(value))),
    }
}

/// Calls `Upper` twice, awaits the second response first and stores it in
/// state before awaiting the first.
pub async fn greet(ctx: Context) -> Result<String, TerminalError> {
    let name: String = ctx.input()?;

    let first = ctx.call::<_, String>(upper(), "Francesco");
    let second = ctx.call::<_, String>(upper(), &name);

    let second = second.await?;
    ctx.set_state("A2", &second)?;
    let first = first.await?;

    Ok(format!("Hello {}-{}", first, second))
}
