// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deterministic, single-threaded driver for exercising handlers.
//!
//! Messages are delivered one at a time; after each one the handler runs
//! until it stops making progress. Once the script is exhausted the input
//! is closed, so a handler still waiting suspends.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::Context as TaskContext;

use futures::task::{ArcWake, waker};
use reprise_core::{
    CloseReason, Entry, InboundMessage, OutboundMessage, RunProposal, VmError, VmOptions,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::context::Context;
use crate::driver::InvocationDriver;
use crate::error::TerminalError;

#[derive(Default)]
struct FlagWaker(AtomicBool);

impl FlagWaker {
    fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

impl ArcWake for FlagWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.0.store(true, Ordering::SeqCst);
    }
}

/// Scripted driver: plays the runtime's side of one invocation.
pub struct TestDriver {
    driver: InvocationDriver,
    auto_ack: bool,
    output: Vec<OutboundMessage>,
    errors: Vec<VmError>,
}

impl TestDriver {
    pub fn new<H, Fut, O>(handler: H) -> Self
    where
        H: FnOnce(Context) -> Fut + Send + 'static,
        Fut: Future<Output = Result<O, TerminalError>> + Send + 'static,
        O: Serialize + 'static,
    {
        Self::with_options(VmOptions::default(), handler)
    }

    pub fn with_options<H, Fut, O>(options: VmOptions, handler: H) -> Self
    where
        H: FnOnce(Context) -> Fut + Send + 'static,
        Fut: Future<Output = Result<O, TerminalError>> + Send + 'static,
        O: Serialize + 'static,
    {
        Self {
            driver: InvocationDriver::new(options, handler),
            auto_ack: false,
            output: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Acknowledge every proposed run result as soon as it is emitted, as a
    /// runtime storing it would.
    pub fn with_auto_ack(mut self) -> Self {
        self.auto_ack = true;
        self
    }

    /// Delivers `messages` in order, then closes the input.
    pub fn run(mut self, messages: impl IntoIterator<Item = InboundMessage>) -> TestOutcome {
        self.step();
        for msg in messages {
            if self.driver.is_completed() {
                break;
            }
            self.deliver(msg);
        }
        if !self.driver.is_completed() {
            self.deliver(InboundMessage::InputClosed);
        }
        TestOutcome {
            output: self.output,
            errors: self.errors,
            close_reason: self.driver.close_reason(),
        }
    }

    fn deliver(&mut self, msg: InboundMessage) {
        debug!(message = msg.name(), "Delivering");
        if let Err(err) = self.driver.notify(msg) {
            self.errors.push(err);
        }
        self.step();
    }

    /// Polls until the handler neither progresses nor finishes.
    fn step(&mut self) {
        let flag = Arc::new(FlagWaker::default());
        let waker = waker(flag.clone());
        let mut cx = TaskContext::from_waker(&waker);
        loop {
            let done = self.driver.poll(&mut cx).is_ready();
            let acked = self.drain();
            if done || self.driver.is_completed() {
                return;
            }
            if flag.take() || acked {
                continue;
            }
            self.driver.notify_idle();
            self.drain();
            return;
        }
    }

    /// Collects output; returns whether run proposals were acknowledged.
    fn drain(&mut self) -> bool {
        let output = self.driver.take_output();
        let mut acked = false;
        for msg in &output {
            if let OutboundMessage::ProposeRunCompletion { index, proposal } = msg {
                if self.auto_ack && !matches!(proposal, RunProposal::Transient(_)) {
                    if let Err(err) = self.driver.notify(InboundMessage::EntryAck { index: *index }) {
                        self.errors.push(err);
                    }
                    acked = true;
                }
            }
        }
        self.output.extend(output);
        acked
    }
}

/// Everything the invocation sent, plus how it ended.
#[derive(Debug)]
pub struct TestOutcome {
    pub output: Vec<OutboundMessage>,
    /// Errors returned while delivering messages.
    pub errors: Vec<VmError>,
    pub close_reason: Option<CloseReason>,
}

impl TestOutcome {
    /// Journal entries sent, in order.
    pub fn entries(&self) -> Vec<&Entry> {
        self.output.iter().filter_map(OutboundMessage::entry).collect()
    }

    /// Decoded output value, or the failure the handler returned.
    pub fn output_value<T: DeserializeOwned>(&self) -> Result<T, TerminalError> {
        let result = self.output.iter().find_map(|msg| match msg.entry() {
            Some(Entry::Output { result }) => Some(result.clone()),
            _ => None,
        });
        match result {
            Some(Ok(bytes)) => Ok(serde_json::from_slice(&bytes)?),
            Some(Err(failure)) => Err(failure.into()),
            None => Err(TerminalError::new("invocation sent no output")),
        }
    }

    /// Indices of the suspension message, if the invocation suspended.
    pub fn suspension(&self) -> Option<&[u32]> {
        self.output.iter().find_map(|msg| match msg {
            OutboundMessage::Suspension { waiting } => Some(waiting.as_slice()),
            _ => None,
        })
    }

    /// The error message sent to the runtime, if any.
    pub fn error(&self) -> Option<(u32, &str)> {
        self.output.iter().find_map(|msg| match msg {
            OutboundMessage::Error { code, message, .. } => Some((*code, message.as_str())),
            _ => None,
        })
    }

    /// Run proposals sent, with their journal index.
    pub fn run_proposals(&self) -> Vec<(u32, &RunProposal)> {
        self.output
            .iter()
            .filter_map(|msg| match msg {
                OutboundMessage::ProposeRunCompletion { index, proposal } => {
                    Some((*index, proposal))
                }
                _ => None,
            })
            .collect()
    }
}
