// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-invocation state machine.
//!
//! [`InvocationStateMachine`] owns the journal, the completion table and the
//! pending registry of one invocation. It is fed inbound messages by a driver,
//! receives operations from the user code, and queues outbound messages for
//! the driver to send. It never performs IO and never blocks: awaiting an
//! entry returns a [`PendingOperation`] that the caller polls.
//!
//! ```text
//!                 start            entries matched == known
//!  WaitingStart ────────▶ Replaying ───────────────────────▶ Processing ◀──┐
//!                                                                │         │ completion
//!                                                       idle     ▼         │
//!                                                            Suspended ────┘
//!                                                                │ input closed
//!            output / suspension / transient run / fatal error   ▼
//!  ─────────────────────────────────────────────────────────▶ Closed
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::task::{Poll, Waker};
use std::time::Duration;

use bytes::Bytes;
use reprise_protocol::{Frame, FrameError};
use tracing::{debug, info, warn};

use crate::awakeable::awakeable_id;
use crate::codec;
use crate::completion::{Completion, CompletionTable, Failure};
use crate::config::VmOptions;
use crate::eager_state::{EagerState, StateLookup};
use crate::entry::{Entry, EntryKind, InvocationRef, Target};
use crate::error::{Result, VmError};
use crate::journal::{Appended, Journal};
use crate::message::{
    InboundMessage, OutboundMessage, RunProposal, RunResult, StartInfo, TransientFailure,
};
use crate::registry::{PendingOperation, PendingRegistry};

/// Lifecycle of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// No start message received yet.
    WaitingStart,
    /// Re-executing operations recorded in the journal.
    Replaying,
    /// Journaling new operations live.
    Processing,
    /// The user code waits on completions that have not arrived.
    Suspended,
    /// Terminal. See [`CloseReason`].
    Closed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::WaitingStart => "WAITING_START",
            LifecycleState::Replaying => "REPLAYING",
            LifecycleState::Processing => "PROCESSING",
            LifecycleState::Suspended => "SUSPENDED",
            LifecycleState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// Why an invocation closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The output entry was written.
    Output,
    /// Input closed while the user code was waiting; a suspension was sent.
    Suspended,
    /// A transient run failure was proposed; the runtime retries the invocation.
    RetryLater,
    /// A fatal error closed the invocation.
    Failed(VmError),
}

/// State of a run entry when the user code reaches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnter {
    /// The result is already journaled; the closure must not run again.
    Executed(PendingOperation),
    /// The closure must run and its outcome be proposed with
    /// [`InvocationStateMachine::propose_run_completion`].
    NotExecuted(PendingOperation),
}

impl RunEnter {
    pub fn operation(&self) -> PendingOperation {
        match self {
            RunEnter::Executed(op) | RunEnter::NotExecuted(op) => *op,
        }
    }
}

type FatalErrorHook = Box<dyn FnMut(&VmError) + Send>;

/// Journal state machine of a single invocation.
pub struct InvocationStateMachine {
    options: VmOptions,
    state: LifecycleState,
    close_reason: Option<CloseReason>,

    invocation_id: Bytes,
    debug_id: String,
    retry_count: u32,
    input_closed: bool,

    journal: Journal,
    completions: CompletionTable,
    pending: PendingRegistry,
    eager_state: EagerState,
    run_proposals: HashMap<u32, RunProposal>,
    completed_awakeables: HashSet<String>,

    outbox: VecDeque<OutboundMessage>,
    fatal_hooks: Vec<FatalErrorHook>,
}

impl fmt::Debug for InvocationStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationStateMachine")
            .field("debug_id", &self.debug_id)
            .field("state", &self.state)
            .field("known_entries", &self.journal.known_entries())
            .field("issued", &self.journal.issued())
            .field("close_reason", &self.close_reason)
            .finish_non_exhaustive()
    }
}

impl Default for InvocationStateMachine {
    fn default() -> Self {
        Self::new(VmOptions::default())
    }
}

impl InvocationStateMachine {
    pub fn new(options: VmOptions) -> Self {
        Self {
            options,
            state: LifecycleState::WaitingStart,
            close_reason: None,
            invocation_id: Bytes::new(),
            debug_id: String::new(),
            retry_count: 0,
            input_closed: false,
            journal: Journal::default(),
            completions: CompletionTable::new(),
            pending: PendingRegistry::new(),
            eager_state: EagerState::default(),
            run_proposals: HashMap::new(),
            completed_awakeables: HashSet::new(),
            outbox: VecDeque::new(),
            fatal_hooks: Vec::new(),
        }
    }

    /// Registers a hook fired once when a fatal error closes the invocation.
    pub fn on_fatal_error(&mut self, hook: impl FnMut(&VmError) + Send + 'static) {
        self.fatal_hooks.push(Box::new(hook));
    }

    // ========================================================================
    // Progress queries
    // ========================================================================

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn close_reason(&self) -> Option<&CloseReason> {
        self.close_reason.as_ref()
    }

    pub fn invocation_id(&self) -> &Bytes {
        &self.invocation_id
    }

    pub fn debug_id(&self) -> &str {
        &self.debug_id
    }

    /// Whether the user code may run: started, every historical entry
    /// received, not closed.
    pub fn is_ready_to_execute(&self) -> bool {
        matches!(
            self.state,
            LifecycleState::Replaying | LifecycleState::Processing | LifecycleState::Suspended
        ) && self.journal.received_all()
    }

    pub fn is_replaying(&self) -> bool {
        self.state == LifecycleState::Replaying
    }

    pub fn is_processing(&self) -> bool {
        self.state == LifecycleState::Processing
    }

    pub fn is_completed(&self) -> bool {
        self.state == LifecycleState::Closed
    }

    /// Drains the messages queued for the runtime, in emission order.
    pub fn take_output(&mut self) -> Vec<OutboundMessage> {
        self.outbox.drain(..).collect()
    }

    /// Drains the queued messages as protocol frames.
    pub fn take_output_frames(&mut self) -> std::result::Result<Vec<Frame>, FrameError> {
        self.take_output()
            .iter()
            .map(codec::encode_outbound)
            .collect()
    }

    /// Takes the next resolved operation, in completion arrival order.
    pub fn take_next_notification(&mut self) -> Option<(PendingOperation, Completion)> {
        self.pending.take_next()
    }

    /// Polls a pending operation. Once the invocation closed, operations that
    /// have not been taken yet never complete.
    pub fn poll_pending(
        &mut self,
        operation: &PendingOperation,
        waker: &Waker,
    ) -> Poll<Option<Completion>> {
        if self.state == LifecycleState::Closed {
            return Poll::Pending;
        }
        self.pending.poll(operation, waker)
    }

    /// Takes the completion of an operation if it resolved.
    pub fn take_completion(&mut self, operation: &PendingOperation) -> Option<Completion> {
        self.pending.take(operation)
    }

    /// Drops interest in an operation the user code will never await.
    ///
    /// The entry stays journaled. A forgotten operation no longer keeps the
    /// invocation from suspending, nor is it listed in the suspension.
    pub fn forget(&mut self, operation: &PendingOperation) {
        self.pending.forget(operation);
    }

    // ========================================================================
    // Inbound messages
    // ========================================================================

    /// Feeds a message received from the runtime.
    pub fn notify(&mut self, msg: InboundMessage) -> Result<()> {
        if self.state == LifecycleState::Closed {
            debug!(
                invocation = %self.debug_id,
                message = msg.name(),
                "Ignoring message received after close"
            );
            return Err(VmError::Closed);
        }
        let result = self.handle_message(msg);
        self.guard(result)
    }

    /// Decodes and feeds a frame received from the runtime.
    pub fn notify_frame(&mut self, frame: &Frame) -> Result<()> {
        match codec::decode_inbound(frame) {
            Ok(msg) => self.notify(msg),
            Err(err) => {
                if self.state == LifecycleState::Closed {
                    return Err(VmError::Closed);
                }
                let result: Result<()> = Err(err.into());
                self.guard(result)
            }
        }
    }

    /// Reports that the inbound byte stream can no longer be decoded.
    ///
    /// Closes the invocation with a protocol violation.
    pub fn notify_decode_error(&mut self, err: &FrameError) {
        if self.state != LifecycleState::Closed {
            self.close_with_error(VmError::Decode(err.to_string()));
        }
    }

    /// Reports that the user code has no runnable work left.
    ///
    /// With operations still waiting the invocation suspends; if the runtime
    /// already closed its input a suspension message is sent and the
    /// invocation closes.
    pub fn notify_idle(&mut self) {
        if matches!(
            self.state,
            LifecycleState::WaitingStart | LifecycleState::Closed
        ) {
            return;
        }
        let waiting = self.pending.waiting();
        if waiting.is_empty() || self.pending.has_resolved() {
            return;
        }
        if self.state == LifecycleState::Processing {
            debug!(invocation = %self.debug_id, ?waiting, "Suspending");
            self.state = LifecycleState::Suspended;
        }
        if self.input_closed {
            self.suspend_and_close(waiting);
        }
    }

    fn handle_message(&mut self, msg: InboundMessage) -> Result<()> {
        if self.state == LifecycleState::WaitingStart {
            return match msg {
                InboundMessage::Start(start) => {
                    self.start(start);
                    Ok(())
                }
                other => Err(VmError::UnexpectedMessage {
                    message: other.name(),
                    state: self.state,
                }),
            };
        }

        match msg {
            InboundMessage::Start(_) => Err(VmError::UnexpectedMessage {
                message: "start",
                state: self.state,
            }),
            InboundMessage::Entry(entry) => self.on_historical_entry(entry),
            InboundMessage::Completion { index, completion } => {
                self.on_completion(index, completion)
            }
            InboundMessage::EntryAck { index } => self.on_entry_ack(index),
            InboundMessage::InputClosed => {
                debug!(invocation = %self.debug_id, "Input closed");
                self.input_closed = true;
                if self.state == LifecycleState::Suspended {
                    let waiting = self.pending.waiting();
                    self.suspend_and_close(waiting);
                }
                Ok(())
            }
            InboundMessage::Error { code, message } => Err(VmError::Runtime { code, message }),
        }
    }

    fn start(&mut self, start: StartInfo) {
        info!(
            invocation = %start.debug_id,
            known_entries = start.known_entries,
            retry_count = start.retry_count,
            "Invocation started"
        );
        self.invocation_id = start.invocation_id;
        self.debug_id = start.debug_id;
        self.retry_count = start.retry_count;
        self.journal = Journal::new(start.known_entries);
        self.eager_state = EagerState::new(start.state_map, start.partial_state);
        self.state = if start.known_entries == 0 {
            LifecycleState::Processing
        } else {
            LifecycleState::Replaying
        };
    }

    fn on_historical_entry(&mut self, mut entry: Entry) -> Result<()> {
        let result = entry.take_result();
        let index = self.journal.push_historical(entry)?;
        if let Some(completion) = result {
            self.completions.record(index, completion)?;
        }
        Ok(())
    }

    fn on_completion(&mut self, index: u32, completion: Completion) -> Result<()> {
        let entry = self
            .journal
            .get(index)
            .ok_or(VmError::UnknownEntry { index })?;
        let kind = entry.kind();
        if !kind.is_completable() {
            return Err(VmError::NotCompletable { index, kind });
        }
        self.completions.record(index, completion.clone())?;
        if let Entry::GetState { key, .. } = entry {
            self.eager_state.observe(index, key, &completion);
        }
        self.resolve(index, completion);
        Ok(())
    }

    fn on_entry_ack(&mut self, index: u32) -> Result<()> {
        let completion = self
            .run_proposals
            .remove(&index)
            .and_then(|proposal| proposal.to_completion())
            .ok_or(VmError::UnexpectedAck { index })?;
        debug!(invocation = %self.debug_id, index, "Run result acknowledged");
        self.completions.record(index, completion.clone())?;
        self.resolve(index, completion);
        Ok(())
    }

    fn resolve(&mut self, index: u32, completion: Completion) {
        if self.pending.resolve(index, completion) && self.state == LifecycleState::Suspended {
            debug!(invocation = %self.debug_id, index, "Resuming");
            self.state = LifecycleState::Processing;
        }
    }

    // ========================================================================
    // Closing
    // ========================================================================

    fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.is_fatal() && self.state != LifecycleState::Closed {
                self.close_with_error(err.clone());
            }
        }
        result
    }

    fn close_with_error(&mut self, err: VmError) {
        warn!(
            invocation = %self.debug_id,
            code = err.code(),
            error = %err,
            "Closing invocation after fatal error"
        );
        // Errors reported by the runtime are not echoed back.
        if !matches!(err, VmError::Runtime { .. }) {
            self.outbox.push_back(OutboundMessage::Error {
                code: err.code(),
                message: err.to_string(),
                related_index: err.related_index(),
            });
        }
        self.close(CloseReason::Failed(err.clone()));
        for hook in &mut self.fatal_hooks {
            hook(&err);
        }
    }

    fn suspend_and_close(&mut self, waiting: Vec<u32>) {
        info!(invocation = %self.debug_id, ?waiting, "Invocation suspended");
        self.outbox
            .push_back(OutboundMessage::Suspension { waiting });
        self.close(CloseReason::Suspended);
    }

    fn close(&mut self, reason: CloseReason) {
        self.state = LifecycleState::Closed;
        self.close_reason = Some(reason);
        self.pending.clear_wakers();
    }

    // ========================================================================
    // Journal helpers
    // ========================================================================

    fn ensure_operational(&self) -> Result<()> {
        match self.state {
            LifecycleState::Closed => Err(VmError::Closed),
            LifecycleState::WaitingStart => Err(VmError::NotReady),
            _ if !self.journal.received_all() => Err(VmError::NotReady),
            _ => Ok(()),
        }
    }

    /// Journals an entry issued by the user code. New entries are queued for
    /// the runtime; replayed ones are only matched.
    fn append(&mut self, entry: Entry) -> Result<Appended> {
        self.ensure_operational()?;
        let replaying = self.journal.is_replaying();
        if !replaying && self.state != LifecycleState::Processing {
            self.enter_processing();
        }

        let outgoing = (!replaying).then(|| entry.clone());
        let appended = self.journal.append(entry)?;
        if let Some(entry) = outgoing {
            debug!(
                invocation = %self.debug_id,
                index = appended.index(),
                entry = %entry.describe(),
                "Journaled entry"
            );
            self.outbox.push_back(OutboundMessage::Entry {
                index: appended.index(),
                entry,
            });
        }

        if self.state == LifecycleState::Replaying && !self.journal.is_replaying() {
            self.enter_processing();
        }
        Ok(appended)
    }

    fn enter_processing(&mut self) {
        if self.state == LifecycleState::Replaying {
            info!(
                invocation = %self.debug_id,
                replayed = self.journal.known_entries(),
                "Replay complete"
            );
        }
        self.state = LifecycleState::Processing;
    }

    /// Registers interest in `index`, resolving at once when the result is known.
    fn await_index(&mut self, index: u32) -> Result<PendingOperation> {
        let operation = self.pending.register(index)?;
        if let Some(completion) = self.completions.get(index).cloned() {
            self.pending.resolve(index, completion);
        }
        Ok(operation)
    }

    fn now_millis() -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }

    fn deadline(delay: Duration) -> u64 {
        let delay = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        Self::now_millis().saturating_add(delay)
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Returns the invocation input, journaled at index 0.
    pub fn input(&mut self) -> Result<Bytes> {
        let result = self.input_inner();
        self.guard(result)
    }

    fn input_inner(&mut self) -> Result<Bytes> {
        self.ensure_operational()?;
        let value = match self.journal.get(0) {
            Some(Entry::Input { value }) => value.clone(),
            _ => return Err(VmError::MissingInput),
        };
        if self.journal.issued() == 0 {
            self.append(Entry::Input {
                value: value.clone(),
            })?;
        }
        Ok(value)
    }

    /// Reads a state value. Keys known locally resolve immediately.
    pub fn get_state(&mut self, key: &str) -> Result<PendingOperation> {
        let result = self.get_state_inner(key);
        self.guard(result)
    }

    fn get_state_inner(&mut self, key: &str) -> Result<PendingOperation> {
        self.ensure_operational()?;
        let inline = if self.journal.is_replaying() {
            None
        } else {
            match self.eager_state.get(key) {
                StateLookup::Known(value) => Some(Completion::from(value)),
                StateLookup::Unknown => None,
            }
        };

        let index = self
            .append(Entry::GetState {
                key: key.to_owned(),
                result: inline.clone(),
            })?
            .index();
        if let Some(completion) = inline {
            self.completions.record(index, completion)?;
        }
        if let Some(completion) = self.completions.get(index) {
            self.eager_state.observe(index, key, completion);
        }
        self.await_index(index)
    }

    pub fn set_state(&mut self, key: &str, value: Bytes) -> Result<()> {
        let result = self
            .append(Entry::SetState {
                key: key.to_owned(),
                value: value.clone(),
            })
            .map(|appended| self.eager_state.set(appended.index(), key, value));
        self.guard(result)
    }

    pub fn clear_state(&mut self, key: &str) -> Result<()> {
        let result = self
            .append(Entry::ClearState {
                key: key.to_owned(),
            })
            .map(|appended| self.eager_state.clear(appended.index(), key));
        self.guard(result)
    }

    pub fn clear_all_state(&mut self) -> Result<()> {
        let result = self
            .append(Entry::ClearAllState)
            .map(|appended| self.eager_state.clear_all(appended.index()));
        self.guard(result)
    }

    /// Durable timer. Resolves when the runtime completes the sleep entry.
    pub fn sleep(&mut self, duration: Duration) -> Result<PendingOperation> {
        let result = self
            .append(Entry::Sleep {
                wake_up_time: Self::deadline(duration),
                result: None,
            })
            .and_then(|appended| self.await_index(appended.index()));
        self.guard(result)
    }

    /// Request-response call. Resolves with the callee's response.
    pub fn call(&mut self, target: Target, parameter: Bytes) -> Result<PendingOperation> {
        let result = self
            .append(Entry::Call {
                target,
                parameter,
                result: None,
            })
            .and_then(|appended| self.await_index(appended.index()));
        self.guard(result)
    }

    /// One-way call, optionally delayed. Returns the journal index.
    pub fn send(
        &mut self,
        target: Target,
        parameter: Bytes,
        delay: Option<Duration>,
    ) -> Result<u32> {
        let result = self
            .append(Entry::Send {
                target,
                parameter,
                invoke_time: delay.map(Self::deadline),
            })
            .map(|appended| appended.index());
        self.guard(result)
    }

    /// Creates an awakeable, returning its durable id.
    pub fn awakeable(&mut self) -> Result<(String, PendingOperation)> {
        let result = self
            .append(Entry::Awakeable { result: None })
            .and_then(|appended| {
                let index = appended.index();
                let id = awakeable_id(&self.invocation_id, index);
                Ok((id, self.await_index(index)?))
            });
        self.guard(result)
    }

    /// Completes an awakeable. Each id can be completed once per invocation.
    pub fn complete_awakeable(
        &mut self,
        id: &str,
        result: std::result::Result<Bytes, Failure>,
    ) -> Result<()> {
        self.ensure_operational()?;
        if self.completed_awakeables.contains(id) {
            return Err(VmError::AwakeableAlreadyCompleted { id: id.to_owned() });
        }
        let appended = self.append(Entry::CompleteAwakeable {
            id: id.to_owned(),
            result,
        });
        if appended.is_ok() {
            self.completed_awakeables.insert(id.to_owned());
        }
        self.guard(appended.map(|_| ()))
    }

    /// Waits for a durable promise to be completed.
    pub fn get_promise(&mut self, key: &str) -> Result<PendingOperation> {
        let result = self
            .append(Entry::GetPromise {
                key: key.to_owned(),
                result: None,
            })
            .and_then(|appended| self.await_index(appended.index()));
        self.guard(result)
    }

    /// Reads a durable promise without waiting for it; resolves to `Empty`
    /// when the promise is not completed yet.
    pub fn peek_promise(&mut self, key: &str) -> Result<PendingOperation> {
        let result = self
            .append(Entry::PeekPromise {
                key: key.to_owned(),
                result: None,
            })
            .and_then(|appended| self.await_index(appended.index()));
        self.guard(result)
    }

    /// Completes a durable promise.
    pub fn complete_promise(
        &mut self,
        key: &str,
        completion: std::result::Result<Bytes, Failure>,
    ) -> Result<()> {
        let result = self
            .append(Entry::CompletePromise {
                key: key.to_owned(),
                completion,
            })
            .map(|_| ());
        self.guard(result)
    }

    /// Journals a run entry and tells whether its closure must execute.
    pub fn run(&mut self, name: &str) -> Result<RunEnter> {
        let result = self
            .append(Entry::Run {
                name: name.to_owned(),
                result: None,
            })
            .and_then(|appended| {
                let index = appended.index();
                let executed = self.completions.contains(index);
                let operation = self.await_index(index)?;
                Ok(if executed {
                    RunEnter::Executed(operation)
                } else {
                    RunEnter::NotExecuted(operation)
                })
            });
        self.guard(result)
    }

    /// Proposes the outcome of a run closure to the runtime.
    ///
    /// Successes and permanent failures are resolved once the runtime acks
    /// them. A transient failure is reported with retry metadata and closes
    /// the invocation; when the retry policy is exhausted it is proposed as a
    /// permanent failure instead.
    pub fn propose_run_completion(&mut self, index: u32, outcome: RunResult) -> Result<()> {
        if self.state == LifecycleState::Closed {
            return Err(VmError::Closed);
        }
        let result = self.propose_run_completion_inner(index, outcome);
        self.guard(result)
    }

    fn propose_run_completion_inner(&mut self, index: u32, outcome: RunResult) -> Result<()> {
        let is_run = matches!(
            self.journal.get(index).map(Entry::kind),
            Some(EntryKind::Run)
        );
        if !is_run
            || index >= self.journal.issued()
            || self.completions.contains(index)
            || self.run_proposals.contains_key(&index)
        {
            return Err(VmError::InvalidRunProposal { index });
        }

        let proposal = match outcome {
            RunResult::Success(value) => RunProposal::Success(value),
            RunResult::Failure(failure) => RunProposal::Failure(failure),
            RunResult::Transient(failure) => {
                let attempt = self.retry_count.saturating_add(1);
                let policy = &self.options.retry_policy;
                match policy.next_retry_delay(attempt) {
                    Some(next_retry_delay) => {
                        info!(
                            invocation = %self.debug_id,
                            index,
                            attempt,
                            delay_ms = next_retry_delay.as_millis() as u64,
                            error = %failure,
                            "Run failed transiently, closing for retry"
                        );
                        let transient = TransientFailure {
                            failure,
                            attempt,
                            next_retry_delay,
                            max_attempts: policy.max_attempts,
                            max_delay: policy.max_interval,
                        };
                        self.outbox.push_back(OutboundMessage::ProposeRunCompletion {
                            index,
                            proposal: RunProposal::Transient(transient),
                        });
                        self.close(CloseReason::RetryLater);
                        return Ok(());
                    }
                    None => {
                        warn!(
                            invocation = %self.debug_id,
                            index,
                            attempt,
                            error = %failure,
                            "Run retries exhausted, failing permanently"
                        );
                        RunProposal::Failure(failure)
                    }
                }
            }
        };

        debug!(invocation = %self.debug_id, index, "Proposing run result");
        self.outbox.push_back(OutboundMessage::ProposeRunCompletion {
            index,
            proposal: proposal.clone(),
        });
        self.run_proposals.insert(index, proposal);
        Ok(())
    }

    /// Cancels another invocation.
    pub fn cancel(&mut self, target: InvocationRef) -> Result<()> {
        self.ensure_operational()?;
        if let InvocationRef::Call(index) = target {
            let is_call = index < self.journal.issued()
                && matches!(self.journal.get(index), Some(Entry::Call { .. }));
            if !is_call {
                return Err(VmError::InvalidCancelTarget { index });
            }
        }
        let result = self
            .append(Entry::CancelInvocation { target })
            .map(|_| ());
        self.guard(result)
    }

    /// Writes the output entry and closes the invocation.
    pub fn write_output(&mut self, result: std::result::Result<Bytes, Failure>) -> Result<()> {
        let failed = result.is_err();
        let appended = self.append(Entry::Output { result });
        if appended.is_ok() {
            info!(invocation = %self.debug_id, failed, "Invocation completed");
            self.close(CloseReason::Output);
        }
        self.guard(appended.map(|_| ()))
    }
}
