// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Handler-facing context.
//!
//! Every method journals its operation synchronously, at call time, so the
//! journal order is the order in which the handler issues operations and not
//! the order in which it awaits them. Values cross the journal as JSON.
//!
//! Errors come in two flavours:
//! - business failures ([`TerminalError`]) are returned to the handler, which
//!   may handle them like any other value;
//! - protocol failures close the invocation. They are never returned: the
//!   affected futures stay pending and the driver tears the handler down.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use reprise_core::{
    Completion, Failure, InvocationRef, InvocationStateMachine, PendingOperation, RunEnter,
    RunResult, Target, VmError,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{RunError, TerminalError};

/// State machine shared between the driver and the handler's futures.
pub type SharedVm = Arc<Mutex<InvocationStateMachine>>;

/// Handle passed to invocation handlers.
#[derive(Clone)]
pub struct Context {
    vm: SharedVm,
    input: Bytes,
    runs_in_flight: Arc<AtomicUsize>,
}

impl Context {
    pub(crate) fn new(vm: SharedVm, input: Bytes, runs_in_flight: Arc<AtomicUsize>) -> Self {
        Self {
            vm,
            input,
            runs_in_flight,
        }
    }

    /// Debug id of the running invocation.
    pub fn invocation_id(&self) -> String {
        self.vm.lock().debug_id().to_owned()
    }

    /// Deserializes the invocation input.
    pub fn input<T: DeserializeOwned>(&self) -> Result<T, TerminalError> {
        Ok(serde_json::from_slice(&self.input)?)
    }

    /// Raw input bytes.
    pub fn raw_input(&self) -> &Bytes {
        &self.input
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    /// Reads a state value; `None` when the key is unset.
    pub fn get_state<T: DeserializeOwned>(&self, key: &str) -> DurableFuture<Option<T>> {
        let op = self.apply(|vm| vm.get_state(key));
        self.future(op, decode_optional::<T>)
    }

    pub fn set_state<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), TerminalError> {
        let value = Bytes::from(serde_json::to_vec(value)?);
        self.apply(|vm| vm.set_state(key, value)).unwrap_or(Ok(()))
    }

    pub fn clear_state(&self, key: &str) {
        self.apply(|vm| vm.clear_state(key));
    }

    pub fn clear_all_state(&self) {
        self.apply(|vm| vm.clear_all_state());
    }

    // ------------------------------------------------------------------
    // Timers and invocations
    // ------------------------------------------------------------------

    /// Durable sleep; survives suspension and replay.
    pub fn sleep(&self, duration: Duration) -> DurableFuture<()> {
        let op = self.apply(|vm| vm.sleep(duration));
        self.future(op, decode_unit)
    }

    /// Calls another handler and waits for its response.
    pub fn call<Req, Res>(&self, target: Target, request: &Req) -> DurableFuture<Res>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let op = match serde_json::to_vec(request) {
            Ok(parameter) => self.apply(|vm| vm.call(target, Bytes::from(parameter))),
            Err(err) => Some(Err(err.into())),
        };
        self.future(op, decode_value::<Res>)
    }

    /// Invokes another handler without waiting, optionally after `delay`.
    pub fn send<Req: Serialize + ?Sized>(
        &self,
        target: Target,
        request: &Req,
        delay: Option<Duration>,
    ) -> Result<(), TerminalError> {
        let parameter = Bytes::from(serde_json::to_vec(request)?);
        match self.apply(|vm| vm.send(target, parameter, delay)) {
            Some(Err(err)) => Err(err),
            _ => Ok(()),
        }
    }

    /// Cancels another invocation, e.g. one started by
    /// [`call`](Self::call) (see [`DurableFuture::index`]).
    pub fn cancel(&self, target: InvocationRef) -> Result<(), TerminalError> {
        self.apply(|vm| vm.cancel(target)).unwrap_or(Ok(()))
    }

    // ------------------------------------------------------------------
    // Awakeables and promises
    // ------------------------------------------------------------------

    /// Creates an awakeable. Hand the id to an external system; the future
    /// resolves when the awakeable is completed.
    pub fn awakeable<T: DeserializeOwned>(&self) -> (String, DurableFuture<T>) {
        let created = self.apply(|vm| vm.awakeable());
        let (id, op) = match created {
            Some(Ok((id, op))) => (id, Some(Ok(op))),
            Some(Err(err)) => (String::new(), Some(Err(err))),
            None => (String::new(), None),
        };
        (id, self.future(op, decode_value::<T>))
    }

    pub fn resolve_awakeable<T: Serialize + ?Sized>(
        &self,
        id: &str,
        value: &T,
    ) -> Result<(), TerminalError> {
        let value = Bytes::from(serde_json::to_vec(value)?);
        self.apply(|vm| vm.complete_awakeable(id, Ok(value)))
            .unwrap_or(Ok(()))
    }

    pub fn reject_awakeable(&self, id: &str, failure: TerminalError) -> Result<(), TerminalError> {
        self.apply(|vm| vm.complete_awakeable(id, Err(failure.into())))
            .unwrap_or(Ok(()))
    }

    /// Waits for the durable promise `key` to be completed.
    pub fn promise<T: DeserializeOwned>(&self, key: &str) -> DurableFuture<T> {
        let op = self.apply(|vm| vm.get_promise(key));
        self.future(op, decode_value::<T>)
    }

    /// Reads the durable promise `key`; `None` while it is not completed.
    pub fn peek_promise<T: DeserializeOwned>(&self, key: &str) -> DurableFuture<Option<T>> {
        let op = self.apply(|vm| vm.peek_promise(key));
        self.future(op, decode_optional::<T>)
    }

    pub fn resolve_promise<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), TerminalError> {
        let value = Bytes::from(serde_json::to_vec(value)?);
        self.apply(|vm| vm.complete_promise(key, Ok(value)))
            .unwrap_or(Ok(()))
    }

    pub fn reject_promise(&self, key: &str, failure: TerminalError) -> Result<(), TerminalError> {
        self.apply(|vm| vm.complete_promise(key, Err(failure.into())))
            .unwrap_or(Ok(()))
    }

    // ------------------------------------------------------------------
    // Side effects
    // ------------------------------------------------------------------

    /// Runs a non-deterministic side effect at most once per successful
    /// attempt and journals its result.
    ///
    /// On replay the journaled result is returned and `closure` is not
    /// called. A [`RunError::Transient`] closes the invocation and lets the
    /// runtime retry it with backoff; the returned future then never
    /// resolves.
    pub fn run<'a, T, F, Fut>(
        &self,
        name: &str,
        closure: F,
    ) -> BoxFuture<'a, Result<T, TerminalError>>
    where
        T: Serialize + DeserializeOwned + Send + 'a,
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<T, RunError>> + Send + 'a,
    {
        let entered = self.apply(|vm| vm.run(name));
        let vm = self.vm.clone();
        let runs_in_flight = self.runs_in_flight.clone();
        let name = name.to_owned();

        async move {
            let enter = match entered {
                Some(Ok(enter)) => enter,
                Some(Err(err)) => return Err(err),
                None => return halted().await,
            };

            if let RunEnter::NotExecuted(op) = enter {
                debug!(run = %name, index = op.index(), "Executing run closure");
                let outcome = {
                    let _in_flight = InFlight::enter(runs_in_flight);
                    closure().await
                };
                let result = match outcome {
                    Ok(value) => match serde_json::to_vec(&value) {
                        Ok(bytes) => RunResult::Success(Bytes::from(bytes)),
                        Err(err) => RunResult::Failure(TerminalError::from(err).into()),
                    },
                    Err(RunError::Terminal(err)) => RunResult::Failure(err.into()),
                    Err(RunError::Transient(err)) => {
                        RunResult::Transient(Failure::new(500, format!("{:#}", err)))
                    }
                };
                let proposed = vm.lock().propose_run_completion(op.index(), result);
                if let Err(err) = proposed {
                    debug!(run = %name, error = %err, "Run result not proposed");
                    return halted().await;
                }
            }

            DurableFuture::new(vm, Some(Ok(enter.operation())), decode_value::<T>).await
        }
        .boxed()
    }

    /// Applies an operation to the state machine.
    ///
    /// Returns `None` when the operation closed the invocation, or it was
    /// already closed; recoverable rejections become a [`TerminalError`].
    fn apply<R>(
        &self,
        op: impl FnOnce(&mut InvocationStateMachine) -> reprise_core::Result<R>,
    ) -> Option<Result<R, TerminalError>> {
        let result = op(&mut self.vm.lock());
        match result {
            Ok(value) => Some(Ok(value)),
            Err(err) if err.is_fatal() || err == VmError::Closed => {
                debug!(error = %err, "Operation dropped, invocation closed");
                None
            }
            Err(err) => Some(Err(TerminalError::with_code(err.code(), err.to_string()))),
        }
    }

    fn future<T>(
        &self,
        op: Option<Result<PendingOperation, TerminalError>>,
        decode: fn(Completion) -> Result<T, TerminalError>,
    ) -> DurableFuture<T> {
        DurableFuture::new(self.vm.clone(), op, decode)
    }
}

/// Future of a journaled operation; resolves with the operation's completion.
///
/// Dropping it does not cancel the operation: the entry stays journaled, but
/// the invocation no longer waits for its completion before suspending.
#[must_use = "futures do nothing unless awaited"]
pub struct DurableFuture<T> {
    vm: SharedVm,
    state: FutureState,
    decode: fn(Completion) -> Result<T, TerminalError>,
}

enum FutureState {
    Waiting(PendingOperation),
    Rejected(Option<TerminalError>),
    /// Invocation closed, or the value was already taken.
    Halted,
}

impl<T> DurableFuture<T> {
    fn new(
        vm: SharedVm,
        op: Option<Result<PendingOperation, TerminalError>>,
        decode: fn(Completion) -> Result<T, TerminalError>,
    ) -> Self {
        let state = match op {
            Some(Ok(op)) => FutureState::Waiting(op),
            Some(Err(err)) => FutureState::Rejected(Some(err)),
            None => FutureState::Halted,
        };
        Self { vm, state, decode }
    }

    /// Journal index of the operation.
    pub fn index(&self) -> Option<u32> {
        match &self.state {
            FutureState::Waiting(op) => Some(op.index()),
            _ => None,
        }
    }
}

impl<T> Future for DurableFuture<T> {
    type Output = Result<T, TerminalError>;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            FutureState::Waiting(op) => {
                let op = *op;
                let polled = this.vm.lock().poll_pending(&op, cx.waker());
                match polled {
                    Poll::Pending => Poll::Pending,
                    Poll::Ready(Some(completion)) => {
                        this.state = FutureState::Halted;
                        Poll::Ready((this.decode)(completion))
                    }
                    Poll::Ready(None) => {
                        warn!(index = op.index(), "Operation result already taken");
                        this.state = FutureState::Halted;
                        Poll::Pending
                    }
                }
            }
            FutureState::Rejected(err) => match err.take() {
                Some(err) => Poll::Ready(Err(err)),
                None => Poll::Pending,
            },
            FutureState::Halted => Poll::Pending,
        }
    }
}

impl<T> Drop for DurableFuture<T> {
    fn drop(&mut self) {
        if let FutureState::Waiting(op) = &self.state {
            self.vm.lock().forget(op);
        }
    }
}

/// Never resolves; used once the invocation closed.
async fn halted<T>() -> T {
    std::future::pending().await
}

/// Counts run closures currently executing.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn decode_value<T: DeserializeOwned>(completion: Completion) -> Result<T, TerminalError> {
    match completion {
        Completion::Success(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Completion::Empty => Ok(serde_json::from_slice(b"null")?),
        Completion::Failure(failure) => Err(failure.into()),
    }
}

fn decode_optional<T: DeserializeOwned>(
    completion: Completion,
) -> Result<Option<T>, TerminalError> {
    match completion {
        Completion::Success(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Completion::Empty => Ok(None),
        Completion::Failure(failure) => Err(failure.into()),
    }
}

fn decode_unit(completion: Completion) -> Result<(), TerminalError> {
    match completion {
        Completion::Failure(failure) => Err(failure.into()),
        _ => Ok(()),
    }
}
