// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Binds a handler to an invocation state machine.
//!
//! [`InvocationDriver`] owns the state machine and the handler future. Its
//! owner feeds it runtime messages, polls it with its own waker, reports
//! idleness and forwards the output; see [`TestDriver`](crate::TestDriver)
//! and [`Endpoint`](crate::Endpoint).

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context as TaskContext, Poll};

use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use reprise_core::{
    CloseReason, Failure, InboundMessage, InvocationStateMachine, OutboundMessage, VmOptions,
};
use reprise_protocol::{Frame, FrameError};
use serde::Serialize;
use tracing::{debug, info};

use crate::context::{Context, SharedVm};
use crate::error::TerminalError;

type HandlerFuture = BoxFuture<'static, Result<Bytes, TerminalError>>;
type HandlerFactory = Box<dyn FnOnce(Context) -> HandlerFuture + Send>;

/// One invocation: its state machine plus the handler executing it.
pub struct InvocationDriver {
    vm: SharedVm,
    runs_in_flight: Arc<AtomicUsize>,
    factory: Option<HandlerFactory>,
    handler: Option<HandlerFuture>,
}

impl InvocationDriver {
    /// Creates a driver; the handler starts once the whole historical journal
    /// was received.
    pub fn new<H, Fut, O>(options: VmOptions, handler: H) -> Self
    where
        H: FnOnce(Context) -> Fut + Send + 'static,
        Fut: Future<Output = Result<O, TerminalError>> + Send + 'static,
        O: Serialize + 'static,
    {
        let factory: HandlerFactory = Box::new(move |ctx| {
            async move {
                let output = handler(ctx).await?;
                Ok(Bytes::from(serde_json::to_vec(&output)?))
            }
            .boxed()
        });
        Self {
            vm: Arc::new(Mutex::new(InvocationStateMachine::new(options))),
            runs_in_flight: Arc::new(AtomicUsize::new(0)),
            factory: Some(factory),
            handler: None,
        }
    }

    /// Feeds a runtime message.
    pub fn notify(&self, msg: InboundMessage) -> reprise_core::Result<()> {
        self.vm.lock().notify(msg)
    }

    /// Decodes and feeds a runtime frame.
    pub fn notify_frame(&self, frame: &Frame) -> reprise_core::Result<()> {
        self.vm.lock().notify_frame(frame)
    }

    /// Reports an inbound stream that can no longer be decoded.
    pub fn notify_decode_error(&self, err: &FrameError) {
        self.vm.lock().notify_decode_error(err);
    }

    /// Reports that the handler returned `Pending` with no wake-up queued.
    /// Ignored while a run closure executes.
    pub fn notify_idle(&self) {
        if self.runs_in_flight.load(Ordering::SeqCst) == 0 {
            self.vm.lock().notify_idle();
        }
    }

    /// Polls the handler. Ready once the invocation closed.
    pub fn poll(&mut self, cx: &mut TaskContext<'_>) -> Poll<()> {
        if self.vm.lock().is_completed() {
            self.handler = None;
            return Poll::Ready(());
        }

        if self.handler.is_none() {
            match self.start_handler() {
                Some(handler) => self.handler = Some(handler),
                None if self.vm.lock().is_completed() => return Poll::Ready(()),
                None => return Poll::Pending,
            }
        }

        let Some(handler) = self.handler.as_mut() else {
            return Poll::Pending;
        };
        match handler.as_mut().poll(cx) {
            Poll::Ready(result) => {
                self.handler = None;
                let written = self.vm.lock().write_output(result.map_err(Failure::from));
                if let Err(err) = written {
                    debug!(error = %err, "Output not written");
                }
                Poll::Ready(())
            }
            Poll::Pending if self.vm.lock().is_completed() => {
                self.handler = None;
                Poll::Ready(())
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn start_handler(&mut self) -> Option<HandlerFuture> {
        let input = {
            let mut vm = self.vm.lock();
            if !vm.is_ready_to_execute() {
                return None;
            }
            let input = vm.input().ok()?;
            info!(
                invocation = %vm.debug_id(),
                replaying = vm.is_replaying(),
                "Starting handler"
            );
            input
        };
        let factory = self.factory.take()?;
        let ctx = Context::new(self.vm.clone(), input, self.runs_in_flight.clone());
        Some(factory(ctx))
    }

    /// Drains the messages for the runtime.
    pub fn take_output(&self) -> Vec<OutboundMessage> {
        self.vm.lock().take_output()
    }

    /// Drains the messages for the runtime as frames.
    pub fn take_output_frames(&self) -> Result<Vec<Frame>, FrameError> {
        self.vm.lock().take_output_frames()
    }

    /// Whether the handler was started.
    pub fn is_started(&self) -> bool {
        self.factory.is_none()
    }

    pub fn is_completed(&self) -> bool {
        self.vm.lock().is_completed()
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.vm.lock().close_reason().cloned()
    }
}
