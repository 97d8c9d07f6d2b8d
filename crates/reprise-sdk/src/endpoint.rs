// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Stream endpoint: serves one invocation per bidirectional byte stream.
//!
//! The runtime writes framed messages (start, journal, completions, acks)
//! and reads back new entries, run proposals, a suspension or an error. The
//! stream's read side reaching EOF closes the invocation's input.

use std::future::Future;
use std::sync::Arc;
use std::task::Context as TaskContext;

use bytes::BytesMut;
use futures::task::{ArcWake, waker};
use reprise_core::{CloseReason, InboundMessage};
use reprise_protocol::{Decoder, FramedStream};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{debug, info, instrument, warn};

use crate::config::SdkConfig;
use crate::context::Context;
use crate::driver::InvocationDriver;
use crate::error::{Result, TerminalError};

const READ_BUFFER_SIZE: usize = 8 * 1024;

struct NotifyWaker(Arc<Notify>);

impl ArcWake for NotifyWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.0.notify_one();
    }
}

/// Serves invocations of one handler.
#[derive(Debug, Clone, Default)]
pub struct Endpoint {
    config: SdkConfig,
}

impl Endpoint {
    pub fn new(config: SdkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    /// Accepts connections forever, one invocation per connection.
    #[instrument(skip_all)]
    pub async fn serve<H, Fut, O>(&self, listener: TcpListener, handler: H) -> Result<()>
    where
        H: Fn(Context) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<O, TerminalError>> + Send + 'static,
        O: Serialize + 'static,
    {
        info!(addr = %listener.local_addr()?, "Endpoint listening");
        loop {
            let (stream, peer) = listener.accept().await?;
            if let Err(err) = stream.set_nodelay(true) {
                debug!(%peer, error = %err, "Failed to set TCP_NODELAY");
            }
            let endpoint = self.clone();
            let handler = handler.clone();
            tokio::spawn(async move {
                match endpoint.serve_stream(stream, handler).await {
                    Ok(reason) => debug!(%peer, ?reason, "Invocation stream finished"),
                    Err(err) => warn!(%peer, error = %err, "Invocation stream failed"),
                }
            });
        }
    }

    /// Serves a single invocation over `stream`, returning how it closed.
    ///
    /// Returns `None` when the runtime closed its input before the handler
    /// could start and the invocation is still open.
    #[instrument(skip_all, fields(max_message_size = self.config.max_message_size))]
    pub async fn serve_stream<S, H, Fut, O>(
        &self,
        stream: S,
        handler: H,
    ) -> Result<Option<CloseReason>>
    where
        S: AsyncRead + AsyncWrite + Send,
        H: FnOnce(Context) -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<O, TerminalError>> + Send + 'static,
        O: Serialize + 'static,
    {
        let (mut reader, writer) = tokio::io::split(stream);
        let mut writer = FramedStream::new(writer);
        let mut decoder = Decoder::new(self.config.max_message_size);
        let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);

        let mut driver = InvocationDriver::new(self.config.vm.clone(), handler);
        let wake = Arc::new(Notify::new());
        let waker = waker(Arc::new(NotifyWaker(wake.clone())));
        let mut input_open = true;
        let mut decode_error = None;

        loop {
            let idle = {
                let mut cx = TaskContext::from_waker(&waker);
                driver.poll(&mut cx).is_pending()
            };
            if idle {
                driver.notify_idle();
            }

            let frames = driver.take_output_frames()?;
            writer.write_frames(&frames).await?;
            if driver.is_completed() {
                break;
            }
            if decode_error.is_some() || (!input_open && !driver.is_started()) {
                break;
            }

            tokio::select! {
                read = reader.read_buf(&mut buf), if input_open => {
                    if read? == 0 {
                        if decoder.buffered() > 0 {
                            warn!(buffered = decoder.buffered(), "Input closed mid-frame");
                        }
                        debug!("Runtime closed its input");
                        input_open = false;
                        if let Err(err) = driver.notify(InboundMessage::InputClosed) {
                            debug!(error = %err, "Input close not applied");
                        }
                    } else {
                        decoder.push(buf.split());
                        loop {
                            match decoder.consume_next() {
                                Ok(Some(frame)) => {
                                    if let Err(err) = driver.notify_frame(&frame) {
                                        warn!(
                                            error = %err,
                                            message_type = ?frame.message_type,
                                            "Runtime message rejected"
                                        );
                                    }
                                }
                                Ok(None) => break,
                                Err(err) => {
                                    warn!(error = %err, "Undecodable input, closing invocation");
                                    driver.notify_decode_error(&err);
                                    input_open = false;
                                    decode_error = Some(err);
                                    break;
                                }
                            }
                        }
                    }
                }
                _ = wake.notified() => {}
            }
        }

        let frames = driver.take_output_frames()?;
        writer.write_frames(&frames).await?;
        writer.into_inner().shutdown().await?;
        match decode_error {
            Some(err) => Err(err.into()),
            None => Ok(driver.close_reason()),
        }
    }
}
