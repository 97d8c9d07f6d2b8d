// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wire format for the invocation stream.
//!
//! Each message is framed as:
//! - 8 bytes: [`MessageHeader`] (big-endian)
//! - N bytes: protobuf payload, N taken from the header

use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::Message;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::header::{HEADER_SIZE, HeaderError, MessageHeader, MessageType};

/// Maximum frame size (64 MB)
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Errors that can occur during frame encoding/decoding
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame too large: {size} bytes (max: {limit})")]
    FrameTooLarge { size: usize, limit: usize },

    #[error(transparent)]
    Header(#[from] HeaderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("connection closed")]
    ConnectionClosed,
}

/// A framed message with its header flags and payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub message_type: MessageType,
    pub completed: bool,
    pub requires_ack: bool,
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame with the given type and message
    pub fn new<M: Message>(message_type: MessageType, msg: &M) -> Result<Self, FrameError> {
        let payload = msg.encode_to_vec();
        if payload.len() > MAX_FRAME_SIZE {
            return Err(FrameError::FrameTooLarge {
                size: payload.len(),
                limit: MAX_FRAME_SIZE,
            });
        }
        Ok(Self {
            message_type,
            completed: false,
            requires_ack: false,
            payload: Bytes::from(payload),
        })
    }

    /// Mark the frame as carrying its entry result inline.
    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = completed && self.message_type.allows_completed_flag();
        self
    }

    /// Ask the receiver to acknowledge this frame.
    pub fn requires_ack(mut self, requires_ack: bool) -> Self {
        self.requires_ack = requires_ack && self.message_type.allows_requires_ack_flag();
        self
    }

    /// The header describing this frame.
    pub fn header(&self) -> MessageHeader {
        MessageHeader::new_entry(self.message_type, self.completed, self.payload.len() as u32)
            .with_requires_ack(self.requires_ack)
    }

    /// Decode the payload as a protobuf message
    pub fn decode<M: Message + Default>(&self) -> Result<M, FrameError> {
        Ok(M::decode(self.payload.clone())?)
    }

    /// Encode the frame to bytes for wire transmission
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Append the encoded frame to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.reserve(HEADER_SIZE + self.payload.len());
        buf.put_u64(self.header().into());
        buf.put(self.payload.clone());
    }

    /// Decode a frame from bytes
    pub fn decode_from_bytes(mut bytes: Bytes) -> Result<Self, FrameError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FrameError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "incomplete frame header",
            )));
        }

        let header = MessageHeader::try_from(bytes.get_u64())?;
        let length = header.frame_length() as usize;

        if length > MAX_FRAME_SIZE {
            return Err(FrameError::FrameTooLarge {
                size: length,
                limit: MAX_FRAME_SIZE,
            });
        }

        if bytes.len() < length {
            return Err(FrameError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "incomplete frame payload",
            )));
        }

        Ok(Self::from_header(header, bytes.split_to(length)))
    }

    fn from_header(header: MessageHeader, payload: Bytes) -> Self {
        Self {
            message_type: header.message_type(),
            completed: header.completed(),
            requires_ack: header.requires_ack(),
            payload,
        }
    }
}

/// Incremental decoder: push bytes as they arrive, pull complete frames out.
pub struct Decoder {
    buf: BytesMut,
    max_frame_size: usize,
    pending_header: Option<MessageHeader>,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl Decoder {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_frame_size,
            pending_header: None,
        }
    }

    /// Append received bytes.
    pub fn push(&mut self, bytes: impl AsRef<[u8]>) {
        self.buf.extend_from_slice(bytes.as_ref());
    }

    /// Number of buffered bytes not yet returned as frames.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Return the next complete frame, or `None` if more bytes are needed.
    pub fn consume_next(&mut self) -> Result<Option<Frame>, FrameError> {
        let header = match self.pending_header.take() {
            Some(header) => header,
            None => {
                if self.buf.len() < HEADER_SIZE {
                    return Ok(None);
                }
                let header = MessageHeader::try_from(self.buf.get_u64())?;
                let length = header.frame_length() as usize;
                if length > self.max_frame_size {
                    return Err(FrameError::FrameTooLarge {
                        size: length,
                        limit: self.max_frame_size,
                    });
                }
                header
            }
        };

        let length = header.frame_length() as usize;
        if self.buf.len() < length {
            self.pending_header = Some(header);
            return Ok(None);
        }

        let payload = self.buf.split_to(length).freeze();
        trace!(message_type = ?header.message_type(), length, "Decoded frame");
        Ok(Some(Frame::from_header(header, payload)))
    }
}

/// Write a frame to an async writer
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &Frame,
) -> Result<(), FrameError> {
    let encoded = frame.encode();
    writer.write_all(&encoded).await?;
    Ok(())
}

/// Read a frame from an async reader
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_frame_size: usize,
) -> Result<Frame, FrameError> {
    let mut header = [0u8; HEADER_SIZE];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(FrameError::ConnectionClosed);
        }
        Err(e) => return Err(e.into()),
    }

    let header = MessageHeader::try_from(u64::from_be_bytes(header))?;
    let length = header.frame_length() as usize;

    if length > max_frame_size {
        return Err(FrameError::FrameTooLarge {
            size: length,
            limit: max_frame_size,
        });
    }

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;

    Ok(Frame::from_header(header, Bytes::from(payload)))
}

/// Framed codec for encoding/decoding frames on a stream
pub struct FramedStream<S> {
    stream: S,
    max_frame_size: usize,
}

impl<S> FramedStream<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: AsyncRead + Unpin> FramedStream<S> {
    /// Read the next frame from the stream
    pub async fn read_frame(&mut self) -> Result<Frame, FrameError> {
        read_frame(&mut self.stream, self.max_frame_size).await
    }
}

impl<S: AsyncWrite + Unpin> FramedStream<S> {
    /// Write a frame to the stream
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), FrameError> {
        write_frame(&mut self.stream, frame).await
    }

    /// Write several frames and flush once.
    pub async fn write_frames(&mut self, frames: &[Frame]) -> Result<(), FrameError> {
        if frames.is_empty() {
            return Ok(());
        }
        let mut buf = BytesMut::new();
        for frame in frames {
            frame.encode_into(&mut buf);
        }
        self.stream.write_all(&buf).await?;
        self.stream.flush().await?;
        Ok(())
    }
}
