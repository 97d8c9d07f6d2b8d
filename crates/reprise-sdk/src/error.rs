// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SDK-specific error types.

use reprise_core::{CANCELLED_ERROR_CODE, ConfigError, Failure, INTERNAL_ERROR_CODE, VmError};
use reprise_protocol::FrameError;
use thiserror::Error;

/// Errors that can occur in the SDK.
#[derive(Debug, Error)]
pub enum SdkError {
    /// Configuration error (missing or invalid environment variable)
    #[error("configuration error: {0}")]
    Config(String),

    /// The state machine rejected a message or closed with an error
    #[error(transparent)]
    Vm(#[from] VmError),

    /// Reading or writing frames failed
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error on the endpoint listener
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ConfigError> for SdkError {
    fn from(err: ConfigError) -> Self {
        SdkError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        SdkError::Serialization(err.to_string())
    }
}

/// Type alias for SDK results.
pub type Result<T> = std::result::Result<T, SdkError>;

/// A business failure: ends an operation, a run or the whole handler with a
/// code and message that are recorded in the journal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{code}] {message}")]
pub struct TerminalError {
    code: u32,
    message: String,
}

impl TerminalError {
    /// A failure with the internal error code.
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_code(INTERNAL_ERROR_CODE, message)
    }

    pub fn with_code(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> u32 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// True for failures caused by cancelling the invocation.
    pub fn is_cancelled(&self) -> bool {
        self.code == CANCELLED_ERROR_CODE
    }
}

impl From<Failure> for TerminalError {
    fn from(failure: Failure) -> Self {
        Self {
            code: failure.code,
            message: failure.message,
        }
    }
}

impl From<TerminalError> for Failure {
    fn from(err: TerminalError) -> Self {
        Failure::new(err.code, err.message)
    }
}

impl From<serde_json::Error> for TerminalError {
    fn from(err: serde_json::Error) -> Self {
        TerminalError::new(format!("serialization error: {}", err))
    }
}

/// Outcome of a failed run closure.
#[derive(Debug)]
pub enum RunError {
    /// Recorded as the run's result; never retried.
    Terminal(TerminalError),
    /// Reported to the runtime, which retries the invocation with backoff.
    Transient(anyhow::Error),
}

impl RunError {
    pub fn terminal(code: u32, message: impl Into<String>) -> Self {
        RunError::Terminal(TerminalError::with_code(code, message))
    }

    pub fn transient(err: impl Into<anyhow::Error>) -> Self {
        RunError::Transient(err.into())
    }
}

impl From<TerminalError> for RunError {
    fn from(err: TerminalError) -> Self {
        RunError::Terminal(err)
    }
}

impl From<anyhow::Error> for RunError {
    fn from(err: anyhow::Error) -> Self {
        RunError::Transient(err)
    }
}
