// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Completions and the per-invocation completion table.

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use tracing::debug;

use crate::error::{CANCELLED_ERROR_CODE, Result, VmError};

/// A business failure, delivered to user code as a catchable error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub code: u32,
    pub message: String,
}

impl Failure {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Failure reporting a cancelled operation.
    pub fn cancelled() -> Self {
        Self::new(CANCELLED_ERROR_CODE, "cancelled")
    }

    pub fn is_cancelled(&self) -> bool {
        self.code == CANCELLED_ERROR_CODE
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Result of a completable entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Success(Bytes),
    Failure(Failure),
    Empty,
}

impl Completion {
    pub fn is_failure(&self) -> bool {
        matches!(self, Completion::Failure(_))
    }

    /// Converts into a `Result`, with `Empty` mapped to `None`.
    pub fn into_result(self) -> std::result::Result<Option<Bytes>, Failure> {
        match self {
            Completion::Success(value) => Ok(Some(value)),
            Completion::Empty => Ok(None),
            Completion::Failure(failure) => Err(failure),
        }
    }
}

impl From<std::result::Result<Bytes, Failure>> for Completion {
    fn from(result: std::result::Result<Bytes, Failure>) -> Self {
        match result {
            Ok(value) => Completion::Success(value),
            Err(failure) => Completion::Failure(failure),
        }
    }
}

impl From<Option<Bytes>> for Completion {
    fn from(value: Option<Bytes>) -> Self {
        value.map(Completion::Success).unwrap_or(Completion::Empty)
    }
}

/// Results keyed by journal index.
///
/// Holds inline results of replayed entries as well as completions that
/// arrived asynchronously. A result is recorded at most once per index.
#[derive(Debug, Default)]
pub struct CompletionTable {
    completions: HashMap<u32, Completion>,
}

impl CompletionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the result of an entry. The first result wins; a second one
    /// for the same index is rejected and leaves the table unchanged.
    pub fn record(&mut self, index: u32, completion: Completion) -> Result<()> {
        if self.completions.contains_key(&index) {
            return Err(VmError::DuplicateCompletion { index });
        }
        debug!(index, failure = completion.is_failure(), "Recorded completion");
        self.completions.insert(index, completion);
        Ok(())
    }

    pub fn get(&self, index: u32) -> Option<&Completion> {
        self.completions.get(&index)
    }

    pub fn contains(&self, index: u32) -> bool {
        self.completions.contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.completions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completions.is_empty()
    }
}
