// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pending operation registry.
//!
//! Tracks which journal indices the user code awaits. A slot is either
//! waiting or holds its resolved completion until the awaiting side takes it.
//! Resolved indices are also queued in resolution order, which is the order
//! completions arrived in, for drivers that consume notifications instead of
//! polling futures.

use std::collections::{HashMap, VecDeque};
use std::task::{Poll, Waker};

use tracing::trace;

use crate::completion::Completion;
use crate::error::{Result, VmError};

/// Handle to an awaited journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingOperation {
    index: u32,
}

impl PendingOperation {
    pub(crate) fn new(index: u32) -> Self {
        Self { index }
    }

    pub fn index(&self) -> u32 {
        self.index
    }
}

#[derive(Debug)]
enum Slot {
    Waiting(Option<Waker>),
    Resolved(Completion),
}

#[derive(Debug, Default)]
pub struct PendingRegistry {
    slots: HashMap<u32, Slot>,
    resolution_order: VecDeque<u32>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers interest in `index`. At most one outstanding await per index.
    pub fn register(&mut self, index: u32) -> Result<PendingOperation> {
        if self.slots.contains_key(&index) {
            return Err(VmError::AlreadyAwaited { index });
        }
        self.slots.insert(index, Slot::Waiting(None));
        Ok(PendingOperation::new(index))
    }

    /// Fulfils the operation waiting on `index`, waking its task.
    ///
    /// Returns `false` when nothing waits on the index or it already resolved.
    pub fn resolve(&mut self, index: u32, completion: Completion) -> bool {
        let Some(slot) = self.slots.get_mut(&index) else {
            return false;
        };
        let Slot::Waiting(waker) = slot else {
            return false;
        };
        let waker = waker.take();
        *slot = Slot::Resolved(completion);
        self.resolution_order.push_back(index);
        trace!(index, "Resolved pending operation");
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }

    /// Polls an operation, storing the waker while it is still waiting.
    ///
    /// A resolved completion is handed out once; the slot is removed.
    pub fn poll(&mut self, operation: &PendingOperation, waker: &Waker) -> Poll<Option<Completion>> {
        match self.slots.get_mut(&operation.index) {
            None => Poll::Ready(None),
            Some(Slot::Waiting(stored)) => {
                match stored {
                    Some(existing) if existing.will_wake(waker) => {}
                    _ => *stored = Some(waker.clone()),
                }
                Poll::Pending
            }
            Some(Slot::Resolved(_)) => Poll::Ready(self.take(operation)),
        }
    }

    /// Takes the completion of a resolved operation.
    pub fn take(&mut self, operation: &PendingOperation) -> Option<Completion> {
        match self.slots.remove(&operation.index) {
            Some(Slot::Resolved(completion)) => {
                self.resolution_order.retain(|index| *index != operation.index);
                Some(completion)
            }
            Some(waiting) => {
                self.slots.insert(operation.index, waiting);
                None
            }
            None => None,
        }
    }

    /// Drops interest in an operation, whether it resolved or not. Its
    /// completion, if any, stays recorded in the journal.
    pub fn forget(&mut self, operation: &PendingOperation) {
        if self.slots.remove(&operation.index).is_some() {
            self.resolution_order.retain(|index| *index != operation.index);
            trace!(index = operation.index, "Forgot pending operation");
        }
    }

    /// Takes the next resolved operation, in resolution order.
    pub fn take_next(&mut self) -> Option<(PendingOperation, Completion)> {
        while let Some(index) = self.resolution_order.pop_front() {
            if let Some(Slot::Resolved(_)) = self.slots.get(&index) {
                if let Some(Slot::Resolved(completion)) = self.slots.remove(&index) {
                    return Some((PendingOperation::new(index), completion));
                }
            }
        }
        None
    }

    pub fn is_waiting(&self, index: u32) -> bool {
        matches!(self.slots.get(&index), Some(Slot::Waiting(_)))
    }

    /// Indices still waiting for a completion, ascending.
    pub fn waiting(&self) -> Vec<u32> {
        let mut indices: Vec<u32> = self
            .slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Waiting(_)))
            .map(|(index, _)| *index)
            .collect();
        indices.sort_unstable();
        indices
    }

    /// Whether a resolved completion is waiting to be taken.
    pub fn has_resolved(&self) -> bool {
        !self.resolution_order.is_empty()
    }

    /// Drops every waker so no task is woken after the invocation closed.
    pub fn clear_wakers(&mut self) {
        for slot in self.slots.values_mut() {
            if let Slot::Waiting(waker) = slot {
                waker.take();
            }
        }
    }
}
