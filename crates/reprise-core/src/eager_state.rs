// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Local view of the invocation state, for read-your-writes.

use std::collections::HashMap;

use bytes::Bytes;

use crate::completion::Completion;

/// Outcome of a local state lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateLookup {
    /// The value is known locally; `None` means the key is absent.
    Known(Option<Bytes>),
    /// Only the runtime knows the value.
    Unknown,
}

#[derive(Debug, Default)]
pub struct EagerState {
    values: HashMap<String, Option<Bytes>>,
    /// When set, keys missing from `values` may still exist on the runtime.
    partial: bool,
    /// Journal index of the latest local write per key.
    written_at: HashMap<String, u32>,
    /// Journal index of the latest clear-all.
    cleared_all_at: Option<u32>,
}

impl EagerState {
    pub fn new(entries: impl IntoIterator<Item = (String, Bytes)>, partial: bool) -> Self {
        Self {
            values: entries
                .into_iter()
                .map(|(key, value)| (key, Some(value)))
                .collect(),
            partial,
            written_at: HashMap::new(),
            cleared_all_at: None,
        }
    }

    pub fn get(&self, key: &str) -> StateLookup {
        match self.values.get(key) {
            Some(value) => StateLookup::Known(value.clone()),
            None if self.partial => StateLookup::Unknown,
            None => StateLookup::Known(None),
        }
    }

    /// Records a set-state journaled at `index`.
    pub fn set(&mut self, index: u32, key: &str, value: Bytes) {
        self.values.insert(key.to_owned(), Some(value));
        self.written_at.insert(key.to_owned(), index);
    }

    /// Records a clear-state journaled at `index`.
    pub fn clear(&mut self, index: u32, key: &str) {
        self.values.insert(key.to_owned(), None);
        self.written_at.insert(key.to_owned(), index);
    }

    /// After a clear-all every key is known to be absent.
    pub fn clear_all(&mut self, index: u32) {
        self.values.clear();
        self.written_at.clear();
        self.partial = false;
        self.cleared_all_at = Some(index);
    }

    /// Learns a value from the result of the get-state entry at `index`.
    ///
    /// Results older than a local write of the same key are ignored.
    pub fn observe(&mut self, index: u32, key: &str, completion: &Completion) {
        let overwritten = self.cleared_all_at.is_some_and(|at| at > index)
            || self.written_at.get(key).is_some_and(|at| *at > index);
        if overwritten {
            return;
        }
        match completion {
            Completion::Success(value) => {
                self.values.insert(key.to_owned(), Some(value.clone()));
            }
            Completion::Empty => {
                self.values.insert(key.to_owned(), None);
            }
            Completion::Failure(_) => {}
        }
    }
}
