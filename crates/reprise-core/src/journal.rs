// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Entry journal.
//!
//! The journal holds historical entries received from the runtime and entries
//! issued live by the user code, in index order. Operations re-issued during
//! replay are matched against the historical entry at the same index instead
//! of being stored again.

use tracing::{debug, warn};

use crate::entry::Entry;
use crate::error::{Result, VmError};

/// How an appended entry was placed in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Appended {
    /// Matched a historical entry; nothing must be sent to the runtime.
    Replayed(u32),
    /// Recorded as a new entry; it must be sent to the runtime.
    New(u32),
}

impl Appended {
    pub fn index(&self) -> u32 {
        match self {
            Appended::Replayed(index) | Appended::New(index) => *index,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Appended::New(_))
    }
}

#[derive(Debug, Default)]
pub struct Journal {
    entries: Vec<Entry>,
    known_entries: u32,
    /// Number of entries issued by the user code so far.
    issued: u32,
}

impl Journal {
    pub fn new(known_entries: u32) -> Self {
        Self {
            entries: Vec::with_capacity(known_entries as usize),
            known_entries,
            issued: 0,
        }
    }

    /// Stores a historical entry sent by the runtime.
    pub fn push_historical(&mut self, entry: Entry) -> Result<u32> {
        let index = self.entries.len() as u32;
        if index >= self.known_entries {
            return Err(VmError::TooManyEntries {
                known: self.known_entries,
            });
        }
        debug!(index, entry = %entry.describe(), "Received historical entry");
        self.entries.push(entry);
        Ok(index)
    }

    /// Assigns the next index to an entry issued by the user code.
    ///
    /// While historical entries remain, the entry must match the one recorded
    /// at that index; a divergence is a journal mismatch.
    pub fn append(&mut self, entry: Entry) -> Result<Appended> {
        let index = self.issued;
        if self.is_replaying() {
            let historical = self
                .entries
                .get(index as usize)
                .ok_or(VmError::TooManyEntries {
                    known: self.known_entries,
                })?;
            if !historical.matches(&entry) {
                warn!(
                    index,
                    expected = %historical.describe(),
                    actual = %entry.describe(),
                    "Journal mismatch during replay"
                );
                return Err(VmError::JournalMismatch {
                    index,
                    expected: historical.describe(),
                    actual: entry.describe(),
                });
            }
            self.issued += 1;
            return Ok(Appended::Replayed(index));
        }

        self.entries.push(entry);
        self.issued += 1;
        Ok(Appended::New(index))
    }

    pub fn get(&self, index: u32) -> Option<&Entry> {
        self.entries.get(index as usize)
    }

    /// Whether the next issued entry replays a historical one.
    pub fn is_replaying(&self) -> bool {
        self.issued < self.known_entries
    }

    /// Whether every announced historical entry has been received.
    pub fn received_all(&self) -> bool {
        self.entries.len() as u32 >= self.known_entries
    }

    pub fn known_entries(&self) -> u32 {
        self.known_entries
    }

    /// Number of entries the user code issued.
    pub fn issued(&self) -> u32 {
        self.issued
    }

    /// Number of entries stored, historical or live.
    pub fn len(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
