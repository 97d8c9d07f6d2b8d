// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Durable awakeable identifiers.
//!
//! An id is `prom_1` followed by the URL-safe, unpadded base64 encoding of the
//! invocation id bytes and the big-endian entry index. Anyone holding it can
//! complete the awakeable through the runtime.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bytes::{BufMut, Bytes, BytesMut};

/// Prefix of every awakeable id.
pub const AWAKEABLE_ID_PREFIX: &str = "prom_1";

/// Builds the id of the awakeable journaled at `index`.
pub fn awakeable_id(invocation_id: &[u8], index: u32) -> String {
    let mut raw = BytesMut::with_capacity(invocation_id.len() + 4);
    raw.put_slice(invocation_id);
    raw.put_u32(index);
    format!("{}{}", AWAKEABLE_ID_PREFIX, URL_SAFE_NO_PAD.encode(&raw))
}

/// Splits an awakeable id into invocation id and entry index.
pub fn parse_awakeable_id(id: &str) -> Option<(Bytes, u32)> {
    let encoded = id.strip_prefix(AWAKEABLE_ID_PREFIX)?;
    let raw = URL_SAFE_NO_PAD.decode(encoded).ok()?;
    if raw.len() < 4 {
        return None;
    }
    let (invocation_id, index) = raw.split_at(raw.len() - 4);
    let index = u32::from_be_bytes([index[0], index[1], index[2], index[3]]);
    Some((Bytes::copy_from_slice(invocation_id), index))
}
