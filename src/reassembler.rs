// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Buffers multi-part command replies keyed by sequence and assembles
//! them into a single payload once every part has arrived.

use std::{collections::HashMap, time::Duration};

use bytes::{Bytes, BytesMut};
use tokio::time::Instant;

/// Entries without a completed assembly older than this are dropped by
/// [`Reassembler::gc`].
const ENTRY_TTL: Duration = Duration::from_secs(10);

struct Entry {
    total: u8,
    parts: Vec<Option<Bytes>>,
    received: u8,
    created_at: Instant,
}

impl Entry {
    fn new(total: u8) -> Self {
        Self {
            total,
            parts: vec![None; total as usize],
            received: 0,
            created_at: Instant::now(),
        }
    }

    fn is_complete(&self) -> bool {
        self.received as usize == self.parts.len()
    }

    fn assemble(&self) -> Bytes {
        let mut out = BytesMut::new();
        for bytes in self.parts.iter().flatten() {
            out.extend_from_slice(bytes);
        }
        out.freeze()
    }
}

/// Reassembles `CommandPart` fragments into whole command-reply
/// payloads, keyed by the wire sequence number (§4.2).
#[derive(Default)]
pub struct Reassembler {
    entries: HashMap<u8, Entry>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one `CommandPart{seq,total,index,data}`. Returns the
    /// assembled payload once `index` completes the set.
    pub fn push(&mut self, seq: u8, total: u8, index: u8, data: Bytes) -> Option<Bytes> {
        let needs_reset = matches!(self.entries.get(&seq), Some(e) if e.total != total);
        if needs_reset {
            // Protocol violation: the originating command times out and
            // resends under a fresh sequence, so the stale entry is
            // simply discarded rather than reconciled.
            self.entries.remove(&seq);
        }

        let entry = self.entries.entry(seq).or_insert_with(|| Entry::new(total));

        if let Some(slot) = entry.parts.get_mut(index as usize)
            && slot.is_none()
        {
            *slot = Some(data);
            entry.received += 1;
        }

        if entry.is_complete() {
            let entry = self.entries.remove(&seq).expect("entry just looked up");
            Some(entry.assemble())
        } else {
            None
        }
    }

    /// Drop any entry belonging to `seq`, used by the Scheduler before a
    /// sequence slot is reused for a new in-flight command.
    pub fn drop_seq(&mut self, seq: u8) {
        self.entries.remove(&seq);
    }

    /// Remove entries that have not completed within [`ENTRY_TTL`].
    pub fn gc(&mut self, now: Instant) {
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.created_at) < ENTRY_TTL);
    }

    /// Drop every buffered entry, used on session reset/reconnect.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
