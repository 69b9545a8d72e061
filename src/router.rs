// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Message Router (§4.5): demultiplexes decoded frames, acks server
//! messages exactly once, and forwards command replies to the
//! Scheduler/Reassembler.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};

use crate::{
    codec::{self, Frame},
    reassembler::Reassembler,
};

/// Size of the sliding dedup window over recently-seen ServerMessage
/// sequences (§4.5).
const DEDUP_WINDOW: usize = 256;

/// What the caller must do as a result of routing one decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterOutcome {
    /// Login status received; forward to the session state machine.
    Login(bool),
    /// A full or reassembled command-reply payload is ready for the
    /// sequence that requested it.
    CommandReply { seq: u8, data: Bytes },
    /// A command-reply frame arrived for a sequence nothing is waiting
    /// on (e.g. a stray heartbeat reply); nothing to deliver.
    Ignored,
    /// One part of a still-incomplete multi-part reply was buffered for
    /// the in-flight sequence; the Scheduler's resend clock must be
    /// reset so a trickling reply isn't resent mid-assembly.
    PartBuffered { seq: u8 },
    /// A server message was accepted and should be delivered to the
    /// Roster Engine, alongside the ack frame that must be sent.
    ServerMessage { data: Bytes, ack: BytesMut },
    /// A server message was a duplicate (already acked); only the ack
    /// needs to be (re)sent, no processing.
    DuplicateServerMessage { ack: BytesMut },
}

pub struct Router {
    reassembler: Reassembler,
    seen: VecDeque<u8>,
    seen_set: [bool; 256],
}

impl Default for Router {
    fn default() -> Self {
        Self {
            reassembler: Reassembler::new(),
            seen: VecDeque::with_capacity(DEDUP_WINDOW),
            seen_set: [false; 256],
        }
    }
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reassembler_mut(&mut self) -> &mut Reassembler {
        &mut self.reassembler
    }

    fn mark_seen(&mut self, seq: u8) -> bool {
        if self.seen_set[seq as usize] {
            return true;
        }
        if self.seen.len() == DEDUP_WINDOW
            && let Some(evicted) = self.seen.pop_front()
        {
            self.seen_set[evicted as usize] = false;
        }
        self.seen.push_back(seq);
        self.seen_set[seq as usize] = true;
        false
    }

    /// Route one already-decoded [`Frame`]. `has_in_flight` reports
    /// whether `seq` is the Scheduler's current in-flight sequence, so
    /// replies to unknown/stale sequences (e.g. a server's short reply
    /// to a retired heartbeat) are dropped rather than misdelivered.
    pub fn route(&mut self, frame: Frame, has_in_flight: impl Fn(u8) -> bool) -> RouterOutcome {
        match frame {
            Frame::Login(status) => RouterOutcome::Login(status),

            Frame::CommandWhole { seq, data } => {
                if has_in_flight(seq) {
                    RouterOutcome::CommandReply { seq, data }
                } else {
                    RouterOutcome::Ignored
                }
            },

            Frame::CommandPart {
                seq,
                total,
                index,
                data,
            } => {
                if !has_in_flight(seq) {
                    return RouterOutcome::Ignored;
                }
                match self.reassembler.push(seq, total, index, data) {
                    Some(whole) => RouterOutcome::CommandReply { seq, data: whole },
                    None => RouterOutcome::PartBuffered { seq },
                }
            },

            Frame::ServerMessage { seq, data } => {
                let ack = codec::encode_ack(seq);
                if self.mark_seen(seq) {
                    RouterOutcome::DuplicateServerMessage { ack }
                } else {
                    RouterOutcome::ServerMessage { data, ack }
                }
            },
        }
    }

    /// Drop all reassembly/dedup state, used on session reset.
    pub fn clear(&mut self) {
        self.reassembler.clear();
        self.seen.clear();
        self.seen_set = [false; 256];
    }
}
