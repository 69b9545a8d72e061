// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Command Scheduler (§4.4): owns the outbound sequence counter, the
//! FIFO command queue, the single in-flight slot, and the resend/
//! give-up policy. Produces plain data describing what to send; the
//! caller (the session actor) performs the actual socket I/O.

use std::{collections::VecDeque, time::Duration};

use tokio::time::Instant;

/// What an in-flight or queued command represents, so the caller can
/// route its eventual response correctly (to the Roster Engine, to a
/// generic `CommandResponse` event, or nowhere at all).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    User,
    Heartbeat,
    RosterPoll,
}

struct QueuedCommand {
    kind: CommandKind,
    payload: Vec<u8>,
}

struct InFlight {
    seq: u8,
    kind: CommandKind,
    payload: Vec<u8>,
    first_sent_at: Instant,
    last_part_at: Instant,
    attempts: u32,
}

/// One action the caller must perform as a result of a [`Scheduler::tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerTick {
    Send {
        seq: u8,
        kind: CommandKind,
        payload: Vec<u8>,
    },
    Resend {
        seq: u8,
        kind: CommandKind,
        payload: Vec<u8>,
    },
    GiveUp { seq: u8, kind: CommandKind },
}

pub struct Scheduler {
    next_seq: u8,
    queue: VecDeque<QueuedCommand>,
    in_flight: Option<InFlight>,
    roster_poll_queued: bool,
    resend_interval: Duration,
    part_quiet_interval: Duration,
    max_attempts: u32,
}

impl Scheduler {
    pub fn new(resend_interval: Duration, part_quiet_interval: Duration, max_attempts: u32) -> Self {
        Self {
            next_seq: 0,
            queue: VecDeque::new(),
            in_flight: None,
            roster_poll_queued: false,
            resend_interval,
            part_quiet_interval,
            max_attempts,
        }
    }

    fn alloc_seq(&mut self) -> u8 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        seq
    }

    pub fn enqueue_user(&mut self, payload: Vec<u8>) {
        self.queue.push_back(QueuedCommand {
            kind: CommandKind::User,
            payload,
        });
    }

    pub fn enqueue_heartbeat(&mut self) {
        self.queue.push_back(QueuedCommand {
            kind: CommandKind::Heartbeat,
            payload: Vec::new(),
        });
    }

    /// Enqueue a `players` poll unless one is already queued or in
    /// flight.
    pub fn enqueue_roster_poll(&mut self) {
        if self.roster_poll_queued {
            return;
        }
        self.roster_poll_queued = true;
        self.queue.push_back(QueuedCommand {
            kind: CommandKind::RosterPoll,
            payload: b"players".to_vec(),
        });
    }

    pub fn in_flight_seq(&self) -> Option<u8> {
        self.in_flight.as_ref().map(|f| f.seq)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// A part of the in-flight command's response arrived; resets the
    /// quiet-interval clock without completing it.
    pub fn note_part_received(&mut self, seq: u8, now: Instant) {
        if let Some(f) = &mut self.in_flight
            && f.seq == seq
        {
            f.last_part_at = now;
        }
    }

    /// A full response for `seq` arrived. Retires the in-flight
    /// command and frees the slot for the next tick. Returns the
    /// retired command's kind if `seq` matched.
    pub fn retire(&mut self, seq: u8) -> Option<CommandKind> {
        let f = self.in_flight.as_ref()?;
        if f.seq != seq {
            return None;
        }
        let kind = f.kind;
        self.in_flight = None;
        if kind == CommandKind::RosterPoll {
            self.roster_poll_queued = false;
        }
        Some(kind)
    }

    /// Drop all queued/in-flight state, used on session reset.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.in_flight = None;
        self.roster_poll_queued = false;
    }

    /// Drive the scheduler by one 1 s tick (§4.4).
    pub fn tick(&mut self, now: Instant) -> Option<SchedulerTick> {
        if self.in_flight.is_none() {
            let cmd = self.queue.pop_front()?;
            let seq = self.alloc_seq();
            let payload = cmd.payload.clone();
            self.in_flight = Some(InFlight {
                seq,
                kind: cmd.kind,
                payload: cmd.payload,
                first_sent_at: now,
                last_part_at: now,
                attempts: 1,
            });
            return Some(SchedulerTick::Send {
                seq,
                kind: cmd.kind,
                payload,
            });
        }

        let f = self.in_flight.as_mut().expect("checked above");
        if f.attempts > self.max_attempts {
            let seq = f.seq;
            let kind = f.kind;
            self.in_flight = None;
            if kind == CommandKind::RosterPoll {
                self.roster_poll_queued = false;
            }
            return Some(SchedulerTick::GiveUp { seq, kind });
        }

        let since_first = now.saturating_duration_since(f.first_sent_at);
        let since_last_part = now.saturating_duration_since(f.last_part_at);
        if since_first >= self.resend_interval && since_last_part >= self.part_quiet_interval {
            f.attempts += 1;
            f.first_sent_at = now;
            f.last_part_at = now;
            return Some(SchedulerTick::Resend {
                seq: f.seq,
                kind: f.kind,
                payload: f.payload.clone(),
            });
        }

        None
    }
}
