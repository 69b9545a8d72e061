// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The public event stream (§6). Subscribers receive owned, cloned
//! snapshots off a `tokio::sync::broadcast` channel — never a
//! reference into actor state.

use crate::{
    error::BeError,
    roster::{Player, PlayerField},
};

/// A non-fatal or fatal condition reported to subscribers. Carries the
/// same taxonomy as [`BeError`] without requiring subscribers to
/// depend on `thiserror`'s `Error` trait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    Decode,
    Auth,
    LoginTimeout,
    IdleTimeout,
    CommandTimeout,
    Transport,
    Parse,
    UnknownServerMessage,
}

impl From<&BeError> for ErrorKind {
    fn from(e: &BeError) -> Self {
        match e {
            BeError::Decode(_) => ErrorKind::Decode,
            BeError::Auth => ErrorKind::Auth,
            BeError::LoginTimeout => ErrorKind::LoginTimeout,
            BeError::IdleTimeout => ErrorKind::IdleTimeout,
            BeError::CommandTimeout => ErrorKind::CommandTimeout,
            BeError::Transport(_) => ErrorKind::Transport,
            BeError::Parse(_) => ErrorKind::Parse,
            BeError::UnknownServerMessage(_) => ErrorKind::UnknownServerMessage,
        }
    }
}

/// One item of the public event stream (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connected,
    Disconnected { reason: String, aborted: bool },
    Error { kind: ErrorKind, details: String },
    Players(Vec<Player>),
    PlayerJoin(Player),
    PlayerLeave(Player, String),
    PlayerUpdated(Player, Vec<PlayerField>),
    BeLog {
        kind: String,
        player: Option<Player>,
        player_id: u32,
        guid: String,
        filter: i32,
        body: String,
    },
    PlayerMessage {
        player: Option<Player>,
        channel: String,
        text: String,
    },
    AdminMessage {
        admin_id: u32,
        channel: String,
        text: String,
    },
    /// Supplemental beyond the conceptual API in §6: the reply to a
    /// `sendCommand()` call that was neither the system heartbeat nor
    /// the roster poll has nowhere else to go. The Scheduler tags
    /// which in-flight sequence belongs to a caller-submitted command
    /// and the Session emits this once its reply (possibly
    /// reassembled) arrives.
    CommandResponse { sequence: u8, data: Vec<u8> },
}

impl Event {
    pub(crate) fn from_error(err: &BeError) -> Self {
        Event::Error {
            kind: ErrorKind::from(err),
            details: err.to_string(),
        }
    }
}

impl From<crate::roster::RosterChange> for Event {
    fn from(change: crate::roster::RosterChange) -> Self {
        use crate::roster::RosterChange as C;
        match change {
            C::PlayerJoin(p) => Event::PlayerJoin(p),
            C::PlayerLeave(p, reason) => Event::PlayerLeave(p, reason),
            C::PlayerUpdated(p, fields) => Event::PlayerUpdated(p, fields),
            C::Snapshot(players) => Event::Players(players),
            C::BeLog {
                kind,
                player,
                player_id,
                guid,
                filter,
                body,
            } => Event::BeLog {
                kind,
                player,
                player_id,
                guid,
                filter,
                body,
            },
            C::PlayerMessage {
                player,
                channel,
                text,
            } => Event::PlayerMessage {
                player,
                channel,
                text,
            },
            C::AdminMessage {
                admin_id,
                channel,
                text,
            } => Event::AdminMessage {
                admin_id,
                channel,
                text,
            },
            C::UnknownServerMessage(raw) => Event::Error {
                kind: ErrorKind::UnknownServerMessage,
                details: raw,
            },
            C::ParseFailed(e) => Event::Error {
                kind: ErrorKind::Parse,
                details: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DecodeError, ParseError};

    #[test]
    fn error_kind_maps_every_be_error_variant() {
        assert_eq!(ErrorKind::from(&BeError::Auth), ErrorKind::Auth);
        assert_eq!(ErrorKind::from(&BeError::LoginTimeout), ErrorKind::LoginTimeout);
        assert_eq!(ErrorKind::from(&BeError::IdleTimeout), ErrorKind::IdleTimeout);
        assert_eq!(ErrorKind::from(&BeError::CommandTimeout), ErrorKind::CommandTimeout);
        assert_eq!(
            ErrorKind::from(&BeError::Transport("x".into())),
            ErrorKind::Transport
        );
        assert_eq!(
            ErrorKind::from(&BeError::Decode(DecodeError::BadChecksum)),
            ErrorKind::Decode
        );
        assert_eq!(
            ErrorKind::from(&BeError::Parse(ParseError {
                which: "x",
                raw: "y".into(),
            })),
            ErrorKind::Parse
        );
        assert_eq!(
            ErrorKind::from(&BeError::UnknownServerMessage("x".into())),
            ErrorKind::UnknownServerMessage
        );
    }

    #[test]
    fn roster_change_conversion_preserves_join() {
        let player = crate::roster::Player {
            id: 1,
            name: "Alice".into(),
            ip: "10.0.0.1".into(),
            guid: Some("0123456789abcdef0123456789abcdef".into()),
            ping: 40,
            lobby: true,
            verified: true,
            connected_at: chrono::Utc::now(),
        };
        let event: Event = crate::roster::RosterChange::PlayerJoin(player.clone()).into();
        assert_eq!(event, Event::PlayerJoin(player));
    }
}
