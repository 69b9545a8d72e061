// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use thiserror::Error;

/// Failure modes of [`crate::codec::decode`].
///
/// These never carry enough context to be fatal on their own; a bad
/// datagram is simply dropped by the caller and the condition is
/// surfaced through [`crate::events::Event::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("frame shorter than the minimum 8-byte envelope")]
    TooShort,
    #[error("frame does not start with the 'BE' prefix")]
    BadPrefix,
    #[error("CRC-32 checksum mismatch")]
    BadChecksum,
    #[error("unknown frame kind byte")]
    UnknownKind,
}

/// A recognized server-message rule matched its header but a capture
/// group failed to parse (e.g. a non-numeric player id). Surfaced as a
/// non-fatal error; the message is otherwise dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to parse {which} from {raw:?}")]
pub struct ParseError {
    pub which: &'static str,
    pub raw: String,
}

/// The full non-fatal/fatal error taxonomy surfaced to subscribers via
/// `Event::Error`. Variants that also drive a state transition document
/// which one in their doc comment; see `session::state` for the
/// transition table itself.
#[derive(Debug, Clone, Error)]
pub enum BeError {
    /// A datagram failed to decode; see [`DecodeError`] for which rule.
    #[error("decode error: {0}")]
    Decode(DecodeError),

    /// The server rejected the configured password. Fatal: disables
    /// auto-reconnect for the remainder of this session's lifetime.
    #[error("authentication failed: invalid password")]
    Auth,

    /// No login response within the 5s login deadline.
    #[error("login timed out")]
    LoginTimeout,

    /// No inbound frame within the configured idle limit.
    #[error("connection idle timeout")]
    IdleTimeout,

    /// An in-flight command was never answered after `max_attempts`
    /// resends.
    #[error("command timed out after repeated resends")]
    CommandTimeout,

    /// The underlying datagram transport reported an error.
    #[error("transport error: {0}")]
    Transport(String),

    /// A known server-message rule matched but failed to parse.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A non-empty server message matched no known rule.
    #[error("unknown server message: {0:?}")]
    UnknownServerMessage(String),
}

impl From<DecodeError> for BeError {
    fn from(e: DecodeError) -> Self {
        BeError::Decode(e)
    }
}

impl BeError {
    /// Whether this error, per §4.3/§7, drives the session into `Closing`.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BeError::Auth
                | BeError::LoginTimeout
                | BeError::IdleTimeout
                | BeError::CommandTimeout
                | BeError::Transport(_)
        )
    }

    /// Whether a fatal error should also disable reconnection (§4.3: "Reconnect
    /// excludes BadPassword").
    pub fn aborts_reconnect(&self) -> bool {
        matches!(self, BeError::Auth)
    }
}
