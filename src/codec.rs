// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Wire framing for the BE RCon protocol.
//!
//! Every frame is `'B' 'E' | crc32_le(rest) | 0xFF | kind:u8 | body...`,
//! where the CRC-32 (IEEE polynomial, i.e. CRC-32/ISO-HDLC) is computed
//! over every byte from the `0xFF` separator to the end of the frame.

use bytes::{BufMut, Bytes, BytesMut};
use crc::{CRC_32_ISO_HDLC, Crc};

use crate::error::DecodeError;

const PREFIX: [u8; 2] = *b"BE";
const SEPARATOR: u8 = 0xFF;
const MIN_FRAME_LEN: usize = 8;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

const KIND_LOGIN: u8 = 0x00;
const KIND_COMMAND: u8 = 0x01;
const KIND_SERVER_MESSAGE: u8 = 0x02;

/// A validated, classified inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Inbound login status: `true` on success.
    Login(bool),
    /// A full (unfragmented) command reply.
    CommandWhole { seq: u8, data: Bytes },
    /// One fragment of a multi-part command reply.
    CommandPart {
        seq: u8,
        total: u8,
        index: u8,
        data: Bytes,
    },
    /// An asynchronous server-originated notification.
    ServerMessage { seq: u8, data: Bytes },
}

fn crc_of(body_from_separator: &[u8]) -> u32 {
    CRC32.checksum(body_from_separator)
}

/// Decode a single inbound datagram into a [`Frame`].
pub fn decode(bytes: &[u8]) -> Result<Frame, DecodeError> {
    if bytes.len() < MIN_FRAME_LEN {
        return Err(DecodeError::TooShort);
    }
    if bytes[0] != PREFIX[0] || bytes[1] != PREFIX[1] {
        return Err(DecodeError::BadPrefix);
    }

    let stored_crc = u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
    let rest = &bytes[6..];
    if rest.first() != Some(&SEPARATOR) {
        // Not a framing failure per spec's enumerated errors, but a
        // checksum computed over the wrong bytes would never match, so
        // the crc compare below already rejects this case too. Checking
        // explicitly keeps the error report precise.
        return Err(DecodeError::BadChecksum);
    }
    if crc_of(rest) != stored_crc {
        return Err(DecodeError::BadChecksum);
    }

    let kind = rest[1];
    let body = &rest[2..];

    match kind {
        KIND_LOGIN => {
            if body.is_empty() {
                return Err(DecodeError::TooShort);
            }
            Ok(Frame::Login(body[0] != 0))
        },
        KIND_COMMAND => {
            if body.is_empty() {
                return Err(DecodeError::TooShort);
            }
            let seq = body[0];
            if body.len() >= 4 && body[1] == 0x00 {
                let total = body[2];
                let index = body[3];
                let data = Bytes::copy_from_slice(&body[4..]);
                Ok(Frame::CommandPart {
                    seq,
                    total,
                    index,
                    data,
                })
            } else {
                let data = Bytes::copy_from_slice(&body[1..]);
                Ok(Frame::CommandWhole { seq, data })
            }
        },
        KIND_SERVER_MESSAGE => {
            if body.is_empty() {
                return Err(DecodeError::TooShort);
            }
            let seq = body[0];
            let data = Bytes::copy_from_slice(&body[1..]);
            Ok(Frame::ServerMessage { seq, data })
        },
        _ => Err(DecodeError::UnknownKind),
    }
}

fn encode_with_body(kind: u8, body: &[u8]) -> BytesMut {
    let mut tail = BytesMut::with_capacity(2 + body.len());
    tail.put_u8(SEPARATOR);
    tail.put_u8(kind);
    tail.extend_from_slice(body);

    let crc = crc_of(&tail);

    let mut out = BytesMut::with_capacity(6 + tail.len());
    out.extend_from_slice(&PREFIX);
    out.put_u32_le(crc);
    out.extend_from_slice(&tail);
    out
}

/// Encode an outbound Login frame (password, raw bytes).
pub fn encode_login(password: &str) -> BytesMut {
    encode_with_body(KIND_LOGIN, password.as_bytes())
}

/// Encode an outbound Command frame for `seq` carrying `payload`.
pub fn encode_command(seq: u8, payload: &[u8]) -> BytesMut {
    let mut body = Vec::with_capacity(1 + payload.len());
    body.push(seq);
    body.extend_from_slice(payload);
    encode_with_body(KIND_COMMAND, &body)
}

/// Encode an Ack for a received ServerMessage, carrying no payload.
pub fn encode_ack(seq: u8) -> BytesMut {
    encode_with_body(KIND_SERVER_MESSAGE, &[seq])
}

/// Exposed for router tests that need to build frames this crate
/// never sends itself (e.g. an inbound Login status reply).
#[cfg(test)]
pub(crate) fn encode_with_body_for_test(kind: u8, body: &[u8]) -> BytesMut {
    encode_with_body(kind, body)
}

/// Build a raw login-status reply frame, for integration tests acting
/// as a fake BE server. Only compiled with the `test-util` feature.
#[cfg(feature = "test-util")]
pub fn encode_login_status_for_test(accepted: bool) -> BytesMut {
    encode_with_body(KIND_LOGIN, &[u8::from(accepted)])
}

/// Build a raw command-part reply frame, for integration tests acting
/// as a fake BE server. Only compiled with the `test-util` feature.
#[cfg(feature = "test-util")]
pub fn encode_command_part_for_test(seq: u8, total: u8, index: u8, payload: &[u8]) -> BytesMut {
    let mut body = vec![seq, 0x00, total, index];
    body.extend_from_slice(payload);
    encode_with_body(KIND_COMMAND, &body)
}

/// Build a raw inline server-message (notification) frame, for
/// integration tests acting as a fake BE server. Only compiled with
/// the `test-util` feature.
#[cfg(feature = "test-util")]
pub fn encode_server_message_for_test(seq: u8, line: &str) -> BytesMut {
    let mut body = vec![seq];
    body.extend_from_slice(line.as_bytes());
    encode_with_body(KIND_SERVER_MESSAGE, &body)
}
