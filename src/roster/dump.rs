// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Parser for the tabular `players` command reply (§4.6.2).
//!
//! ```text
//! Players on server:
//! [#] [IP Address]:[Port] [Ping] [GUID] [Name]
//! --------------------------------------------------
//! (legend / notes line)
//! 0   127.0.0.1:2302      59    0123456789abcdef0123456789abcdef(OK) Alice
//! 1   127.0.0.2:2302      80    -                                   Bob (Lobby)
//! (2 players in total)
//! ```

use crate::error::ParseError;

const INTRO: &str = "Players on server:";
/// Header lines following the intro before player rows begin.
const HEADER_LINES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRow {
    pub id: u32,
    pub ip: String,
    pub ping: i32,
    pub guid: Option<String>,
    pub verified: bool,
    pub name: String,
    pub lobby: bool,
}

fn next_token(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    let end = s.find(char::is_whitespace).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    Some((&s[..end], &s[end..]))
}

fn is_hex32(s: &str) -> bool {
    s.len() == 32 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn parse_row(line: &str) -> Result<Option<PlayerRow>, ParseError> {
    let fail = |which| ParseError {
        which,
        raw: line.to_string(),
    };

    let Some((id_tok, rest)) = next_token(line) else {
        return Ok(None);
    };
    // Footer lines such as "(2 players in total)" don't start with a bare
    // id token; treat anything non-numeric as "not a player row" rather
    // than a capture failure.
    if !id_tok.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(None);
    }
    let id: u32 = id_tok.parse().map_err(|_| fail("playersDump.id"))?;

    let (ip_port, rest) = next_token(rest).ok_or_else(|| fail("playersDump.ip"))?;
    let ip = ip_port.rsplit_once(':').map(|(ip, _port)| ip).unwrap_or(ip_port);

    let (ping_tok, rest) = next_token(rest).ok_or_else(|| fail("playersDump.ping"))?;
    let ping: i32 = ping_tok.parse().map_err(|_| fail("playersDump.ping"))?;

    let (guid_tok, rest) = next_token(rest).ok_or_else(|| fail("playersDump.guid"))?;
    let (guid, verified) = if guid_tok == "-" {
        (None, false)
    } else if let Some(raw) = guid_tok.strip_suffix("(OK)") {
        if !is_hex32(raw) {
            return Err(fail("playersDump.guid"));
        }
        (Some(raw.to_string()), true)
    } else if let Some(raw) = guid_tok.strip_suffix("(?)") {
        if !is_hex32(raw) {
            return Err(fail("playersDump.guid"));
        }
        (Some(raw.to_string()), false)
    } else {
        if !is_hex32(guid_tok) {
            return Err(fail("playersDump.guid"));
        }
        (Some(guid_tok.to_string()), false)
    };

    let mut name = rest.trim();
    let lobby = if let Some(stripped) = name.strip_suffix(" (Lobby)") {
        name = stripped;
        true
    } else {
        false
    };
    if name.is_empty() {
        return Err(fail("playersDump.name"));
    }

    Ok(Some(PlayerRow {
        id,
        ip: ip.to_string(),
        ping,
        guid,
        verified,
        name: name.to_string(),
        lobby,
    }))
}

/// Parse the full `players` reply body into its player rows. Rows that
/// don't look like player data (header, separator, trailing count) are
/// skipped without error; rows that look like a player row but fail a
/// capture surface a [`ParseError`].
pub fn parse(body: &str) -> (Vec<PlayerRow>, Vec<ParseError>) {
    let mut lines = body.split('\n').map(|l| l.trim_end_matches('\r'));

    match lines.next() {
        Some(first) if first.trim() == INTRO => {},
        _ => return (Vec::new(), Vec::new()),
    }
    for _ in 0..HEADER_LINES {
        if lines.next().is_none() {
            return (Vec::new(), Vec::new());
        }
    }

    let mut rows = Vec::new();
    let mut errors = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        match parse_row(line) {
            Ok(Some(row)) => rows.push(row),
            Ok(None) => {},
            Err(e) => errors.push(e),
        }
    }
    (rows, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> String {
        [
            "Players on server:",
            "[#] [IP Address]:[Port] [Ping] [GUID] [Name]",
            "--------------------------------------------------",
            "legend",
            "0   127.0.0.1:2302      59    0123456789abcdef0123456789abcdef(OK) Alice",
            "1   127.0.0.2:2302      80    -                                   Bob (Lobby)",
            "(2 players in total)",
        ]
        .join("\n")
    }

    #[test]
    fn parses_verified_and_unverified_rows() {
        let (rows, errors) = parse(&sample());
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].id, 0);
        assert_eq!(rows[0].ip, "127.0.0.1");
        assert_eq!(rows[0].ping, 59);
        assert_eq!(rows[0].guid.as_deref(), Some("0123456789abcdef0123456789abcdef"));
        assert!(rows[0].verified);
        assert_eq!(rows[0].name, "Alice");
        assert!(!rows[0].lobby);

        assert_eq!(rows[1].id, 1);
        assert_eq!(rows[1].guid, None);
        assert!(!rows[1].verified);
        assert_eq!(rows[1].name, "Bob");
        assert!(rows[1].lobby);
    }

    #[test]
    fn footer_and_blank_lines_are_skipped_without_error() {
        let (rows, errors) = parse(&sample());
        assert!(errors.is_empty());
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn malformed_guid_on_a_player_row_is_a_parse_error() {
        let body = [
            "Players on server:",
            "header",
            "----",
            "legend",
            "3   127.0.0.1:2302 10 not-a-guid Carol",
        ]
        .join("\n");
        let (rows, errors) = parse(&body);
        assert!(rows.is_empty());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].which, "playersDump.guid");
    }
}
