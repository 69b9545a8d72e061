// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Hand-rolled, anchored parsers for the inline server-message rules of
//! §4.6.1. No `regex` dependency is carried anywhere in this crate's
//! lineage, so each rule is matched with small literal/scan-based
//! parsers that reproduce the same capture semantics a regex engine
//! would give on well-formed input.

/// One recognized inline server message, already split into its
/// capture groups. See §4.6.1 for the source pattern of each variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedMessage {
    PlayerConnecting { id: u32, name: String, ip: String },
    GuidCalculated { id: u32, guid: String },
    GuidVerified { guid: String, id: u32, name: String },
    PlayerDisconnected { id: u32 },
    PlayerKicked { id: u32, reason: String },
    BeLog {
        kind: String,
        player_id: u32,
        name: String,
        guid: String,
        filter: i32,
        body: String,
    },
    /// `(channel) rest` — the sender name still needs to be resolved
    /// against the known roster by the caller (§4.6.1 "longest-name-prefix
    /// match").
    RawChannelMessage { channel: String, rest: String },
    AdminMessage { admin_id: u32, channel: String, text: String },
    /// A recognized but semantically inert advisory (ban-check timeout,
    /// "Connected to BE Master", ...).
    Advisory,
    Unknown,
}

/// A capture group failed to parse even though the message matched a
/// known rule's outer shape (e.g. a non-numeric id).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFailed(pub &'static str);

type Rule = fn(&str) -> Option<Result<ParsedMessage, CaptureFailed>>;

fn digits_prefix(s: &str) -> Option<(u32, &str)> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    let n: u32 = s[..end].parse().ok()?;
    Some((n, &s[end..]))
}

fn is_hex32(s: &str) -> bool {
    s.len() == 32 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

const ADVISORIES: &[&str] = &[
    "Connected to BE Master",
    "Ban check timed out",
    "Master query timed out",
    "VAC",
];

fn is_advisory(line: &str) -> bool {
    ADVISORIES.iter().any(|a| line.contains(a))
}

fn parse_player_connecting(line: &str) -> Option<Result<ParsedMessage, CaptureFailed>> {
    let rest = line.strip_prefix("Player #")?;
    let (id, rest) = digits_prefix(rest)?;
    let rest = rest.strip_prefix(' ')?;
    let rest = rest.strip_suffix(" connected")?;
    let open = rest.rfind(" (")?;
    let name = &rest[..open];
    let paren = rest[open + 2..].strip_suffix(')')?;
    let colon = paren.rfind(':')?;
    let ip = &paren[..colon];
    Some(Ok(ParsedMessage::PlayerConnecting {
        id,
        name: name.to_string(),
        ip: ip.to_string(),
    }))
}

fn parse_guid_calculated(line: &str) -> Option<Result<ParsedMessage, CaptureFailed>> {
    let rest = line.strip_prefix("Player #")?;
    let (id, rest) = digits_prefix(rest)?;
    let rest = rest.strip_prefix(' ')?;
    let idx = rest.find("BE GUID: ")?;
    let guid = &rest[idx + "BE GUID: ".len()..];
    if !is_hex32(guid) {
        return Some(Err(CaptureFailed("guidCalculated.guid")));
    }
    Some(Ok(ParsedMessage::GuidCalculated {
        id,
        guid: guid.to_string(),
    }))
}

fn parse_guid_verified(line: &str) -> Option<Result<ParsedMessage, CaptureFailed>> {
    let rest = line.strip_prefix("Verified GUID (")?;
    let close = rest.find(')')?;
    let guid = &rest[..close];
    if !is_hex32(guid) {
        return Some(Err(CaptureFailed("guidVerified.guid")));
    }
    let rest = rest[close + 1..].strip_prefix(" of player #")?;
    let (id, rest) = digits_prefix(rest)?;
    let name = rest.strip_prefix(' ')?;
    if name.is_empty() {
        return Some(Err(CaptureFailed("guidVerified.name")));
    }
    Some(Ok(ParsedMessage::GuidVerified {
        guid: guid.to_string(),
        id,
        name: name.to_string(),
    }))
}

fn parse_player_kicked(line: &str) -> Option<Result<ParsedMessage, CaptureFailed>> {
    let rest = line.strip_prefix("Player #")?;
    let (id, rest) = digits_prefix(rest)?;
    let marker = ") has been kicked by BattlEye: ";
    let at = rest.find(marker)?;
    let before = &rest[..at];
    // `before` must end with "(<32-hex-guid>" for the literal group to
    // have matched, even though the guid itself isn't captured.
    let open = before.rfind('(')?;
    if !is_hex32(&before[open + 1..]) {
        return None;
    }
    let reason = &rest[at + marker.len()..];
    if reason.is_empty() {
        return Some(Err(CaptureFailed("playerKicked.reason")));
    }
    Some(Ok(ParsedMessage::PlayerKicked {
        id,
        reason: reason.to_string(),
    }))
}

fn parse_player_disconnected(line: &str) -> Option<Result<ParsedMessage, CaptureFailed>> {
    let rest = line.strip_prefix("Player #")?;
    let (id, rest) = digits_prefix(rest)?;
    rest.strip_suffix(" disconnected")?;
    Some(Ok(ParsedMessage::PlayerDisconnected { id }))
}

fn parse_be_log(line: &str) -> Option<Result<ParsedMessage, CaptureFailed>> {
    let log_at = line.find(" Log: #")?;
    let kind = &line[..log_at];
    if kind.is_empty() || !kind.bytes().all(|b| b.is_ascii_alphabetic() || b == b' ') {
        return None;
    }
    let rest = &line[log_at + " Log: #".len()..];
    let (player_id, rest) = digits_prefix(rest)?;
    let rest = rest.strip_prefix(' ')?;

    // The name segment is greedy in the source pattern, so the guid/
    // filter/body suffix is located by scanning from the end.
    let dash_at = rest.rfind(" - #")?;
    let (head, tail) = rest.split_at(dash_at);
    let tail = &tail[" - #".len()..];

    let open = head.rfind(" (")?;
    let (name, guid_part) = head.split_at(open);
    let guid = &guid_part[2..guid_part.len() - 1];
    if !guid_part.ends_with(')') || !is_hex32(guid) {
        return Some(Err(CaptureFailed("beLog.guid")));
    }

    let space = tail.find(' ')?;
    let filter: i32 = tail[..space].parse().map_err(|_| ()).ok()?;
    let body = &tail[space + 1..];

    Some(Ok(ParsedMessage::BeLog {
        kind: kind.to_string(),
        player_id,
        name: name.to_string(),
        guid: guid.to_string(),
        filter,
        body: body.to_string(),
    }))
}

fn parse_admin_message(line: &str) -> Option<Result<ParsedMessage, CaptureFailed>> {
    let rest = line.strip_prefix("RCon admin #")?;
    let (admin_id, rest) = digits_prefix(rest)?;
    let rest = rest.strip_prefix(": (")?;
    let close = rest.find(')')?;
    let channel = &rest[..close];
    let text = rest[close + 1..].strip_prefix(' ')?;
    Some(Ok(ParsedMessage::AdminMessage {
        admin_id,
        channel: channel.to_string(),
        text: text.to_string(),
    }))
}

fn parse_raw_channel_message(line: &str) -> Option<Result<ParsedMessage, CaptureFailed>> {
    let rest = line.strip_prefix('(')?;
    let close = rest.find(')')?;
    let channel = &rest[..close];
    if channel.is_empty() || !channel.bytes().all(|b| b.is_ascii_alphabetic()) {
        return None;
    }
    let text = rest[close + 1..].strip_prefix(' ')?;
    Some(Ok(ParsedMessage::RawChannelMessage {
        channel: channel.to_string(),
        rest: text.to_string(),
    }))
}

/// Classify one inline server-message payload against every known rule,
/// in the priority order needed to disambiguate overlapping prefixes
/// (e.g. `"... connected"` vs `"... disconnected"`).
pub fn classify(line: &str) -> Result<ParsedMessage, CaptureFailed> {
    if line.is_empty() {
        return Ok(ParsedMessage::Unknown);
    }

    let rules: [Rule; 8] = [
        parse_guid_verified,
        parse_admin_message,
        parse_be_log,
        parse_player_kicked,
        parse_player_disconnected,
        parse_player_connecting,
        parse_guid_calculated,
        parse_raw_channel_message,
    ];

    for rule in rules {
        if let Some(result) = rule(line) {
            return result;
        }
    }

    if is_advisory(line) {
        return Ok(ParsedMessage::Advisory);
    }

    Ok(ParsedMessage::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_connecting() {
        let msg = classify("Player #3 Alice (10.0.0.5:27016) connected").expect("valid in test");
        assert_eq!(
            msg,
            ParsedMessage::PlayerConnecting {
                id: 3,
                name: "Alice".into(),
                ip: "10.0.0.5".into(),
            }
        );
    }

    #[test]
    fn guid_calculated() {
        let msg =
            classify("Player #3 Alice BE GUID: 0123456789abcdef0123456789abcdef").expect("valid in test");
        assert_eq!(
            msg,
            ParsedMessage::GuidCalculated {
                id: 3,
                guid: "0123456789abcdef0123456789abcdef".into(),
            }
        );
    }

    #[test]
    fn guid_verified() {
        let msg = classify(
            "Verified GUID (0123456789abcdef0123456789abcdef) of player #3 Alice",
        )
        .expect("valid in test");
        assert_eq!(
            msg,
            ParsedMessage::GuidVerified {
                guid: "0123456789abcdef0123456789abcdef".into(),
                id: 3,
                name: "Alice".into(),
            }
        );
    }

    #[test]
    fn player_disconnected_is_not_confused_with_connecting() {
        let msg = classify("Player #3 Alice disconnected").expect("valid in test");
        assert_eq!(msg, ParsedMessage::PlayerDisconnected { id: 3 });
    }

    #[test]
    fn player_kicked() {
        let msg = classify(
            "Player #3 Alice (0123456789abcdef0123456789abcdef) has been kicked by \
             BattlEye: Client not responding",
        )
        .expect("valid in test");
        assert_eq!(
            msg,
            ParsedMessage::PlayerKicked {
                id: 3,
                reason: "Client not responding".into(),
            }
        );
    }

    #[test]
    fn be_log_with_multiline_body() {
        let msg = classify(
            "Script Log: #3 Alice (0123456789abcdef0123456789abcdef) - #7 line one\nline \
             two",
        )
        .expect("valid in test");
        assert_eq!(
            msg,
            ParsedMessage::BeLog {
                kind: "Script".into(),
                player_id: 3,
                name: "Alice".into(),
                guid: "0123456789abcdef0123456789abcdef".into(),
                filter: 7,
                body: "line one\nline two".into(),
            }
        );
    }

    #[test]
    fn raw_channel_message() {
        let msg = classify("(Side) Alice: hello there").expect("valid in test");
        assert_eq!(
            msg,
            ParsedMessage::RawChannelMessage {
                channel: "Side".into(),
                rest: "Alice: hello there".into(),
            }
        );
    }

    #[test]
    fn admin_message() {
        let msg = classify("RCon admin #1: (Global) hello everyone").expect("valid in test");
        assert_eq!(
            msg,
            ParsedMessage::AdminMessage {
                admin_id: 1,
                channel: "Global".into(),
                text: "hello everyone".into(),
            }
        );
    }

    #[test]
    fn advisory_is_recognized() {
        assert_eq!(classify("Connected to BE Master").expect("valid in test"), ParsedMessage::Advisory);
    }

    #[test]
    fn unknown_falls_through() {
        assert_eq!(classify("something nobody documented").expect("valid in test"), ParsedMessage::Unknown);
    }
}
