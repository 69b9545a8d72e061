// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Roster Engine (§4.6): reconciles the two independent views the
//! server exposes of its connected players — asynchronous inline
//! notifications and the periodic tabular `players` dump — into one
//! table, without ever observing both at once.

pub mod dump;
pub mod parse;

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::{
    error::ParseError,
    roster::{dump::PlayerRow, parse::ParsedMessage},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: u32,
    pub name: String,
    pub ip: String,
    pub guid: Option<String>,
    pub ping: i32,
    pub lobby: bool,
    pub verified: bool,
    pub connected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ConnectingPlayer {
    id: u32,
    name: String,
    ip: String,
    guid: Option<String>,
}

/// Which field of a [`Player`] changed in a [`RosterChange::PlayerUpdated`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerField {
    Ip,
    Ping,
    Verified,
    Lobby,
}

/// Everything the Roster Engine can report back to the caller for one
/// inline message or one tabular dump. The session/event layer maps
/// these onto the public `Event` stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterChange {
    PlayerJoin(Player),
    PlayerLeave(Player, String),
    PlayerUpdated(Player, Vec<PlayerField>),
    Snapshot(Vec<Player>),
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
    UnknownServerMessage(String),
    ParseFailed(ParseError),
}

/// Owns the live player table and the transient "still connecting"
/// table, and applies §4.6.1/§4.6.2/§4.6.3.
#[derive(Default)]
pub struct RosterEngine {
    players: HashMap<u32, Player>,
    connecting: HashMap<u32, ConnectingPlayer>,
    roster_ready: bool,
}

impl RosterEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.roster_ready
    }

    pub fn players_snapshot(&self) -> Vec<Player> {
        self.players.values().cloned().collect()
    }

    /// Drop all roster state, used on session reset/reconnect.
    pub fn clear(&mut self) {
        self.players.clear();
        self.connecting.clear();
        self.roster_ready = false;
    }

    fn longest_name_match<'a>(&self, rest: &'a str) -> Option<(&Player, &'a str)> {
        self.players
            .values()
            .filter_map(|p| {
                let prefix = format!("{}: ", p.name);
                rest.strip_prefix(prefix.as_str()).map(|text| (p, text))
            })
            .max_by_key(|(p, _)| p.name.len())
    }

    /// Feed one asynchronous inline server-message line (§4.6.1).
    pub fn handle_inline(&mut self, line: &str) -> Vec<RosterChange> {
        let msg = match parse::classify(line) {
            Ok(msg) => msg,
            Err(e) => {
                return vec![RosterChange::ParseFailed(ParseError {
                    which: e.0,
                    raw: line.to_string(),
                })];
            },
        };

        match msg {
            ParsedMessage::PlayerConnecting { id, name, ip } => {
                self.connecting.insert(
                    id,
                    ConnectingPlayer {
                        id,
                        name,
                        ip,
                        guid: None,
                    },
                );
                vec![]
            },

            ParsedMessage::GuidCalculated { id, guid } => {
                if let Some(c) = self.connecting.get_mut(&id) {
                    c.guid = Some(guid);
                }
                // Otherwise either the id is already a verified Player
                // holding this guid (nothing to do), or it refers to
                // neither table; both are silently ignored per §4.6.1.
                vec![]
            },

            ParsedMessage::GuidVerified { guid, id, name } => {
                if let Some(p) = self.players.get(&id)
                    && p.verified
                    && p.guid.as_deref() == Some(guid.as_str())
                {
                    self.connecting.remove(&id);
                    return vec![];
                }

                let (ip, ping) = match self.connecting.remove(&id) {
                    Some(c) => (c.ip, 0),
                    None => match self.players.get(&id) {
                        Some(p) => (p.ip.clone(), p.ping),
                        None => (String::new(), 0),
                    },
                };

                let player = Player {
                    id,
                    name,
                    ip,
                    guid: Some(guid),
                    ping,
                    lobby: true,
                    verified: true,
                    connected_at: Utc::now(),
                };
                self.players.insert(id, player.clone());

                if self.roster_ready {
                    vec![RosterChange::PlayerJoin(player)]
                } else {
                    vec![]
                }
            },

            ParsedMessage::PlayerDisconnected { id } => {
                if self.players.contains_key(&id) {
                    let player = self.players.remove(&id).expect("checked above");
                    if self.roster_ready {
                        vec![RosterChange::PlayerLeave(player, "disconnected".to_string())]
                    } else {
                        vec![]
                    }
                } else {
                    self.connecting.remove(&id);
                    vec![]
                }
            },

            ParsedMessage::PlayerKicked { id, reason } => {
                if self.players.contains_key(&id) {
                    let player = self.players.remove(&id).expect("checked above");
                    if self.roster_ready {
                        vec![RosterChange::PlayerLeave(player, reason)]
                    } else {
                        vec![]
                    }
                } else {
                    self.connecting.remove(&id);
                    vec![]
                }
            },

            ParsedMessage::BeLog {
                kind,
                player_id,
                guid,
                filter,
                body,
                ..
            } => {
                let player = self.players.get(&player_id).cloned();
                vec![RosterChange::BeLog {
                    kind,
                    player,
                    player_id,
                    guid,
                    filter,
                    body,
                }]
            },

            ParsedMessage::RawChannelMessage { channel, rest } => {
                let (player, text) = match self.longest_name_match(&rest) {
                    Some((p, text)) => (Some(p.clone()), text.to_string()),
                    None => (None, rest),
                };
                vec![RosterChange::PlayerMessage {
                    player,
                    channel,
                    text,
                }]
            },

            ParsedMessage::AdminMessage {
                admin_id,
                channel,
                text,
            } => vec![RosterChange::AdminMessage {
                admin_id,
                channel,
                text,
            }],

            ParsedMessage::Advisory => vec![],

            ParsedMessage::Unknown => vec![RosterChange::UnknownServerMessage(line.to_string())],
        }
    }

    /// Feed one completed `players` dump reply (§4.6.2).
    pub fn handle_dump(&mut self, body: &str) -> Vec<RosterChange> {
        let (rows, errors) = dump::parse(body);
        let mut changes: Vec<RosterChange> =
            errors.into_iter().map(RosterChange::ParseFailed).collect();

        for row in rows {
            changes.extend(self.apply_row(row));
        }

        self.roster_ready = true;
        changes.push(RosterChange::Snapshot(self.players_snapshot()));
        changes
    }

    fn apply_row(&mut self, row: PlayerRow) -> Option<RosterChange> {
        if let Some(player) = self.players.get_mut(&row.id) {
            let mut changed = Vec::new();
            if player.ping != row.ping {
                player.ping = row.ping;
                changed.push(PlayerField::Ping);
            }
            if player.verified != row.verified {
                player.verified = row.verified;
                changed.push(PlayerField::Verified);
            }
            if player.lobby != row.lobby {
                player.lobby = row.lobby;
                changed.push(PlayerField::Lobby);
            }
            if player.ip.is_empty() && !row.ip.is_empty() {
                player.ip = row.ip;
                changed.push(PlayerField::Ip);
            }
            if changed.is_empty() {
                None
            } else {
                Some(RosterChange::PlayerUpdated(player.clone(), changed))
            }
        } else if row.guid.is_none() {
            self.connecting.entry(row.id).or_insert(ConnectingPlayer {
                id: row.id,
                name: row.name,
                ip: row.ip,
                guid: None,
            });
            None
        } else if !self.roster_ready {
            let player = Player {
                id: row.id,
                name: row.name,
                ip: row.ip,
                guid: row.guid,
                ping: row.ping,
                lobby: row.lobby,
                verified: row.verified,
                connected_at: Utc::now(),
            };
            self.players.insert(row.id, player.clone());
            Some(RosterChange::PlayerJoin(player))
        } else {
            // rosterReady, no existing Player, guid present: a join
            // notification was missed. Conservative policy: do not
            // synthesize a join, wait for the next inline verification.
            None
        }
    }
}
