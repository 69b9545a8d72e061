// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result};
use bercon_rs::{
    cfg::{cli::resolve_config_path, config::BeClientConfig, logger::init_logger},
    events::Event,
    session::SessionHandle,
};
use clap::Parser;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(about = "BattlEye RCon client")]
struct Args {
    /// Path to the session config YAML (host/port/password/...).
    #[arg(long, default_value = "config.yaml")]
    config: String,

    /// Path to the logger config YAML.
    #[arg(long, default_value = "tests/config_logger.yaml")]
    logger_config: String,

    /// Overrides the config file's Host.
    #[arg(long)]
    host: Option<String>,

    /// Overrides the config file's Port.
    #[arg(long)]
    port: Option<u16>,

    /// Overrides the config file's Password.
    #[arg(long)]
    password: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _init_logger = init_logger(&args.logger_config)?;

    let mut cfg = resolve_config_path(&args.config)
        .and_then(BeClientConfig::load_from_file)
        .context("failed to resolve or load config")?;
    if let Some(host) = args.host {
        cfg.host = host;
    }
    if let Some(port) = args.port {
        cfg.port = port;
    }
    if let Some(password) = args.password {
        cfg.password = password;
    }
    cfg.validate_and_normalize()?;

    let session = SessionHandle::new(cfg);
    let mut events = session.subscribe();

    if !session.connect().await {
        anyhow::bail!("session did not transition out of Closed");
    }

    loop {
        match events.recv().await {
            Ok(Event::Connected) => info!("connected"),
            Ok(Event::Disconnected { reason, aborted }) => {
                info!(reason, aborted, "disconnected");
                if aborted {
                    return Ok(());
                }
            },
            Ok(Event::Error { kind, details }) => warn!(?kind, details, "session error"),
            Ok(Event::Players(players)) => info!(count = players.len(), "roster snapshot"),
            Ok(Event::PlayerJoin(player)) => info!(id = player.id, name = %player.name, "player joined"),
            Ok(Event::PlayerLeave(player, reason)) => {
                info!(id = player.id, name = %player.name, reason, "player left")
            },
            Ok(Event::PlayerUpdated(player, fields)) => {
                info!(id = player.id, ?fields, "player updated")
            },
            Ok(other) => info!(?other, "event"),
            Err(e) => {
                warn!("event stream closed: {e}");
                return Ok(());
            },
        }
    }
}
