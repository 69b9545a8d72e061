// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

const PLAYER_UPDATE_INTERVAL_MIN_MS: u64 = 1000;
const PLAYER_UPDATE_INTERVAL_MAX_MS: u64 = 40_000;
const LOGIN_DEADLINE_MS: u64 = 5_000;
const HEARTBEAT_IDLE_MS: u64 = 20_000;

/// Runtime configuration for a [`crate::session::SessionHandle`] (§6,
/// §10.1). Loadable from YAML the same way the teacher's `Config`
/// loads iSCSI session parameters.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct BeClientConfig {
    #[serde(rename = "Host")]
    pub host: String,
    #[serde(rename = "Port")]
    pub port: u16,
    #[serde(rename = "Password")]
    pub password: String,

    #[serde(default = "default_true", rename = "AutoReconnect")]
    pub auto_reconnect: bool,

    #[serde(default = "default_player_update_interval_ms", rename = "PlayerUpdateIntervalMs")]
    pub player_update_interval_ms: u64,

    #[serde(default = "default_idle_timeout_ms", rename = "IdleTimeoutMs")]
    pub idle_timeout_ms: u64,

    #[serde(default = "default_resend_interval_ms", rename = "ResendIntervalMs")]
    pub resend_interval_ms: u64,

    #[serde(default = "default_part_quiet_interval_ms", rename = "PartQuietIntervalMs")]
    pub part_quiet_interval_ms: u64,

    #[serde(default = "default_max_attempts", rename = "MaxAttempts")]
    pub max_attempts: u32,
}

fn default_true() -> bool {
    true
}
fn default_player_update_interval_ms() -> u64 {
    5_000
}
fn default_idle_timeout_ms() -> u64 {
    10_000
}
fn default_resend_interval_ms() -> u64 {
    2_000
}
fn default_part_quiet_interval_ms() -> u64 {
    750
}
fn default_max_attempts() -> u32 {
    5
}

impl BeClientConfig {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: BeClientConfig =
            serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants and clamps derived fields (§6 "Option
    /// bounds").
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(!self.host.is_empty(), "Host must not be empty");
        ensure!(!self.password.is_empty(), "Password must not be empty");

        self.player_update_interval_ms = self
            .player_update_interval_ms
            .clamp(PLAYER_UPDATE_INTERVAL_MIN_MS, PLAYER_UPDATE_INTERVAL_MAX_MS);
        ensure!(self.idle_timeout_ms >= 1000, "IdleTimeoutMs must be at least 1000");
        ensure!(self.max_attempts >= 5, "MaxAttempts must be at least 5");

        Ok(())
    }

    pub fn login_deadline(&self) -> Duration {
        Duration::from_millis(LOGIN_DEADLINE_MS)
    }

    pub fn heartbeat_idle(&self) -> Duration {
        Duration::from_millis(HEARTBEAT_IDLE_MS)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn player_update_interval(&self) -> Duration {
        Duration::from_millis(self.player_update_interval_ms)
    }

    pub fn resend_interval(&self) -> Duration {
        Duration::from_millis(self.resend_interval_ms)
    }

    pub fn part_quiet_interval(&self) -> Duration {
        Duration::from_millis(self.part_quiet_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> BeClientConfig {
        BeClientConfig {
            host: "127.0.0.1".into(),
            port: 2302,
            password: "secret".into(),
            auto_reconnect: true,
            player_update_interval_ms: 5_000,
            idle_timeout_ms: 10_000,
            resend_interval_ms: 2_000,
            part_quiet_interval_ms: 750,
            max_attempts: 5,
        }
    }

    #[test]
    fn player_update_interval_clamps_to_bounds() {
        let mut cfg = base();
        cfg.player_update_interval_ms = 100;
        cfg.validate_and_normalize().expect("valid in test");
        assert_eq!(cfg.player_update_interval_ms, PLAYER_UPDATE_INTERVAL_MIN_MS);

        let mut cfg = base();
        cfg.player_update_interval_ms = 999_999;
        cfg.validate_and_normalize().expect("valid in test");
        assert_eq!(cfg.player_update_interval_ms, PLAYER_UPDATE_INTERVAL_MAX_MS);
    }

    #[test]
    fn empty_password_is_rejected() {
        let mut cfg = base();
        cfg.password.clear();
        assert!(cfg.validate_and_normalize().is_err());
    }

    #[test]
    fn loads_from_yaml() {
        let yaml = "Host: 127.0.0.1\nPort: 2302\nPassword: secret\n";
        let mut cfg: BeClientConfig = serde_yaml::from_str(yaml).expect("valid in test");
        cfg.validate_and_normalize().expect("valid in test");
        assert_eq!(cfg.player_update_interval_ms, 5_000);
        assert!(cfg.auto_reconnect);
    }
}
