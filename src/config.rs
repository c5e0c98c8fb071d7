//! Engine configuration.
//!
//! Serde-backed JSON at `~/.novapulse/config.json`. Every field has a
//! default, so a missing or partial file never blocks a pass. Secrets can be
//! supplied via environment instead of the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::load::LoadWeights;

/// Per-family cooldown minutes for the admission policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    pub urgent_min: i64,
    pub partner_min: i64,
    pub study_min: i64,
    pub execution_min: i64,
    pub daily_close_min: i64,
    pub default_min: i64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            urgent_min: 90,
            partner_min: 180,
            study_min: 120,
            execution_min: 120,
            daily_close_min: 24 * 60,
            default_min: 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fixed timezone offset in hours (e.g. +7 for WIB).
    pub tz_offset_hours: i32,
    /// The couple pair. First two entries partner each other.
    pub couple_users: Vec<String>,

    /// Maximum pushes per user per trailing 24h.
    pub daily_push_cap: i64,
    /// Duplicate-suppression lookback in hours.
    pub duplicate_window_hours: i64,
    /// Consecutive unengaged sends before a user counts as fatigued.
    pub fatigue_sent_threshold: usize,
    pub cooldowns: CooldownConfig,

    /// Urgent radar lookahead and just-missed grace, minutes.
    pub urgent_lookahead_min: i64,
    pub urgent_grace_min: i64,
    /// Predictive radar emissions per user per pass.
    pub risk_emit_cap: usize,

    /// Couple-sync assist trigger: minimum load-index gap.
    pub load_gap_threshold: f64,
    pub load_weights: LoadWeights,

    /// HMAC secret for deep-link action tokens. Empty disables issuance.
    pub action_token_secret: String,
    pub action_token_ttl_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tz_offset_hours: 7,
            couple_users: vec!["Zaldy".to_string(), "Nesya".to_string()],
            daily_push_cap: 6,
            duplicate_window_hours: 48,
            fatigue_sent_threshold: 3,
            cooldowns: CooldownConfig::default(),
            urgent_lookahead_min: 90,
            urgent_grace_min: 120,
            risk_emit_cap: 2,
            load_gap_threshold: 18.0,
            load_weights: LoadWeights::default(),
            action_token_secret: String::new(),
            action_token_ttl_secs: 6 * 3600,
        }
    }
}

impl EngineConfig {
    /// Canonical config file path: `~/.novapulse/config.json`.
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".novapulse").join("config.json"))
    }

    /// Load from a file, falling back to defaults when absent or malformed.
    /// `NOVA_PUSH_ACTION_SECRET` overrides the file's token secret either way.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let mut config = path
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|content| match serde_json::from_str::<Self>(&content) {
                Ok(parsed) => Some(parsed),
                Err(err) => {
                    log::warn!("Ignoring malformed config: {}", err);
                    None
                }
            })
            .unwrap_or_default();

        if let Ok(secret) = std::env::var("NOVA_PUSH_ACTION_SECRET") {
            if !secret.trim().is_empty() {
                config.action_token_secret = secret.trim().to_string();
            }
        }

        config
    }

    /// The other half of the couple, when `user` is one of the pair.
    pub fn partner_for(&self, user: &str) -> Option<&str> {
        match self.couple_users.as_slice() {
            [a, b, ..] if a == user => Some(b.as_str()),
            [a, b, ..] if b == user => Some(a.as_str()),
            _ => None,
        }
    }
}
