//! Push admission policy: the gate between "an event happened" and "the
//! user was interrupted".
//!
//! Four checks run in order, short-circuiting on the first failure: daily
//! cap, duplicate suppression, per-family cooldown, fatigue down-sampling.
//! Every input comes from the append-only activity log plus the candidate's
//! own attributes; there is no "unknown" outcome, missing inputs deny.

pub mod core;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::db::{DbError, PulseDb};
use crate::window::LocalWindow;

pub use self::core::{EventFamily, FatigueSampler};

/// Why a candidate was denied (or `Ok` when allowed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyReason {
    Ok,
    MissingUser,
    DailyCap,
    Duplicate,
    Cooldown,
    Fatigue,
}

impl PolicyReason {
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyReason::Ok => "ok",
            PolicyReason::MissingUser => "missing_user",
            PolicyReason::DailyCap => "daily_cap",
            PolicyReason::Duplicate => "duplicate",
            PolicyReason::Cooldown => "cooldown",
            PolicyReason::Fatigue => "fatigue",
        }
    }
}

/// What the policy knew when it decided. Logged with the outcome so future
/// cooldown/duplicate checks (and debugging) can see it.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyTrace {
    pub family: String,
    pub dedup_key: String,
    pub source_domain: String,
    pub horizon_bucket: String,
    pub daily_count: i64,
}

/// The admission decision for one candidate.
#[derive(Debug, Clone)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub reason: PolicyReason,
    pub trace: PolicyTrace,
}

/// A candidate push as the policy sees it.
#[derive(Debug, Clone)]
pub struct PolicyInput<'a> {
    pub user: &'a str,
    pub event_type: &'a str,
    pub dedup_key: Option<&'a str>,
    pub payload: &'a serde_json::Value,
}

pub struct PushPolicy<'a> {
    config: &'a EngineConfig,
    sampler: FatigueSampler,
}

impl<'a> PushPolicy<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self {
            config,
            sampler: core::hash_fatigue_sample,
        }
    }

    /// Swap the fatigue sampler (tests pin it to always/never).
    pub fn with_sampler(config: &'a EngineConfig, sampler: FatigueSampler) -> Self {
        Self { config, sampler }
    }

    /// Evaluate one candidate against the activity log at `window.now_utc`.
    pub fn evaluate(
        &self,
        db: &PulseDb,
        window: &LocalWindow,
        input: &PolicyInput<'_>,
    ) -> Result<PolicyDecision, DbError> {
        let family = core::family_from_event_type(input.event_type);
        let dedup_key = core::derived_dedup_key(family, input.dedup_key, input.payload);
        let mut trace = PolicyTrace {
            family: family.as_str().to_string(),
            dedup_key,
            source_domain: core::source_domain(input.payload).to_string(),
            horizon_bucket: core::horizon_bucket(input.payload).to_string(),
            daily_count: 0,
        };

        if input.user.trim().is_empty() {
            return Ok(deny(PolicyReason::MissingUser, trace));
        }

        let now = window.now_utc;

        // 1. Daily cap
        let daily_count = db.push_sent_count_since(input.user, now - Duration::hours(24))?;
        trace.daily_count = daily_count;
        if daily_count >= self.config.daily_push_cap {
            return Ok(deny(PolicyReason::DailyCap, trace));
        }

        // 2. Duplicate suppression
        let dup_cutoff = now - Duration::hours(self.config.duplicate_window_hours);
        if db.has_push_sent_with_dedup(input.user, &trace.dedup_key, dup_cutoff)? {
            return Ok(deny(PolicyReason::Duplicate, trace));
        }

        // 3. Family cooldown
        let cooldown = core::cooldown_minutes(family, &self.config.cooldowns);
        let cooldown_cutoff = now - Duration::minutes(cooldown);
        if db.has_push_sent_in_family(input.user, family.as_str(), cooldown_cutoff)? {
            return Ok(deny(PolicyReason::Cooldown, trace));
        }

        // 4. Fatigue down-sampling. urgent_due always passes; everything else
        // rides the deterministic per-hour coin while the user is fatigued.
        if family != EventFamily::UrgentDue && self.is_fatigued(db, input.user, now)? {
            let sampled =
                (self.sampler)(input.user, family.as_str(), &window.hour_bucket());
            if !sampled {
                return Ok(deny(PolicyReason::Fatigue, trace));
            }
        }

        Ok(PolicyDecision {
            allowed: true,
            reason: PolicyReason::Ok,
            trace,
        })
    }

    /// Consecutive unengaged sends at the head of the interaction history.
    fn is_fatigued(
        &self,
        db: &PulseDb,
        user: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let names = db.recent_push_interactions(user, now, 30)?;
        let mut sent_since_engage = 0usize;
        for name in &names {
            if crate::db::activity::ENGAGEMENT_EVENTS.contains(&name.as_str()) {
                break;
            }
            if name == "push_sent" {
                sent_since_engage += 1;
            }
        }
        Ok(sent_since_engage >= self.config.fatigue_sent_threshold)
    }
}

fn deny(reason: PolicyReason, trace: PolicyTrace) -> PolicyDecision {
    PolicyDecision {
        allowed: false,
        reason,
        trace,
    }
}

// =============================================================================
// Tests
// =============================================================================
