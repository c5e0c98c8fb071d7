//! Pure admission-policy helpers: family mapping, cooldown table, horizon
//! buckets, derived dedup keys, and the deterministic fatigue sampler.
//!
//! Everything here is a function of its arguments; the log-backed gates
//! live in the parent module.

use sha2::{Digest, Sha256};

use crate::config::CooldownConfig;

/// Coarse category used for cooldown/admission accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFamily {
    UrgentDue,
    PartnerAssist,
    DailyClose,
    ExecutionFollowup,
    StudyWindow,
    Reminder,
    General,
}

impl EventFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            EventFamily::UrgentDue => "urgent_due",
            EventFamily::PartnerAssist => "partner_assist",
            EventFamily::DailyClose => "daily_close",
            EventFamily::ExecutionFollowup => "execution_followup",
            EventFamily::StudyWindow => "study_window",
            EventFamily::Reminder => "reminder",
            EventFamily::General => "general",
        }
    }
}

/// Derive the family from a fine-grained event type. Urgency keywords take
/// precedence; partner ping types deliberately avoid them.
pub fn family_from_event_type(event_type: &str) -> EventFamily {
    let key = event_type.to_ascii_lowercase();
    if key.is_empty() {
        return EventFamily::General;
    }
    if key.contains("urgent") || key.contains("overdue") || key.contains("critical") {
        return EventFamily::UrgentDue;
    }
    if key.contains("support") || key.contains("assist") || key.contains("checkin") {
        return EventFamily::PartnerAssist;
    }
    if key.contains("daily_close") {
        return EventFamily::DailyClose;
    }
    if key.contains("execution") || key.contains("copilot") {
        return EventFamily::ExecutionFollowup;
    }
    if key.contains("study") || key.contains("focus") {
        return EventFamily::StudyWindow;
    }
    if key.contains("reminder") {
        return EventFamily::Reminder;
    }
    EventFamily::General
}

/// Cooldown minutes for a family.
pub fn cooldown_minutes(family: EventFamily, cooldowns: &CooldownConfig) -> i64 {
    match family {
        EventFamily::UrgentDue => cooldowns.urgent_min,
        EventFamily::PartnerAssist => cooldowns.partner_min,
        EventFamily::StudyWindow => cooldowns.study_min,
        EventFamily::ExecutionFollowup => cooldowns.execution_min,
        EventFamily::DailyClose => cooldowns.daily_close_min,
        EventFamily::Reminder | EventFamily::General => cooldowns.default_min,
    }
}

/// Coarse time-to-deadline classification for dedup keys. Minutes win over
/// hours when a payload carries both.
pub fn horizon_bucket(payload: &serde_json::Value) -> &'static str {
    if let Some(m) = payload.get("minutes_left").and_then(|v| v.as_f64()) {
        return if m <= 0.0 {
            "overdue"
        } else if m <= 24.0 * 60.0 {
            "<=24h"
        } else if m <= 48.0 * 60.0 {
            "<=48h"
        } else {
            ">48h"
        };
    }
    if let Some(h) = payload.get("hours_left").and_then(|v| v.as_f64()) {
        return if h <= 0.0 {
            "overdue"
        } else if h <= 24.0 {
            "<=24h"
        } else if h <= 48.0 {
            "<=48h"
        } else {
            ">48h"
        };
    }
    "na"
}

/// Which store the notifiable condition came from.
pub fn source_domain(payload: &serde_json::Value) -> &'static str {
    let source = payload
        .get("source")
        .or_else(|| payload.get("entity_type"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    if source.contains("assignment") {
        "assignment"
    } else if source.contains("task") {
        "task"
    } else if source.contains("study") {
        "study_session"
    } else {
        "general"
    }
}

/// Build the derived dedup key when the caller did not supply one:
/// `{family}:{source_domain}:{horizon_bucket}:{entity_id}`. Groups
/// semantically-equivalent reminders about one item across collectors.
pub fn derived_dedup_key(
    family: EventFamily,
    explicit: Option<&str>,
    payload: &serde_json::Value,
) -> String {
    if let Some(key) = explicit {
        if !key.is_empty() {
            return key.to_string();
        }
    }
    let entity = payload
        .get("item_id")
        .or_else(|| payload.get("entity_id"))
        .map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| "none".to_string());
    format!(
        "{}:{}:{}:{}",
        family.as_str(),
        source_domain(payload),
        horizon_bucket(payload),
        entity
    )
}

/// Deterministic 50% down-sample used while a user is fatigued.
///
/// Any even-ish deterministic function of `(user, family, hour_bucket)`
/// satisfies the contract; determinism within a bucket is the load-bearing
/// part, so repeated evaluations in the same hour agree while the outcome
/// still varies across hours and users.
pub type FatigueSampler = fn(&str, &str, &str) -> bool;

pub fn hash_fatigue_sample(user: &str, family: &str, hour_bucket: &str) -> bool {
    let mut hasher = Sha256::new();
    hasher.update(user.as_bytes());
    hasher.update(b"|");
    hasher.update(family.as_bytes());
    hasher.update(b"|");
    hasher.update(hour_bucket.as_bytes());
    let digest = hasher.finalize();
    digest[0] % 2 == 0
}
