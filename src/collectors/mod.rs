//! Signal collectors.
//!
//! Each collector is a pure read over the workspace stores that returns zero
//! or more candidate events; persistence, admission and delivery happen in
//! the orchestrator. Collectors are registered in a table so a failing one
//! is skipped with a warning instead of aborting the pass.

pub mod couple;
pub mod digest;
pub mod drift;
pub mod mood;
pub mod risk_radar;
pub mod urgent;

use crate::config::EngineConfig;
use crate::db::events::NewEvent;
use crate::db::{DbError, PulseDb, SchemaCaps};
use crate::delivery::PushAction;
use crate::window::LocalWindow;

/// Severity attached to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
    Critical,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Critical => "critical",
        }
    }
}

/// A candidate event produced by a collector, not yet persisted or gated.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub user: String,
    pub event_type: String,
    pub event_key: String,
    pub level: Level,
    pub title: String,
    pub body: String,
    pub url: String,
    pub payload: serde_json::Value,
    pub actions: Vec<PushAction>,
}

impl Candidate {
    pub fn to_new_event(&self) -> NewEvent {
        NewEvent {
            user_id: self.user.clone(),
            event_type: self.event_type.clone(),
            event_key: self.event_key.clone(),
            level: self.level.as_str().to_string(),
            title: self.title.clone(),
            body: self.body.clone(),
            url: self.url.clone(),
            payload: self.payload.clone(),
        }
    }
}

/// Context shared by every collector in one pass.
pub struct CollectorCtx<'a> {
    pub window: &'a LocalWindow,
    pub caps: &'a SchemaCaps,
    pub config: &'a EngineConfig,
    pub users: &'a [String],
}

/// Function signature for a collector.
pub type CollectorFn = fn(&PulseDb, &CollectorCtx) -> Result<Vec<Candidate>, DbError>;

/// A registered collector.
pub struct CollectorEntry {
    pub name: &'static str,
    pub run: CollectorFn,
}

/// The default collector lineup, in emission order.
pub fn default_collectors() -> Vec<CollectorEntry> {
    vec![
        CollectorEntry {
            name: "morning_brief",
            run: digest::collect_morning_brief,
        },
        CollectorEntry {
            name: "urgent_radar",
            run: urgent::collect,
        },
        CollectorEntry {
            name: "risk_radar",
            run: risk_radar::collect,
        },
        CollectorEntry {
            name: "mood_drop",
            run: mood::collect,
        },
        CollectorEntry {
            name: "couple_sync",
            run: couple::collect,
        },
        CollectorEntry {
            name: "execution_drift",
            run: drift::collect,
        },
        CollectorEntry {
            name: "daily_close",
            run: digest::collect_daily_close,
        },
    ]
}
