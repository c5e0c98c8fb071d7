//! Workload pressure index.
//!
//! A single scalar per user summarizing how loaded they are right now, used
//! for couple load comparison and for sizing the recommended focus step. The
//! coefficients are behavioral tuning, not derived constants; they live in
//! config so deployments can adjust them without a rebuild.

use serde::{Deserialize, Serialize};

/// Tunable weights for the load formula.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadWeights {
    pub pending: f64,
    pub due_48h: f64,
    pub due_24h: f64,
    pub due_6h: f64,
    pub completed_today: f64,
    pub completed_cap: i64,
    pub activity: f64,
    pub activity_cap: i64,
    pub ignored_push: f64,
    pub ignored_push_cap: i64,
}

impl Default for LoadWeights {
    fn default() -> Self {
        Self {
            pending: 4.0,
            due_48h: 6.0,
            due_24h: 12.0,
            due_6h: 18.0,
            completed_today: 4.0,
            completed_cap: 8,
            activity: 1.2,
            activity_cap: 16,
            ignored_push: 4.0,
            ignored_push_cap: 6,
        }
    }
}

/// Raw counters feeding the index.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadInputs {
    pub pending: i64,
    pub due_48h: i64,
    pub due_24h: i64,
    pub due_6h: i64,
    pub completed_today: i64,
    pub activity_24h: i64,
    pub ignored_push_24h: i64,
}

/// Couple-context band over the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusBand {
    Calm,
    Focus,
    Critical,
}

impl FocusBand {
    pub fn from_index(index: f64) -> Self {
        if index >= 72.0 {
            FocusBand::Critical
        } else if index >= 40.0 {
            FocusBand::Focus
        } else {
            FocusBand::Calm
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FocusBand::Calm => "calm",
            FocusBand::Focus => "focus",
            FocusBand::Critical => "critical",
        }
    }

    /// Recommended focus block length under this band.
    pub fn focus_minutes(self) -> u32 {
        match self {
            FocusBand::Critical => 15,
            _ => 25,
        }
    }
}

/// Compute the index, clamped to [0, 100].
pub fn load_index(inputs: &LoadInputs, weights: &LoadWeights) -> f64 {
    let raw = inputs.pending as f64 * weights.pending
        + inputs.due_48h as f64 * weights.due_48h
        + inputs.due_24h as f64 * weights.due_24h
        + inputs.due_6h as f64 * weights.due_6h
        - inputs.completed_today.min(weights.completed_cap) as f64 * weights.completed_today
        - inputs.activity_24h.min(weights.activity_cap) as f64 * weights.activity
        + inputs.ignored_push_24h.min(weights.ignored_push_cap) as f64 * weights.ignored_push;
    raw.clamp(0.0, 100.0)
}
