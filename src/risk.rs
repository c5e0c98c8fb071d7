//! Deadline-risk scoring.
//!
//! A risk assessment is recomputed on every pass from a deadline, a priority
//! and an item-kind weight; it is never stored as authoritative state, only
//! reflected into event payloads.

use serde::Serialize;

use crate::db::ItemSource;

/// Coarse urgency classification derived from a numeric risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskBand {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskBand {
    pub fn from_score(score: u8) -> Self {
        match score {
            75..=u8::MAX => RiskBand::Critical,
            55..=74 => RiskBand::High,
            35..=54 => RiskBand::Medium,
            _ => RiskBand::Low,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskBand::Low => "low",
            RiskBand::Medium => "medium",
            RiskBand::High => "high",
            RiskBand::Critical => "critical",
        }
    }
}

/// Per-item risk snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub risk_score: u8,
    pub risk_band: RiskBand,
    pub hours_left: Option<f64>,
}

/// Urgency floor from time-to-deadline alone. Undated items sit at the
/// far-future baseline.
fn base_score(hours_left: Option<f64>) -> u8 {
    match hours_left {
        Some(h) if h <= 0.0 => 85,
        Some(h) if h <= 6.0 => 70,
        Some(h) if h <= 12.0 => 56,
        Some(h) if h <= 24.0 => 42,
        Some(h) if h <= 48.0 => 30,
        _ => 18,
    }
}

fn priority_bonus(priority: &str) -> u8 {
    match priority.to_ascii_lowercase().as_str() {
        "high" => 14,
        "medium" => 6,
        _ => 0,
    }
}

fn kind_bonus(source: ItemSource) -> u8 {
    // College deliverables skew riskier than household tasks.
    match source {
        ItemSource::Assignment => 6,
        ItemSource::Task => 0,
    }
}

/// Score one item. Clamped to [0, 100].
pub fn assess(hours_left: Option<f64>, priority: &str, source: ItemSource) -> RiskAssessment {
    let raw =
        base_score(hours_left) as u16 + priority_bonus(priority) as u16 + kind_bonus(source) as u16;
    let score = raw.min(100) as u8;
    RiskAssessment {
        risk_score: score,
        risk_band: RiskBand::from_score(score),
        hours_left,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_monotone_in_hours_left() {
        let hours = [-2.0, 0.0, 3.0, 6.0, 9.0, 12.0, 20.0, 24.0, 40.0, 48.0, 60.0, 100.0];
        let mut prev = u8::MAX;
        for h in hours {
            let score = assess(Some(h), "high", ItemSource::Task).risk_score;
            assert!(
                score <= prev,
                "score must not increase as hours grow: {} at {}h after {}",
                score,
                h,
                prev
            );
            prev = score;
        }
    }

    #[test]
    fn test_band_thresholds_exact() {
        assert_eq!(RiskBand::from_score(75), RiskBand::Critical);
        assert_eq!(RiskBand::from_score(74), RiskBand::High);
        assert_eq!(RiskBand::from_score(55), RiskBand::High);
        assert_eq!(RiskBand::from_score(54), RiskBand::Medium);
        assert_eq!(RiskBand::from_score(35), RiskBand::Medium);
        assert_eq!(RiskBand::from_score(34), RiskBand::Low);
    }

    #[test]
    fn test_bonuses_stack() {
        // 4h out: base 70; high +14; assignment +6 => 90 critical
        let a = assess(Some(4.0), "high", ItemSource::Assignment);
        assert_eq!(a.risk_score, 90);
        assert_eq!(a.risk_band, RiskBand::Critical);

        // 30h out: base 30; low +0; task +0 => 30 low
        let b = assess(Some(30.0), "low", ItemSource::Task);
        assert_eq!(b.risk_score, 30);
        assert_eq!(b.risk_band, RiskBand::Low);
    }

    #[test]
    fn test_overdue_high_assignment_clamps_inside_range() {
        let a = assess(Some(-1.0), "high", ItemSource::Assignment);
        assert_eq!(a.risk_score, 100);
        assert_eq!(a.risk_band, RiskBand::Critical);
    }

    #[test]
    fn test_undated_item_is_low() {
        let a = assess(None, "low", ItemSource::Task);
        assert_eq!(a.risk_score, 18);
        assert_eq!(a.risk_band, RiskBand::Low);
    }
}
