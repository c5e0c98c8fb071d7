//! Execution drift detector and copilot.
//!
//! A drift candidate is an item the user started 40 minutes to 6 hours ago
//! with no completion since and no followup push in the last 2 hours. The
//! copilot lines the followup with a next-action recommendation: the user's
//! nearest-deadline open item, risk-banded from hours-left, sized to a
//! 15-minute step when that item was snoozed twice in 6 hours, 25 otherwise.

use chrono::Duration;

use crate::db::{DbError, PulseDb, WorkItem};
use crate::delivery::PushAction;
use crate::risk;

use super::{Candidate, CollectorCtx, Level};

const SNOOZE_LOOKBACK_HOURS: i64 = 6;
const SNOOZE_SHRINK_THRESHOLD: i64 = 2;

struct NextAction {
    action: String,
    reason: String,
    step_minutes: i64,
    item_id: Option<i64>,
    risk_band: Option<&'static str>,
}

/// Author the copilot recommendation for one user.
fn next_action_for(
    db: &PulseDb,
    ctx: &CollectorCtx,
    user: &str,
    next: &Option<WorkItem>,
) -> Result<NextAction, DbError> {
    let now = ctx.window.now_utc;
    let item = match next {
        Some(item) => item,
        None => {
            return Ok(NextAction {
                action: "Ambil 1 quick win 15 menit dari backlog.".to_string(),
                reason: "Tidak ada deadline dekat; jaga momentum.".to_string(),
                step_minutes: 15,
                item_id: None,
                risk_band: None,
            })
        }
    };

    let assessment = risk::assess(item.hours_left(now), &item.priority, item.source);
    let snoozes = db.snooze_count_since(
        user,
        &item.id.to_string(),
        now - Duration::hours(SNOOZE_LOOKBACK_HOURS),
    )?;
    let step_minutes: i64 = if snoozes >= SNOOZE_SHRINK_THRESHOLD {
        15
    } else {
        25
    };

    let reason = match item.hours_left(now) {
        Some(h) if h <= 0.0 => format!("\"{}\" sudah lewat deadline (risk {}).", item.title, assessment.risk_band.as_str()),
        Some(h) => format!(
            "\"{}\" due {:.0} jam lagi (risk {}).",
            item.title,
            h,
            assessment.risk_band.as_str()
        ),
        None => format!("\"{}\" belum punya deadline.", item.title),
    };

    Ok(NextAction {
        action: format!("Kerjakan \"{}\" selama {} menit.", item.title, step_minutes),
        reason,
        step_minutes,
        item_id: Some(item.id),
        risk_band: Some(assessment.risk_band.as_str()),
    })
}

pub fn collect(db: &PulseDb, ctx: &CollectorCtx) -> Result<Vec<Candidate>, DbError> {
    let window = ctx.window;
    let bucket = window.hour_bucket();

    let mut candidates = Vec::new();
    for user in ctx.users {
        let drifting = db.drift_candidates(user, window.now_utc)?;
        if drifting.is_empty() {
            continue;
        }

        let next = db.next_open_item(ctx.caps, user, window.now_utc)?;
        let recommendation = next_action_for(db, ctx, user, &next)?;

        for drift in drifting {
            let title = db
                .item_title(&drift.entity_type, &drift.entity_id)?
                .unwrap_or_else(|| "item yang tadi".to_string());

            candidates.push(Candidate {
                user: user.clone(),
                event_type: "execution_followup".to_string(),
                event_key: format!(
                    "drift-{}-{}-{}",
                    drift.entity_type, drift.entity_id, bucket
                ),
                level: Level::Warning,
                title: "Execution Copilot".to_string(),
                body: format!(
                    "Masih jalan sama \"{}\"? {} {}",
                    title, recommendation.action, recommendation.reason
                ),
                url: if drift.entity_type == "assignment" {
                    "/college-assignments".to_string()
                } else {
                    "/daily-tasks".to_string()
                },
                payload: serde_json::json!({
                    "entity_type": drift.entity_type,
                    "entity_id": drift.entity_id,
                    "started_at": drift.started_at,
                    "step_minutes": recommendation.step_minutes,
                    "next_item_id": recommendation.item_id,
                    "risk_band": recommendation.risk_band,
                }),
                actions: vec![
                    PushAction::new("done", "Sudah Selesai"),
                    PushAction::new("start", format!("Lanjut {} Menit", recommendation.step_minutes).as_str()),
                    PushAction::new("snooze", "Nanti"),
                ],
            });
        }
    }

    Ok(candidates)
}

// =============================================================================
// Tests
// =============================================================================
