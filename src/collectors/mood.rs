//! Mood-drop detector.
//!
//! Compares the trailing 2-day mood average against the preceding 3-day
//! window. Fires a self-care nudge plus a partner alert on a ≥0.7 drop with
//! enough samples, or whenever the recent average sits at the low-mood
//! floor. Only inside humane local hours.

use chrono::Duration;

use crate::db::{DbError, PulseDb};
use crate::delivery::PushAction;

use super::{Candidate, CollectorCtx, Level};

const MIN_RECENT_SAMPLES: i64 = 2;
const MIN_PREV_SAMPLES: i64 = 2;
const DROP_THRESHOLD: f64 = 0.7;
const LOW_MOOD_FLOOR: f64 = 2.6;

pub fn collect(db: &PulseDb, ctx: &CollectorCtx) -> Result<Vec<Candidate>, DbError> {
    let window = ctx.window;
    if window.local_hour < 7 || window.local_hour > 22 {
        return Ok(Vec::new());
    }
    if !ctx.caps.evaluations_user {
        return Ok(Vec::new());
    }

    let now = window.now_utc;
    let recent_start = now - Duration::days(2);
    let prev_start = now - Duration::days(5);

    let mut candidates = Vec::new();
    for user in ctx.users {
        let partner = match ctx.config.partner_for(user) {
            Some(p) => p,
            None => continue,
        };

        let (recent_avg, recent_cnt) = db.mood_window_avg(user, recent_start, now)?;
        if recent_cnt < MIN_RECENT_SAMPLES {
            continue;
        }
        let (prev_avg, prev_cnt) = db.mood_window_avg(user, prev_start, recent_start)?;

        let dropped = prev_cnt >= MIN_PREV_SAMPLES && recent_avg <= prev_avg - DROP_THRESHOLD;
        let low_mood = recent_avg <= LOW_MOOD_FLOOR;
        if !dropped && !low_mood {
            continue;
        }

        let payload = serde_json::json!({
            "recent_avg": recent_avg,
            "prev_avg": prev_avg,
            "dropped": dropped,
            "low_mood": low_mood,
        });

        candidates.push(Candidate {
            user: user.clone(),
            event_type: "mood_drop_self".to_string(),
            event_key: format!("{}-self-{}", user, window.local_date),
            level: Level::Warning,
            title: "Mood Guard".to_string(),
            body: format!(
                "Trend mood kamu lagi turun (avg {:.1}). Ambil 15 menit reset lalu lanjut 1 task ringan.",
                recent_avg
            ),
            url: "/goals".to_string(),
            payload: payload.clone(),
            actions: Vec::new(),
        });

        let partner_body = if prev_cnt >= MIN_PREV_SAMPLES {
            format!(
                "{} lagi drop (avg {:.1} dari {:.1}). Saran: check-in 5 menit malam ini.",
                user, recent_avg, prev_avg
            )
        } else {
            format!(
                "{} lagi drop (avg {:.1}). Saran: kirim check-in singkat malam ini.",
                user, recent_avg
            )
        };
        candidates.push(Candidate {
            user: partner.to_string(),
            event_type: "mood_drop_alert".to_string(),
            event_key: format!("{}-partner-{}", user, window.local_date),
            level: Level::Critical,
            title: "Mood Drop Alert".to_string(),
            body: partner_body,
            url: "/chat".to_string(),
            payload: serde_json::json!({
                "target": user,
                "recent_avg": recent_avg,
                "prev_avg": prev_avg,
                "dropped": dropped,
                "low_mood": low_mood,
            }),
            actions: vec![PushAction::new("open-chat", "Open Chat")],
        });
    }

    Ok(candidates)
}

// =============================================================================
// Tests
// =============================================================================
