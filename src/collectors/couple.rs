//! Couple load balancing.
//!
//! Computes both partners' load indices and, when the gap is wide and the
//! heavier side has near-term work, emits one assist nudge to the lighter
//! partner and one focus nudge to the heavier one, at most once per local
//! hour bucket per pair (the hour lives in the event key). Also carries the
//! pair check-in suggestion: a long chat gap plus pressure on either side.

use chrono::Duration;

use crate::db::{DbError, PulseDb, SchemaCaps};
use crate::delivery::PushAction;
use crate::load::{self, FocusBand, LoadInputs};

use super::{Candidate, CollectorCtx, Level};

const CHECKIN_GAP_HOURS: f64 = 16.0;
const CHECKIN_PENDING_FLOOR: i64 = 4;

/// Gather the raw counters behind one user's load index.
fn load_inputs(
    db: &PulseDb,
    caps: &SchemaCaps,
    ctx: &CollectorCtx,
    user: &str,
) -> Result<LoadInputs, DbError> {
    let now = ctx.window.now_utc;
    Ok(LoadInputs {
        pending: db.pending_count(caps, user)?,
        due_48h: db.due_count_within(caps, user, now, Duration::hours(48))?,
        due_24h: db.due_count_within(caps, user, now, Duration::hours(24))?,
        due_6h: db.due_count_within(caps, user, now, Duration::hours(6))?,
        completed_today: db.completed_count_between(caps, user, ctx.window.start_utc, now)?,
        activity_24h: db.ui_activity_count_since(user, now - Duration::hours(24))?,
        ignored_push_24h: db.push_ignored_count_since(user, now - Duration::hours(24))?,
    })
}

pub fn collect(db: &PulseDb, ctx: &CollectorCtx) -> Result<Vec<Candidate>, DbError> {
    let pair: [&String; 2] = match ctx.config.couple_users.as_slice() {
        [a, b, ..] => [a, b],
        _ => return Ok(Vec::new()),
    };

    let inputs_a = load_inputs(db, ctx.caps, ctx, pair[0])?;
    let inputs_b = load_inputs(db, ctx.caps, ctx, pair[1])?;
    let index_a = load::load_index(&inputs_a, &ctx.config.load_weights);
    let index_b = load::load_index(&inputs_b, &ctx.config.load_weights);

    let mut candidates = Vec::new();
    candidates.extend(assist_pair(db, ctx, pair, [&inputs_a, &inputs_b], [index_a, index_b])?);
    candidates.extend(checkin_suggestion(db, ctx, pair, [&inputs_a, &inputs_b])?);
    Ok(candidates)
}

fn assist_pair(
    db: &PulseDb,
    ctx: &CollectorCtx,
    pair: [&String; 2],
    inputs: [&LoadInputs; 2],
    indices: [f64; 2],
) -> Result<Vec<Candidate>, DbError> {
    let gap = (indices[0] - indices[1]).abs();
    if gap < ctx.config.load_gap_threshold {
        return Ok(Vec::new());
    }

    let (heavy, light) = if indices[0] >= indices[1] { (0, 1) } else { (1, 0) };
    if inputs[heavy].due_24h < 1 {
        return Ok(Vec::new());
    }

    let heavier = pair[heavy];
    let lighter = pair[light];
    let heavy_index = indices[heavy];
    let light_index = indices[light];
    let band = FocusBand::from_index(heavy_index);
    let bucket = ctx.window.hour_bucket();
    let next = db.next_open_item(ctx.caps, heavier, ctx.window.now_utc)?;
    let next_title = next
        .as_ref()
        .map(|i| i.title.clone())
        .unwrap_or_else(|| "item terdekat".to_string());

    let payload = serde_json::json!({
        "heavier": heavier,
        "lighter": lighter,
        "heavy_index": heavy_index,
        "light_index": light_index,
        "gap": gap,
        "band": band.as_str(),
        "item_id": next.as_ref().map(|i| i.id),
        "source": next.as_ref().map(|i| i.source.as_str()),
    });

    let assist = Candidate {
        user: lighter.clone(),
        event_type: "assist_opportunity".to_string(),
        event_key: format!("assist-{}-{}", heavier, bucket),
        level: Level::Info,
        title: "Assist Opportunity".to_string(),
        body: format!(
            "{} lagi keberatan beban (index {:.0} vs {:.0}). Ambil 1 item kecil biar seimbang?",
            heavier, heavy_index, light_index
        ),
        url: "/daily-tasks".to_string(),
        payload: payload.clone(),
        actions: vec![PushAction::new("open", "Lihat Item")],
    };

    let focus = Candidate {
        user: heavier.clone(),
        event_type: "focus_nudge".to_string(),
        event_key: format!("focus-{}-{}", heavier, bucket),
        level: Level::Info,
        title: "Focus Nudge".to_string(),
        body: format!(
            "Load kamu {:.0} ({}). Fokus {} menit ke \"{}\" dulu, sisanya nanti.",
            heavy_index,
            band.as_str(),
            band.focus_minutes(),
            next_title
        ),
        url: "/daily-tasks".to_string(),
        payload,
        actions: vec![PushAction::new("start", "Mulai Fokus")],
    };

    Ok(vec![assist, focus])
}

fn checkin_suggestion(
    db: &PulseDb,
    ctx: &CollectorCtx,
    pair: [&String; 2],
    inputs: [&LoadInputs; 2],
) -> Result<Vec<Candidate>, DbError> {
    let users: Vec<String> = pair.iter().map(|u| (*u).clone()).collect();
    let gap_hours = match db.last_couple_chat_at(&users)? {
        Some(last) => (ctx.window.now_utc - last).num_seconds() as f64 / 3600.0,
        None => 999.0,
    };

    let high_load = inputs[0].pending >= CHECKIN_PENDING_FLOOR
        || inputs[1].pending >= CHECKIN_PENDING_FLOOR;
    if gap_hours < CHECKIN_GAP_HOURS || !(high_load || ctx.window.local_hour >= 19) {
        return Ok(Vec::new());
    }

    let body = format!(
        "Sudah {} jam belum check-in. Saran Nova: 5 menit sync malam ini (status + 1 support request).",
        gap_hours.floor() as i64
    );
    let mut pending = serde_json::Map::new();
    pending.insert(pair[0].clone(), inputs[0].pending.into());
    pending.insert(pair[1].clone(), inputs[1].pending.into());
    let payload = serde_json::json!({
        "gap_hours": (gap_hours * 100.0).round() / 100.0,
        "pending": serde_json::Value::Object(pending),
    });

    Ok(users
        .into_iter()
        .map(|user| Candidate {
            user,
            event_type: "checkin_suggestion".to_string(),
            event_key: format!("pair-checkin-{}", ctx.window.local_date),
            level: Level::Info,
            title: "Couple Check-In".to_string(),
            body: body.clone(),
            url: "/chat".to_string(),
            payload: payload.clone(),
            actions: vec![PushAction::new("open-chat", "Check-In Now")],
        })
        .collect())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::db::test_utils::test_db;
    use crate::db::sql_ts;
    use crate::window::LocalWindow;
    use chrono::{DateTime, TimeZone, Utc};
    use rusqlite::params;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 5, 5, 0, 0).unwrap()
    }

    fn run_at(db: &PulseDb, now: DateTime<Utc>) -> Vec<Candidate> {
        let config = EngineConfig::default();
        let window = LocalWindow::resolve(now, config.tz_offset_hours);
        let caps = SchemaCaps::probe(db.conn_ref());
        let users = config.couple_users.clone();
        let ctx = CollectorCtx {
            window: &window,
            caps: &caps,
            config: &config,
            users: &users,
        };
        collect(db, &ctx).unwrap()
    }

    fn insert_task(db: &PulseDb, owner: &str, title: &str, hours_out: Option<i64>) {
        db.conn_ref()
            .execute(
                "INSERT INTO tasks (title, deadline, assigned_to) VALUES (?1, ?2, ?3)",
                params![
                    title,
                    hours_out.map(|h| sql_ts(now() + chrono::Duration::hours(h))),
                    owner
                ],
            )
            .unwrap();
    }

    fn recent_chat(db: &PulseDb, user: &str, hours_ago: i64) {
        db.conn_ref()
            .execute(
                "INSERT INTO chat_messages (user_id, content, created_at) VALUES (?1, 'x', ?2)",
                params![user, sql_ts(now() - chrono::Duration::hours(hours_ago))],
            )
            .unwrap();
    }

    /// Pile work on one user: n pending tasks, one due inside 6h.
    fn overload(db: &PulseDb, owner: &str, pending: usize) {
        insert_task(db, owner, "due-soon", Some(3));
        for i in 1..pending {
            insert_task(db, owner, &format!("t{}", i), Some(100 + i as i64));
        }
    }

    #[test]
    fn test_wide_gap_fires_assist_and_focus_once_per_hour() {
        let db = test_db();
        recent_chat(&db, "Nesya", 1);
        // Zaldy: 5 pending, 1 due 6h/24h/48h -> 5*4 + 6 + 12 + 18 = 56; Nesya: 0
        overload(&db, "Zaldy", 5);

        let candidates = run_at(&db, now());
        assert_eq!(candidates.len(), 2);

        let assist = candidates
            .iter()
            .find(|c| c.event_type == "assist_opportunity")
            .unwrap();
        assert_eq!(assist.user, "Nesya");
        assert_eq!(assist.event_key, "assist-Zaldy-2026-08-05-12");
        assert_eq!(assist.payload["heavier"], "Zaldy");

        let focus = candidates
            .iter()
            .find(|c| c.event_type == "focus_nudge")
            .unwrap();
        assert_eq!(focus.user, "Zaldy");
        assert_eq!(focus.event_key, "focus-Zaldy-2026-08-05-12");
        assert!(focus.body.contains("due-soon"));
        assert!(focus.body.contains("25 menit"));
    }

    #[test]
    fn test_narrow_gap_is_silent() {
        let db = test_db();
        recent_chat(&db, "Nesya", 1);
        // Both sides loaded the same way
        overload(&db, "Zaldy", 3);
        overload(&db, "Nesya", 3);

        assert!(run_at(&db, now()).is_empty());
    }

    #[test]
    fn test_gap_without_near_term_work_is_silent() {
        let db = test_db();
        recent_chat(&db, "Nesya", 1);
        // Heavy pending but nothing due inside 24h
        for i in 0..6 {
            insert_task(&db, "Zaldy", &format!("later{}", i), Some(100 + i));
        }

        assert!(run_at(&db, now()).is_empty());
    }

    #[test]
    fn test_checkin_needs_gap_and_pressure() {
        let db = test_db();
        // 20h since last chat, both light, midday -> silent
        recent_chat(&db, "Zaldy", 20);
        assert!(run_at(&db, now()).is_empty());

        // Add pressure on one side -> fires for both users
        for i in 0..4 {
            insert_task(&db, "Nesya", &format!("p{}", i), None);
        }
        let candidates = run_at(&db, now());
        let checkins: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| c.event_type == "checkin_suggestion")
            .collect();
        assert_eq!(checkins.len(), 2);
        assert_eq!(checkins[0].event_key, "pair-checkin-2026-08-05");
        assert!(checkins[0].body.contains("20 jam"));
    }

    #[test]
    fn test_checkin_fires_in_evening_without_load() {
        let db = test_db();
        recent_chat(&db, "Zaldy", 20);
        // 13:00 UTC = 20:00 local
        let evening = Utc.with_ymd_and_hms(2026, 8, 5, 13, 0, 0).unwrap();
        let candidates = run_at(&db, evening);
        assert_eq!(
            candidates
                .iter()
                .filter(|c| c.event_type == "checkin_suggestion")
                .count(),
            2
        );
    }

    #[test]
    fn test_recent_chat_suppresses_checkin() {
        let db = test_db();
        recent_chat(&db, "Zaldy", 2);
        for i in 0..6 {
            insert_task(&db, "Nesya", &format!("p{}", i), None);
        }
        assert!(run_at(&db, now())
            .iter()
            .all(|c| c.event_type != "checkin_suggestion"));
    }
}
