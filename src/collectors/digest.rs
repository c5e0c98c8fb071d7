//! Morning brief and daily close digests.
//!
//! One digest event per user per local day, idempotent via the `(user,
//! event_type, local_date)` part of the event key. A missed window catches
//! up on the next invocation inside the window; a repeat is a no-op.

use chrono::Duration;

use crate::db::{DbError, ItemSource, PulseDb};
use crate::delivery::PushAction;

use super::{Candidate, CollectorCtx, Level};

/// "Pressured enough to headline the brief": due within 8h of local midnight.
const BRIEF_URGENT_HORIZON_HOURS: i64 = 8;

fn summarize_brief(
    tasks_due: usize,
    assignments_due: usize,
    classes: usize,
    urgent_title: &str,
    next_class: &str,
) -> String {
    let focus = if !urgent_title.is_empty() {
        format!("fokus dulu ke \"{}\".", urgent_title)
    } else if !next_class.is_empty() {
        format!("siapkan kelas {}.", next_class)
    } else {
        "start dari satu quick win 15 menit.".to_string()
    };

    format!(
        "Hari ini: {} task aktif, {} assignment aktif, {} agenda kelas. Saran Nova: {}",
        tasks_due, assignments_due, classes, focus
    )
}

pub fn collect_morning_brief(db: &PulseDb, ctx: &CollectorCtx) -> Result<Vec<Candidate>, DbError> {
    let window = ctx.window;
    if !(6..=9).contains(&window.local_hour) {
        return Ok(Vec::new());
    }

    let classes = db.schedule_for_day(window.day_id)?;
    let next_class = classes
        .first()
        .map(|c| format!("{} {}", c.time_start.chars().take(5).collect::<String>(), c.subject))
        .unwrap_or_default();

    let mut candidates = Vec::new();
    for user in ctx.users {
        let items = db.open_items_for_user_before(ctx.caps, user, window.end_utc, 8)?;
        let tasks: Vec<_> = items
            .iter()
            .filter(|i| i.source == ItemSource::Task)
            .collect();
        let assignments: Vec<_> = items
            .iter()
            .filter(|i| i.source == ItemSource::Assignment)
            .collect();

        let urgent_cutoff = window.start_utc + Duration::hours(BRIEF_URGENT_HORIZON_HOURS);
        let urgent_title = tasks
            .iter()
            .find(|t| t.deadline.map(|d| d <= urgent_cutoff).unwrap_or(false))
            .map(|t| t.title.clone())
            .unwrap_or_default();

        let body = summarize_brief(
            tasks.len(),
            assignments.len(),
            classes.len(),
            &urgent_title,
            &next_class,
        );

        let titles = |items: &[&crate::db::WorkItem]| -> Vec<String> {
            items.iter().take(5).map(|i| i.title.clone()).collect()
        };

        candidates.push(Candidate {
            user: user.clone(),
            event_type: "morning_brief".to_string(),
            event_key: "daily-brief".to_string(),
            level: Level::Info,
            title: "Morning Brief".to_string(),
            body,
            url: "/".to_string(),
            payload: serde_json::json!({
                "tasks_due_today": tasks.len(),
                "assignments_due_today": assignments.len(),
                "classes_today": classes.len(),
                "task_titles": titles(&tasks),
                "assignment_titles": titles(&assignments),
                "next_class": next_class,
            }),
            actions: vec![PushAction::new("open-schedule", "Lihat Detail")],
        });
    }

    Ok(candidates)
}

pub fn collect_daily_close(db: &PulseDb, ctx: &CollectorCtx) -> Result<Vec<Candidate>, DbError> {
    let window = ctx.window;
    if !(19..=22).contains(&window.local_hour) {
        return Ok(Vec::new());
    }

    let mut candidates = Vec::new();
    for user in ctx.users {
        let completed = db.completed_count_between(ctx.caps, user, window.start_utc, window.now_utc)?;
        let pending = db.pending_count(ctx.caps, user)?;
        let due_48h = db.due_count_within(ctx.caps, user, window.now_utc, Duration::hours(48))?;
        let next = db.next_open_item(ctx.caps, user, window.now_utc)?;

        let first_action = next
            .as_ref()
            .map(|item| format!(" Besok mulai dari \"{}\".", item.title))
            .unwrap_or_default();
        let body = format!(
            "Hari ini {} task selesai, {} masih pending ({} due dalam 48 jam).{}",
            completed, pending, due_48h, first_action
        );

        candidates.push(Candidate {
            user: user.clone(),
            event_type: "daily_close".to_string(),
            event_key: "daily-close".to_string(),
            level: Level::Info,
            title: "Daily Close".to_string(),
            body,
            url: "/daily-tasks".to_string(),
            payload: serde_json::json!({
                "completed_today": completed,
                "pending": pending,
                "due_48h": due_48h,
                "next_item_id": next.as_ref().map(|i| i.id),
                "next_item_title": next.as_ref().map(|i| i.title.clone()),
            }),
            actions: vec![PushAction::new("open", "Open")],
        });
    }

    Ok(candidates)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::db::test_utils::test_db;
    use crate::db::{sql_ts, SchemaCaps};
    use crate::window::LocalWindow;
    use chrono::{DateTime, TimeZone, Utc};
    use rusqlite::params;

    // 00:30 UTC = 07:30 local at +7 (Wednesday, day_id 3)
    fn morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 5, 0, 30, 0).unwrap()
    }

    // 13:00 UTC = 20:00 local at +7
    fn evening() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 5, 13, 0, 0).unwrap()
    }

    fn run(
        db: &PulseDb,
        now: DateTime<Utc>,
        f: super::super::CollectorFn,
    ) -> Vec<Candidate> {
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
        f(db, &ctx).unwrap()
    }

    #[test]
    fn test_brief_only_in_morning_window() {
        let db = test_db();
        assert_eq!(run(&db, morning(), collect_morning_brief).len(), 2);
        assert!(run(&db, evening(), collect_morning_brief).is_empty());
    }

    #[test]
    fn test_brief_highlights_pressured_task() {
        let db = test_db();
        db.conn_ref()
            .execute(
                "INSERT INTO tasks (title, deadline, assigned_to) VALUES ('Bayar UKT', ?1, 'Zaldy')",
                params![sql_ts(morning() + chrono::Duration::minutes(20))],
            )
            .unwrap();
        db.conn_ref()
            .execute(
                "INSERT INTO schedule (day_id, subject, time_start) VALUES (3, 'Statistika', '13:00:00')",
                [],
            )
            .unwrap();

        let candidates = run(&db, morning(), collect_morning_brief);
        let own = candidates.iter().find(|c| c.user == "Zaldy").unwrap();
        assert!(own.body.contains("fokus dulu ke \"Bayar UKT\""));
        assert_eq!(own.payload["classes_today"], 1);
        assert_eq!(own.event_key, "daily-brief");

        // The partner has no urgent task; they get the class suggestion
        let partner = candidates.iter().find(|c| c.user == "Nesya").unwrap();
        assert!(partner.body.contains("siapkan kelas 13:00 Statistika"));
    }

    #[test]
    fn test_brief_quick_win_fallback() {
        let db = test_db();
        let candidates = run(&db, morning(), collect_morning_brief);
        assert!(candidates[0].body.contains("quick win 15 menit"));
    }

    #[test]
    fn test_daily_close_only_in_evening_window() {
        let db = test_db();
        assert!(run(&db, morning(), collect_daily_close).is_empty());
        assert_eq!(run(&db, evening(), collect_daily_close).len(), 2);
    }

    #[test]
    fn test_daily_close_summarizes_and_suggests_next() {
        let db = test_db();
        let now = evening();
        db.conn_ref()
            .execute(
                "INSERT INTO tasks (title, completed, completed_at, completed_by, assigned_to)
                 VALUES ('Beres-beres', 1, ?1, 'Zaldy', 'Zaldy')",
                params![sql_ts(now - chrono::Duration::hours(3))],
            )
            .unwrap();
        db.conn_ref()
            .execute(
                "INSERT INTO tasks (title, deadline, assigned_to) VALUES ('Draft BAB 2', ?1, 'Zaldy')",
                params![sql_ts(now + chrono::Duration::hours(20))],
            )
            .unwrap();

        let candidates = run(&db, now, collect_daily_close);
        let own = candidates.iter().find(|c| c.user == "Zaldy").unwrap();
        assert_eq!(own.payload["completed_today"], 1);
        assert_eq!(own.payload["pending"], 1);
        assert_eq!(own.payload["due_48h"], 1);
        assert!(own.body.contains("Besok mulai dari \"Draft BAB 2\""));
        assert_eq!(own.event_key, "daily-close");
    }
}
