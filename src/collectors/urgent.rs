//! Urgent deadline radar.
//!
//! Classifies items inside the short lookahead (and a just-missed grace
//! window) into overdue / critical / warning stages. The event key embeds
//! `(source, id, stage, hour_bucket)`: re-entering the same stage within the
//! hour is silent, crossing into a worse stage fires again. Critical and
//! overdue stages also ping the owner's partner.

use chrono::Duration;

use crate::db::{DbError, ItemSource, PulseDb, WorkItem};
use crate::delivery::PushAction;

use super::{Candidate, CollectorCtx, Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Warning,
    Critical,
    Overdue,
}

impl Stage {
    fn from_minutes(minutes_left: i64) -> Option<Self> {
        if minutes_left <= 0 {
            Some(Stage::Overdue)
        } else if minutes_left <= 30 {
            Some(Stage::Critical)
        } else if minutes_left <= 90 {
            Some(Stage::Warning)
        } else {
            None
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Stage::Warning => "warning",
            Stage::Critical => "critical",
            Stage::Overdue => "overdue",
        }
    }

    fn level(self) -> Level {
        match self {
            Stage::Warning => Level::Warning,
            Stage::Critical | Stage::Overdue => Level::Critical,
        }
    }

    /// Stage-appropriate call-to-action buttons.
    fn actions(self) -> Vec<PushAction> {
        match self {
            Stage::Warning => vec![
                PushAction::new("replan", "Replan"),
                PushAction::new("open", "Open"),
            ],
            Stage::Critical => vec![
                PushAction::new("request-support", "Minta Support"),
                PushAction::new("open", "Open"),
            ],
            Stage::Overdue => vec![
                PushAction::new("check-in", "Check-In Now"),
                PushAction::new("open", "Open"),
            ],
        }
    }
}

fn source_label(source: ItemSource) -> &'static str {
    match source {
        ItemSource::Task => "Task",
        ItemSource::Assignment => "Assignment",
    }
}

fn stage_body(item: &WorkItem, minutes_left: i64) -> String {
    if minutes_left > 0 {
        format!(
            "{} \"{}\" jatuh tempo {} menit lagi.",
            source_label(item.source),
            item.title,
            minutes_left
        )
    } else {
        format!(
            "{} \"{}\" sudah overdue. Tangani sekarang.",
            source_label(item.source),
            item.title
        )
    }
}

pub fn collect(db: &PulseDb, ctx: &CollectorCtx) -> Result<Vec<Candidate>, DbError> {
    let window = ctx.window;
    let from = window.now_utc - Duration::minutes(ctx.config.urgent_grace_min);
    let to = window.now_utc + Duration::minutes(ctx.config.urgent_lookahead_min);
    let bucket = window.hour_bucket();

    let mut candidates = Vec::new();
    for item in db.items_due_between(ctx.caps, from, to)? {
        let minutes_left = match item.minutes_left(window.now_utc) {
            Some(m) => m,
            None => continue,
        };
        let stage = match Stage::from_minutes(minutes_left) {
            Some(s) => s,
            None => continue,
        };

        // Unowned tasks were filtered by the query; unowned assignments go
        // to everyone the pass knows about.
        let recipients: Vec<String> = match &item.owner {
            Some(owner) => vec![owner.clone()],
            None => ctx.users.to_vec(),
        };
        if recipients.is_empty() {
            continue;
        }

        let deadline_ts = item.deadline.map(crate::db::sql_ts);
        let payload = serde_json::json!({
            "source": item.source.as_str(),
            "item_id": item.id,
            "minutes_left": minutes_left,
            "deadline": deadline_ts,
            "stage": stage.as_str(),
        });
        let body = stage_body(&item, minutes_left);

        for user in &recipients {
            candidates.push(Candidate {
                user: user.clone(),
                event_type: "urgent_radar".to_string(),
                event_key: format!(
                    "{}-{}-{}-{}",
                    item.source.as_str(),
                    item.id,
                    stage.as_str(),
                    bucket
                ),
                level: stage.level(),
                title: "Urgent Radar".to_string(),
                body: body.clone(),
                url: item.source.url().to_string(),
                payload: payload.clone(),
                actions: stage.actions(),
            });
        }

        // Partner support ping for the sharp stages, only when the item has
        // a clear owner inside the couple.
        if matches!(stage, Stage::Critical | Stage::Overdue) {
            if let Some(owner) = &item.owner {
                if let Some(partner) = ctx.config.partner_for(owner) {
                    let ping_body = if minutes_left > 0 {
                        format!(
                            "{} punya {} \"{}\" due {} menit lagi. Bisa bantu unblock?",
                            owner,
                            source_label(item.source).to_lowercase(),
                            item.title,
                            minutes_left
                        )
                    } else {
                        format!(
                            "{} \"{}\" milik {} sudah overdue. Coba check-in sebentar.",
                            source_label(item.source),
                            item.title,
                            owner
                        )
                    };
                    candidates.push(Candidate {
                        user: partner.to_string(),
                        event_type: "support_ping".to_string(),
                        event_key: format!(
                            "{}-{}-{}-{}-partner",
                            item.source.as_str(),
                            item.id,
                            stage.as_str(),
                            bucket
                        ),
                        level: Level::Warning,
                        title: "Support Ping".to_string(),
                        body: ping_body,
                        url: "/chat".to_string(),
                        payload: serde_json::json!({
                            "source": item.source.as_str(),
                            "item_id": item.id,
                            "minutes_left": minutes_left,
                            "stage": stage.as_str(),
                            "target": owner,
                        }),
                        actions: vec![PushAction::new("open-chat", "Open Chat")],
                    });
                }
            }
        }
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

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 5, 5, 0, 0).unwrap()
    }

    fn run(db: &PulseDb) -> Vec<Candidate> {
        let config = EngineConfig::default();
        let window = LocalWindow::resolve(now(), config.tz_offset_hours);
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

    fn insert_task(db: &PulseDb, title: &str, minutes_from_now: i64, owner: &str) {
        db.conn_ref()
            .execute(
                "INSERT INTO tasks (title, priority, deadline, assigned_to) VALUES (?1, 'high', ?2, ?3)",
                params![title, sql_ts(now() + chrono::Duration::minutes(minutes_from_now)), owner],
            )
            .unwrap();
    }

    #[test]
    fn test_stage_classification() {
        assert_eq!(Stage::from_minutes(-5), Some(Stage::Overdue));
        assert_eq!(Stage::from_minutes(0), Some(Stage::Overdue));
        assert_eq!(Stage::from_minutes(1), Some(Stage::Critical));
        assert_eq!(Stage::from_minutes(30), Some(Stage::Critical));
        assert_eq!(Stage::from_minutes(31), Some(Stage::Warning));
        assert_eq!(Stage::from_minutes(90), Some(Stage::Warning));
        assert_eq!(Stage::from_minutes(91), None);
    }

    #[test]
    fn test_critical_task_fires_radar_and_partner_ping() {
        let db = test_db();
        insert_task(&db, "Kirim laporan", 20, "Zaldy");

        let candidates = run(&db);
        assert_eq!(candidates.len(), 2);

        let radar = candidates
            .iter()
            .find(|c| c.event_type == "urgent_radar")
            .unwrap();
        assert_eq!(radar.user, "Zaldy");
        assert_eq!(radar.level, Level::Critical);
        assert_eq!(radar.event_key, "task-1-critical-2026-08-05-12");
        assert_eq!(radar.payload["stage"], "critical");
        assert!(radar.actions.iter().any(|a| a.action == "request-support"));

        let ping = candidates
            .iter()
            .find(|c| c.event_type == "support_ping")
            .unwrap();
        assert_eq!(ping.user, "Nesya");
        assert_eq!(ping.event_key, "task-1-critical-2026-08-05-12-partner");
    }

    #[test]
    fn test_warning_stage_has_no_partner_ping() {
        let db = test_db();
        insert_task(&db, "Draft slide", 60, "Nesya");

        let candidates = run(&db);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].level, Level::Warning);
        assert!(candidates[0].actions.iter().any(|a| a.action == "replan"));
    }

    #[test]
    fn test_overdue_inside_grace_still_fires() {
        let db = test_db();
        insert_task(&db, "Missed", -60, "Zaldy");

        let candidates = run(&db);
        let radar = candidates
            .iter()
            .find(|c| c.event_type == "urgent_radar")
            .unwrap();
        assert_eq!(radar.payload["stage"], "overdue");
        assert!(radar.body.contains("overdue"));
        assert!(radar.actions.iter().any(|a| a.action == "check-in"));
    }

    #[test]
    fn test_far_items_are_ignored() {
        let db = test_db();
        insert_task(&db, "Later", 300, "Zaldy");
        insert_task(&db, "Long gone", -300, "Zaldy");
        assert!(run(&db).is_empty());
    }

    #[test]
    fn test_unassigned_assignment_broadcasts() {
        let db = test_db();
        db.conn_ref()
            .execute(
                "INSERT INTO assignments (title, deadline) VALUES ('Essay', ?1)",
                params![sql_ts(now() + chrono::Duration::minutes(25))],
            )
            .unwrap();

        let candidates = run(&db);
        let radars: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| c.event_type == "urgent_radar")
            .collect();
        assert_eq!(radars.len(), 2);
        assert!(radars.iter().any(|c| c.user == "Zaldy"));
        assert!(radars.iter().any(|c| c.user == "Nesya"));
        // No owner, no partner ping
        assert!(candidates.iter().all(|c| c.event_type != "support_ping"));
    }
}
