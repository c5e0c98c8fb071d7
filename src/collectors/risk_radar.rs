//! Predictive risk radar.
//!
//! Scores items due between the urgent lookahead and 72 hours out, emitting
//! only the high/critical bands, best-first, capped per user per pass to
//! avoid flooding. A critical item additionally pings the owner's partner
//! once per item per band.

use std::collections::HashMap;

use chrono::Duration;

use crate::db::{DbError, PulseDb, WorkItem};
use crate::delivery::PushAction;
use crate::risk::{self, RiskBand};

use super::{Candidate, CollectorCtx, Level};

pub fn collect(db: &PulseDb, ctx: &CollectorCtx) -> Result<Vec<Candidate>, DbError> {
    let window = ctx.window;
    let from = window.now_utc + Duration::minutes(ctx.config.urgent_lookahead_min);
    let to = window.now_utc + Duration::hours(72);

    // Bucket scored items per recipient; unowned assignments count for
    // everyone in the pass.
    let mut per_user: HashMap<String, Vec<(WorkItem, risk::RiskAssessment)>> = HashMap::new();
    for item in db.items_due_between(ctx.caps, from, to)? {
        let assessment = risk::assess(item.hours_left(window.now_utc), &item.priority, item.source);
        if !matches!(assessment.risk_band, RiskBand::High | RiskBand::Critical) {
            continue;
        }
        let recipients: Vec<String> = match &item.owner {
            Some(owner) => vec![owner.clone()],
            None => ctx.users.to_vec(),
        };
        for user in recipients {
            per_user
                .entry(user)
                .or_default()
                .push((item.clone(), assessment.clone()));
        }
    }

    let mut candidates = Vec::new();
    let mut users: Vec<&String> = per_user.keys().collect();
    users.sort();

    for user in users {
        let mut scored = per_user[user].clone();
        scored.sort_by(|a, b| b.1.risk_score.cmp(&a.1.risk_score));
        scored.truncate(ctx.config.risk_emit_cap);

        for (item, assessment) in scored {
            let band = assessment.risk_band;
            let hours_left = assessment.hours_left.unwrap_or(0.0);
            let payload = serde_json::json!({
                "source": item.source.as_str(),
                "item_id": item.id,
                "hours_left": (hours_left * 10.0).round() / 10.0,
                "risk_score": assessment.risk_score,
                "risk_band": band.as_str(),
                "priority": item.priority,
            });

            let (event_type, level) = match band {
                RiskBand::Critical => ("risk_radar_critical", Level::Critical),
                _ => ("risk_radar_high", Level::Warning),
            };

            candidates.push(Candidate {
                user: user.clone(),
                event_type: event_type.to_string(),
                event_key: format!("{}-{}-{}", item.source.as_str(), item.id, band.as_str()),
                level,
                title: "Risk Radar".to_string(),
                body: format!(
                    "\"{}\" due {:.0} jam lagi (risk {}). Cicil sekarang biar aman.",
                    item.title, hours_left, assessment.risk_score
                ),
                url: item.source.url().to_string(),
                payload: payload.clone(),
                actions: vec![
                    PushAction::new("start", "Mulai 25 Menit"),
                    PushAction::new("open", "Open"),
                ],
            });

            if band == RiskBand::Critical {
                if let Some(partner) = ctx.config.partner_for(user) {
                    candidates.push(Candidate {
                        user: partner.to_string(),
                        event_type: "risk_support_ping".to_string(),
                        event_key: format!(
                            "{}-{}-{}-partner",
                            item.source.as_str(),
                            item.id,
                            band.as_str()
                        ),
                        level: Level::Warning,
                        title: "Support Ping".to_string(),
                        body: format!(
                            "\"{}\" milik {} masuk zona kritis ({:.0} jam). Tanyakan butuh bantuan apa.",
                            item.title, user, hours_left
                        ),
                        url: "/chat".to_string(),
                        payload: serde_json::json!({
                            "source": item.source.as_str(),
                            "item_id": item.id,
                            "risk_band": band.as_str(),
                            "target": user,
                            "hours_left": (hours_left * 10.0).round() / 10.0,
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

    fn insert_task(db: &PulseDb, title: &str, hours_from_now: i64, priority: &str, owner: &str) {
        db.conn_ref()
            .execute(
                "INSERT INTO tasks (title, priority, deadline, assigned_to) VALUES (?1, ?2, ?3, ?4)",
                params![
                    title,
                    priority,
                    sql_ts(now() + chrono::Duration::hours(hours_from_now)),
                    owner
                ],
            )
            .unwrap();
    }

    #[test]
    fn test_high_band_emits_warning_event() {
        let db = test_db();
        // 10h out, high priority task: 56 + 14 = 70 -> high
        insert_task(&db, "Proposal", 10, "high", "Zaldy");

        let candidates = run(&db);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].event_type, "risk_radar_high");
        assert_eq!(candidates[0].level, Level::Warning);
        assert_eq!(candidates[0].payload["risk_score"], 70);
        assert_eq!(candidates[0].event_key, "task-1-high");
    }

    #[test]
    fn test_critical_assignment_pings_partner() {
        let db = test_db();
        // 4h out assignment: inside radar window only if > 90min. base 70 +6 kind
        // +6 medium default = 82 -> critical
        db.conn_ref()
            .execute(
                "INSERT INTO assignments (title, deadline, assigned_to) VALUES ('Paper', ?1, 'Nesya')",
                params![sql_ts(now() + chrono::Duration::hours(4))],
            )
            .unwrap();

        let candidates = run(&db);
        assert_eq!(candidates.len(), 2);
        let radar = candidates
            .iter()
            .find(|c| c.event_type == "risk_radar_critical")
            .unwrap();
        assert_eq!(radar.user, "Nesya");
        let ping = candidates
            .iter()
            .find(|c| c.event_type == "risk_support_ping")
            .unwrap();
        assert_eq!(ping.user, "Zaldy");
        assert_eq!(ping.event_key, "assignment-1-critical-partner");
    }

    #[test]
    fn test_low_and_medium_bands_are_silent() {
        let db = test_db();
        // 60h out, low priority: 18 + 0 = 18 low
        insert_task(&db, "Someday", 60, "low", "Zaldy");
        // 30h out, medium: 30 + 6 = 36 medium
        insert_task(&db, "Soonish", 30, "medium", "Zaldy");

        assert!(run(&db).is_empty());
    }

    #[test]
    fn test_emission_capped_at_two_best_per_user() {
        let db = test_db();
        insert_task(&db, "a", 4, "high", "Zaldy"); // 70+14=84 critical
        insert_task(&db, "b", 10, "high", "Zaldy"); // 56+14=70 high
        insert_task(&db, "c", 20, "high", "Zaldy"); // 42+14=56 high

        let candidates = run(&db);
        let own: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| c.user == "Zaldy" && c.event_type.starts_with("risk_radar"))
            .collect();
        assert_eq!(own.len(), 2);
        // Best first
        assert_eq!(own[0].payload["risk_score"], 84);
        assert_eq!(own[1].payload["risk_score"], 70);
    }

    #[test]
    fn test_items_inside_urgent_window_are_left_to_urgent_radar() {
        let db = test_db();
        db.conn_ref()
            .execute(
                "INSERT INTO tasks (title, priority, deadline, assigned_to) VALUES ('Now', 'high', ?1, 'Zaldy')",
                params![sql_ts(now() + chrono::Duration::minutes(30))],
            )
            .unwrap();
        assert!(run(&db).is_empty());
    }
}
