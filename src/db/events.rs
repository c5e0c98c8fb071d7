//! Proactive event store: the idempotency boundary.
//!
//! An event row is the fact that a signal fired for a user on a local day.
//! `emit` races through the unique index on `(user_id, event_type,
//! event_key, local_date)`; a conflict is the expected outcome of a repeated
//! or overlapping pass, not an error.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::Serialize;
use uuid::Uuid;

use super::{sql_ts, DbError, PulseDb};

/// A row from the `proactive_events` table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProactiveEvent {
    pub id: String,
    pub user_id: String,
    pub event_type: String,
    pub event_key: String,
    pub level: String,
    pub title: String,
    pub body: String,
    pub url: String,
    pub payload: serde_json::Value,
    pub local_date: String,
    pub delivered_push: bool,
    pub delivered_at: Option<String>,
    pub created_at: String,
}

/// A candidate produced by a collector, not yet persisted.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub user_id: String,
    pub event_type: String,
    pub event_key: String,
    pub level: String,
    pub title: String,
    pub body: String,
    pub url: String,
    pub payload: serde_json::Value,
}

impl PulseDb {
    /// Insert a candidate event. Returns the generated row id when the insert
    /// landed, `None` when the unique index absorbed a duplicate.
    pub fn emit_event(
        &self,
        event: &NewEvent,
        local_date: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, DbError> {
        let id = format!("pe-{}", Uuid::new_v4());
        let changed = self.conn_ref().execute(
            "INSERT OR IGNORE INTO proactive_events
                (id, user_id, event_type, event_key, level, title, body, url,
                 payload, local_date, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                id,
                event.user_id,
                event.event_type,
                event.event_key,
                event.level,
                event.title,
                event.body,
                event.url,
                event.payload.to_string(),
                local_date,
                sql_ts(now),
            ],
        )?;

        Ok(if changed > 0 { Some(id) } else { None })
    }

    /// Flip the delivered flag after a confirmed push.
    pub fn mark_event_delivered(&self, event_id: &str, now: DateTime<Utc>) -> Result<(), DbError> {
        self.conn_ref().execute(
            "UPDATE proactive_events
             SET delivered_push = 1, delivered_at = ?2
             WHERE id = ?1",
            params![event_id, sql_ts(now)],
        )?;
        Ok(())
    }

    /// Latest events for one user, newest first. Backs the recent-activity
    /// feed the workspace renders.
    pub fn recent_events_for_user(
        &self,
        user: &str,
        limit: usize,
    ) -> Result<Vec<ProactiveEvent>, DbError> {
        let limit = limit.clamp(1, 50) as i64;
        let mut stmt = self.conn_ref().prepare(
            "SELECT id, user_id, event_type, event_key, level, title, body, url,
                    payload, local_date, delivered_push, delivered_at, created_at
             FROM proactive_events
             WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![user, limit], |row| {
            let payload_raw: String = row.get(8)?;
            Ok(ProactiveEvent {
                id: row.get(0)?,
                user_id: row.get(1)?,
                event_type: row.get(2)?,
                event_key: row.get(3)?,
                level: row.get(4)?,
                title: row.get(5)?,
                body: row.get(6)?,
                url: row.get(7)?,
                payload: serde_json::from_str(&payload_raw)
                    .unwrap_or(serde_json::Value::Object(Default::default())),
                local_date: row.get(9)?,
                delivered_push: row.get::<_, i64>(10)? != 0,
                delivered_at: row.get(11)?,
                created_at: row.get(12)?,
            })
        })?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_db;
    use chrono::TimeZone;

    fn sample_event(user: &str, event_type: &str, event_key: &str) -> NewEvent {
        NewEvent {
            user_id: user.to_string(),
            event_type: event_type.to_string(),
            event_key: event_key.to_string(),
            level: "info".to_string(),
            title: "Test".to_string(),
            body: "Body".to_string(),
            url: "/".to_string(),
            payload: serde_json::json!({}),
        }
    }

    #[test]
    fn test_emit_is_idempotent_per_key_and_day() {
        let db = test_db();
        let now = Utc.with_ymd_and_hms(2026, 8, 5, 2, 0, 0).unwrap();
        let event = sample_event("Zaldy", "urgent_radar", "task-42-critical-2026-08-05-09");

        let first = db.emit_event(&event, "2026-08-05", now).unwrap();
        assert!(first.is_some());

        let second = db.emit_event(&event, "2026-08-05", now).unwrap();
        assert!(second.is_none(), "duplicate insert must be a no-op");

        let count: i64 = db
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM proactive_events", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_same_key_next_day_inserts() {
        let db = test_db();
        let now = Utc.with_ymd_and_hms(2026, 8, 5, 2, 0, 0).unwrap();
        let event = sample_event("Zaldy", "morning_brief", "daily-brief");

        assert!(db.emit_event(&event, "2026-08-05", now).unwrap().is_some());
        assert!(db.emit_event(&event, "2026-08-06", now).unwrap().is_some());
    }

    #[test]
    fn test_mark_delivered_flips_flag() {
        let db = test_db();
        let now = Utc.with_ymd_and_hms(2026, 8, 5, 2, 0, 0).unwrap();
        let event = sample_event("Nesya", "mood_drop_self", "Nesya-self-2026-08-05");
        let id = db.emit_event(&event, "2026-08-05", now).unwrap().unwrap();

        db.mark_event_delivered(&id, now).unwrap();

        let feed = db.recent_events_for_user("Nesya", 10).unwrap();
        assert_eq!(feed.len(), 1);
        assert!(feed[0].delivered_push);
        assert!(feed[0].delivered_at.is_some());
    }

    #[test]
    fn test_feed_is_scoped_to_user_and_limited() {
        let db = test_db();
        let now = Utc.with_ymd_and_hms(2026, 8, 5, 2, 0, 0).unwrap();
        for i in 0..5 {
            let e = sample_event("Zaldy", "urgent_radar", &format!("k{}", i));
            db.emit_event(&e, "2026-08-05", now).unwrap();
        }
        let other = sample_event("Nesya", "urgent_radar", "k0");
        db.emit_event(&other, "2026-08-05", now).unwrap();

        let feed = db.recent_events_for_user("Zaldy", 3).unwrap();
        assert_eq!(feed.len(), 3);
        assert!(feed.iter().all(|e| e.user_id == "Zaldy"));
    }
}
