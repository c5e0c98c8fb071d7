//! Append-only activity log.
//!
//! Everything the admission policy knows (daily counts, duplicates,
//! cooldowns, fatigue) is derived from this table. The engine appends
//! `push_sent`/`push_ignored` with the policy trace in `payload`; the
//! workspace app appends engagement (`push_opened`, `push_action_*`) and
//! ordinary UI events. Rows are never updated or deleted here.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::Serialize;
use uuid::Uuid;

use super::{sql_ts, DbError, PulseDb};

/// Engagement event names that reset the fatigue counter.
pub const ENGAGEMENT_EVENTS: [&str; 4] = [
    "push_opened",
    "push_action_start",
    "push_action_snooze",
    "push_action_done",
];

/// A row from the `user_activity_events` table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    pub id: String,
    pub user_id: String,
    pub event_name: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub source: String,
    pub payload: serde_json::Value,
    pub server_ts: String,
}

/// An item the user started but has not finished nor been nudged about.
#[derive(Debug, Clone)]
pub struct DriftCandidate {
    pub entity_type: String,
    pub entity_id: String,
    pub started_at: String,
}

impl PulseDb {
    /// Append one activity entry stamped at the pass clock.
    pub fn append_activity(
        &self,
        user: &str,
        event_name: &str,
        entity_type: Option<&str>,
        entity_id: Option<&str>,
        payload: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let id = format!("ua-{}", Uuid::new_v4());
        self.conn_ref().execute(
            "INSERT INTO user_activity_events
                (id, user_id, event_name, entity_type, entity_id, source, payload, server_ts)
             VALUES (?1, ?2, ?3, ?4, ?5, 'push-engine', ?6, ?7)",
            params![
                id,
                user,
                event_name,
                entity_type,
                entity_id,
                payload.to_string(),
                sql_ts(now),
            ],
        )?;
        Ok(())
    }

    /// Latest activity entries for one user, newest first. Debugging view:
    /// suppressed attempts (`push_ignored`) show up here with their reason.
    pub fn recent_activity_for_user(
        &self,
        user: &str,
        limit: usize,
    ) -> Result<Vec<ActivityEvent>, DbError> {
        let limit = limit.clamp(1, 300) as i64;
        let mut stmt = self.conn_ref().prepare(
            "SELECT id, user_id, event_name, entity_type, entity_id, source, payload, server_ts
             FROM user_activity_events
             WHERE user_id = ?1
             ORDER BY server_ts DESC, id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user, limit], |row| {
            let payload_raw: String = row.get(6)?;
            Ok(ActivityEvent {
                id: row.get(0)?,
                user_id: row.get(1)?,
                event_name: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                source: row.get(5)?,
                payload: serde_json::from_str(&payload_raw)
                    .unwrap_or(serde_json::Value::Object(Default::default())),
                server_ts: row.get(7)?,
            })
        })?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    /// Count `push_sent` entries for the user since `cutoff`.
    pub fn push_sent_count_since(
        &self,
        user: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<i64, DbError> {
        let count = self.conn_ref().query_row(
            "SELECT COUNT(*) FROM user_activity_events
             WHERE user_id = ?1 AND event_name = 'push_sent' AND server_ts >= ?2",
            params![user, sql_ts(cutoff)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Was a push with this dedup key already sent since `cutoff`?
    pub fn has_push_sent_with_dedup(
        &self,
        user: &str,
        dedup_key: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let hit = self
            .conn_ref()
            .query_row(
                "SELECT 1 FROM user_activity_events
                 WHERE user_id = ?1
                   AND event_name = 'push_sent'
                   AND json_extract(payload, '$.dedup_key') = ?2
                   AND server_ts >= ?3
                 LIMIT 1",
                params![user, dedup_key, sql_ts(cutoff)],
                |_| Ok(()),
            )
            .is_ok();
        Ok(hit)
    }

    /// Was a push of this family sent since `cutoff`?
    pub fn has_push_sent_in_family(
        &self,
        user: &str,
        family: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let hit = self
            .conn_ref()
            .query_row(
                "SELECT 1 FROM user_activity_events
                 WHERE user_id = ?1
                   AND event_name = 'push_sent'
                   AND json_extract(payload, '$.event_family') = ?2
                   AND server_ts >= ?3
                 LIMIT 1",
                params![user, family, sql_ts(cutoff)],
                |_| Ok(()),
            )
            .is_ok();
        Ok(hit)
    }

    /// Most recent push interaction names (sends and engagements), newest
    /// first, bounded to the trailing 24h and `limit` rows. Input to the
    /// fatigue counter.
    pub fn recent_push_interactions(
        &self,
        user: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<String>, DbError> {
        let cutoff = now - chrono::Duration::hours(24);
        let mut stmt = self.conn_ref().prepare(
            "SELECT event_name FROM user_activity_events
             WHERE user_id = ?1
               AND event_name IN ('push_sent', 'push_opened', 'push_action_start',
                                  'push_action_snooze', 'push_action_done')
               AND server_ts >= ?2
             ORDER BY server_ts DESC, id DESC
             LIMIT ?3",
            )?;

        let rows = stmt.query_map(params![user, sql_ts(cutoff), limit as i64], |row| {
            row.get::<_, String>(0)
        })?;

        let mut names = Vec::new();
        for row in rows {
            names.push(row?);
        }
        Ok(names)
    }

    /// Items the user marked started 40 minutes to 6 hours ago with no
    /// subsequent done and no execution followup pushed in the last 2 hours.
    pub fn drift_candidates(
        &self,
        user: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<DriftCandidate>, DbError> {
        let oldest = sql_ts(now - chrono::Duration::hours(6));
        let newest = sql_ts(now - chrono::Duration::minutes(40));
        let followup_cutoff = sql_ts(now - chrono::Duration::hours(2));

        let mut stmt = self.conn_ref().prepare(
            "SELECT COALESCE(entity_type, 'task'), entity_id, MAX(server_ts)
             FROM user_activity_events
             WHERE user_id = ?1
               AND event_name = 'push_action_start'
               AND entity_id IS NOT NULL
               AND server_ts >= ?2
               AND server_ts <= ?3
             GROUP BY entity_type, entity_id",
        )?;

        let starts = stmt
            .query_map(params![user, oldest, newest], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut candidates = Vec::new();
        for (entity_type, entity_id, started_at) in starts {
            let done_after: bool = self
                .conn_ref()
                .query_row(
                    "SELECT 1 FROM user_activity_events
                     WHERE user_id = ?1
                       AND event_name = 'push_action_done'
                       AND entity_id = ?2
                       AND server_ts >= ?3
                     LIMIT 1",
                    params![user, entity_id, started_at],
                    |_| Ok(()),
                )
                .is_ok();
            if done_after {
                continue;
            }

            let recent_followup: bool = self
                .conn_ref()
                .query_row(
                    "SELECT 1 FROM user_activity_events
                     WHERE user_id = ?1
                       AND event_name = 'push_sent'
                       AND entity_id = ?2
                       AND json_extract(payload, '$.event_family') = 'execution_followup'
                       AND server_ts >= ?3
                     LIMIT 1",
                    params![user, entity_id, followup_cutoff],
                    |_| Ok(()),
                )
                .is_ok();
            if recent_followup {
                continue;
            }

            candidates.push(DriftCandidate {
                entity_type,
                entity_id,
                started_at,
            });
        }

        Ok(candidates)
    }

    /// How often the user snoozed this entity since `cutoff`.
    pub fn snooze_count_since(
        &self,
        user: &str,
        entity_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<i64, DbError> {
        let count = self.conn_ref().query_row(
            "SELECT COUNT(*) FROM user_activity_events
             WHERE user_id = ?1
               AND event_name = 'push_action_snooze'
               AND entity_id = ?2
               AND server_ts >= ?3",
            params![user, entity_id, sql_ts(cutoff)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Raw UI activity volume (everything that is not a push_* entry) since
    /// `cutoff`. Feeds the load index as an "is the user around" damper.
    pub fn ui_activity_count_since(
        &self,
        user: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<i64, DbError> {
        let count = self.conn_ref().query_row(
            "SELECT COUNT(*) FROM user_activity_events
             WHERE user_id = ?1
               AND event_name NOT LIKE 'push\\_%' ESCAPE '\\'
               AND server_ts >= ?2",
            params![user, sql_ts(cutoff)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Count `push_ignored` entries since `cutoff`. Suppressed attempts are
    /// load signal even though they never reached the user.
    pub fn push_ignored_count_since(
        &self,
        user: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<i64, DbError> {
        let count = self.conn_ref().query_row(
            "SELECT COUNT(*) FROM user_activity_events
             WHERE user_id = ?1 AND event_name = 'push_ignored' AND server_ts >= ?2",
            params![user, sql_ts(cutoff)],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

// =============================================================================
// Tests
// =============================================================================
