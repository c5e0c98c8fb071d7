//! Read-only queries over the workspace's task, assignment, schedule, mood
//! and chat tables. Collectors never write to these; all deadline math runs
//! against the pass clock handed in by the orchestrator.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::Serialize;

use super::capability::{OwnershipStrategy, SchemaCaps};
use super::{parse_sql_ts, sql_ts, DbError, PulseDb};

/// Which table a work item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemSource {
    Task,
    Assignment,
}

impl ItemSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemSource::Task => "task",
            ItemSource::Assignment => "assignment",
        }
    }

    /// Route the workspace opens when the user taps through.
    pub fn url(self) -> &'static str {
        match self {
            ItemSource::Task => "/daily-tasks",
            ItemSource::Assignment => "/college-assignments",
        }
    }
}

/// An open task or assignment as the collectors see it.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub source: ItemSource,
    pub id: i64,
    pub title: String,
    pub deadline: Option<DateTime<Utc>>,
    pub priority: String,
    pub owner: Option<String>,
}

impl WorkItem {
    pub fn minutes_left(&self, now: DateTime<Utc>) -> Option<i64> {
        self.deadline.map(|d| (d - now).num_seconds() / 60)
    }

    pub fn hours_left(&self, now: DateTime<Utc>) -> Option<f64> {
        self.deadline
            .map(|d| (d - now).num_seconds() as f64 / 3600.0)
    }
}

/// A class slot from the `schedule` table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub subject: String,
    pub time_start: String,
    pub time_end: Option<String>,
    pub room: Option<String>,
}

/// Assignment predicate mirroring the workspace convention: an assignment
/// without an assignee is everyone's problem.
fn assignment_clause(caps: &SchemaCaps) -> &'static str {
    if caps.assignments_assigned_to {
        "(assigned_to = ?1 OR assigned_to IS NULL)"
    } else {
        "?1 IS NOT NULL"
    }
}

impl PulseDb {
    /// Every open, owned item with a deadline inside `[from, to]`, across
    /// tasks and assignments. Owner is resolved through the capability set;
    /// unowned tasks are omitted (an ownerless task radar would spam both
    /// users), unowned assignments come back with `owner: None` for the
    /// caller to broadcast.
    pub fn items_due_between(
        &self,
        caps: &SchemaCaps,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<WorkItem>, DbError> {
        let mut items = Vec::new();
        let from_ts = sql_ts(from);
        let to_ts = sql_ts(to);

        if let Some(owner_col) = caps.task_ownership().owner_column() {
            let sql = format!(
                "SELECT id, title, deadline, priority, {owner_col}
                 FROM tasks
                 WHERE is_deleted = 0
                   AND completed = 0
                   AND {owner_col} IS NOT NULL
                   AND deadline IS NOT NULL
                   AND deadline >= ?1
                   AND deadline <= ?2"
            );
            let mut stmt = self.conn_ref().prepare(&sql)?;
            let rows = stmt.query_map(params![from_ts, to_ts], |row| {
                Ok(WorkItem {
                    source: ItemSource::Task,
                    id: row.get(0)?,
                    title: row.get(1)?,
                    deadline: row.get::<_, Option<String>>(2)?.and_then(|d| parse_sql_ts(&d)),
                    priority: row.get::<_, Option<String>>(3)?.unwrap_or_else(|| "medium".into()),
                    owner: row.get(4)?,
                })
            })?;
            for row in rows {
                items.push(row?);
            }
        }

        let assignment_sql = if caps.assignments_assigned_to {
            "SELECT id, title, deadline, assigned_to
             FROM assignments
             WHERE completed = 0
               AND deadline IS NOT NULL
               AND deadline >= ?1
               AND deadline <= ?2"
        } else {
            "SELECT id, title, deadline, NULL
             FROM assignments
             WHERE completed = 0
               AND deadline IS NOT NULL
               AND deadline >= ?1
               AND deadline <= ?2"
        };
        let mut stmt = self.conn_ref().prepare(assignment_sql)?;
        let rows = stmt.query_map(params![from_ts, to_ts], |row| {
            Ok(WorkItem {
                source: ItemSource::Assignment,
                id: row.get(0)?,
                title: row.get(1)?,
                deadline: row.get::<_, Option<String>>(2)?.and_then(|d| parse_sql_ts(&d)),
                priority: "medium".to_string(),
                owner: row.get(3)?,
            })
        })?;
        for row in rows {
            items.push(row?);
        }

        Ok(items)
    }

    /// Count of the user's open items (tasks + assignments).
    pub fn pending_count(&self, caps: &SchemaCaps, user: &str) -> Result<i64, DbError> {
        let task_sql = format!(
            "SELECT COUNT(*) FROM tasks
             WHERE is_deleted = 0 AND completed = 0 AND {}",
            caps.task_ownership().clause()
        );
        let tasks: i64 = self
            .conn_ref()
            .query_row(&task_sql, params![user], |row| row.get(0))?;

        let assignment_sql = format!(
            "SELECT COUNT(*) FROM assignments WHERE completed = 0 AND {}",
            assignment_clause(caps)
        );
        let assignments: i64 =
            self.conn_ref()
                .query_row(&assignment_sql, params![user], |row| row.get(0))?;

        Ok(tasks + assignments)
    }

    /// Count of the user's open items due inside `(now, now + horizon]`.
    pub fn due_count_within(
        &self,
        caps: &SchemaCaps,
        user: &str,
        now: DateTime<Utc>,
        horizon: chrono::Duration,
    ) -> Result<i64, DbError> {
        let from_ts = sql_ts(now);
        let to_ts = sql_ts(now + horizon);

        let task_sql = format!(
            "SELECT COUNT(*) FROM tasks
             WHERE is_deleted = 0 AND completed = 0 AND {}
               AND deadline IS NOT NULL AND deadline > ?2 AND deadline <= ?3",
            caps.task_ownership().clause()
        );
        let tasks: i64 =
            self.conn_ref()
                .query_row(&task_sql, params![user, from_ts, to_ts], |row| row.get(0))?;

        let assignment_sql = format!(
            "SELECT COUNT(*) FROM assignments
             WHERE completed = 0 AND {}
               AND deadline IS NOT NULL AND deadline > ?2 AND deadline <= ?3",
            assignment_clause(caps)
        );
        let assignments: i64 =
            self.conn_ref()
                .query_row(&assignment_sql, params![user, from_ts, to_ts], |row| {
                    row.get(0)
                })?;

        Ok(tasks + assignments)
    }

    /// Tasks the user completed inside the local-day window.
    pub fn completed_count_between(
        &self,
        caps: &SchemaCaps,
        user: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, DbError> {
        // Prefer the explicit completed_by attribution when the deployment
        // records it; fall back to plain ownership.
        let scope = if caps.tasks_completed_by {
            "completed_by = ?1"
        } else {
            caps.task_ownership().clause()
        };
        let sql = format!(
            "SELECT COUNT(*) FROM tasks
             WHERE is_deleted = 0 AND completed = 1 AND {scope}
               AND completed_at IS NOT NULL AND completed_at >= ?2 AND completed_at < ?3"
        );
        let count = self.conn_ref().query_row(
            &sql,
            params![user, sql_ts(from), sql_ts(to)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// The user's open items due strictly before `before` (or undated),
    /// soonest first. Backs the morning brief.
    pub fn open_items_for_user_before(
        &self,
        caps: &SchemaCaps,
        user: &str,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<WorkItem>, DbError> {
        let mut items = Vec::new();
        let before_ts = sql_ts(before);

        let task_sql = format!(
            "SELECT id, title, deadline, priority FROM tasks
             WHERE is_deleted = 0 AND completed = 0 AND {}
               AND (deadline IS NULL OR deadline < ?2)
             ORDER BY deadline IS NULL, deadline ASC
             LIMIT ?3",
            caps.task_ownership().clause()
        );
        let mut stmt = self.conn_ref().prepare(&task_sql)?;
        let rows = stmt.query_map(params![user, before_ts, limit as i64], |row| {
            Ok(WorkItem {
                source: ItemSource::Task,
                id: row.get(0)?,
                title: row.get(1)?,
                deadline: row.get::<_, Option<String>>(2)?.and_then(|d| parse_sql_ts(&d)),
                priority: row.get::<_, Option<String>>(3)?.unwrap_or_else(|| "medium".into()),
                owner: Some(user.to_string()),
            })
        })?;
        for row in rows {
            items.push(row?);
        }

        let assignment_sql = format!(
            "SELECT id, title, deadline FROM assignments
             WHERE completed = 0 AND {}
               AND (deadline IS NULL OR deadline < ?2)
             ORDER BY deadline IS NULL, deadline ASC
             LIMIT ?3",
            assignment_clause(caps)
        );
        let mut stmt = self.conn_ref().prepare(&assignment_sql)?;
        let rows = stmt.query_map(params![user, before_ts, limit as i64], |row| {
            Ok(WorkItem {
                source: ItemSource::Assignment,
                id: row.get(0)?,
                title: row.get(1)?,
                deadline: row.get::<_, Option<String>>(2)?.and_then(|d| parse_sql_ts(&d)),
                priority: "medium".to_string(),
                owner: Some(user.to_string()),
            })
        })?;
        for row in rows {
            items.push(row?);
        }

        Ok(items)
    }

    /// The user's single nearest-deadline open item, if any.
    pub fn next_open_item(
        &self,
        caps: &SchemaCaps,
        user: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<WorkItem>, DbError> {
        let far = now + chrono::Duration::days(365);
        let mut items = self.items_due_between(caps, now - chrono::Duration::hours(24), far)?;
        items.retain(|item| match &item.owner {
            Some(owner) => owner == user,
            None => true,
        });
        // Undated items sort last, not first
        items.sort_by_key(|item| (item.deadline.is_none(), item.deadline));
        Ok(items.into_iter().next())
    }

    /// Resolve an item's title for message bodies. Unknown ids read as None.
    pub fn item_title(&self, source: &str, id: &str) -> Result<Option<String>, DbError> {
        let table = match source {
            "assignment" => "assignments",
            _ => "tasks",
        };
        let sql = format!("SELECT title FROM {table} WHERE id = ?1");
        let title = self
            .conn_ref()
            .query_row(&sql, params![id], |row| row.get::<_, String>(0))
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(title)
    }

    /// Open owned tasks due at or before `before` (overdue included). Feeds
    /// the recent-activity endpoint's urgency signal.
    pub fn urgent_open_task_count(
        &self,
        caps: &SchemaCaps,
        user: &str,
        before: DateTime<Utc>,
    ) -> Result<i64, DbError> {
        let sql = format!(
            "SELECT COUNT(*) FROM tasks
             WHERE is_deleted = 0 AND completed = 0 AND {}
               AND deadline IS NOT NULL AND deadline <= ?2",
            caps.task_ownership().clause()
        );
        let count = self
            .conn_ref()
            .query_row(&sql, params![user, sql_ts(before)], |row| row.get(0))?;
        Ok(count)
    }

    /// Today's class slots, earliest first.
    pub fn schedule_for_day(&self, day_id: u32) -> Result<Vec<ScheduleEntry>, DbError> {
        let mut stmt = self.conn_ref().prepare(
            "SELECT subject, time_start, time_end, room
             FROM schedule
             WHERE day_id = ?1
             ORDER BY time_start ASC",
        )?;
        let rows = stmt.query_map(params![day_id], |row| {
            Ok(ScheduleEntry {
                subject: row.get(0)?,
                time_start: row.get(1)?,
                time_end: row.get(2)?,
                room: row.get(3)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Average mood and sample count for one user inside `[from, to)`.
    pub fn mood_window_avg(
        &self,
        user: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<(f64, i64), DbError> {
        let row = self.conn_ref().query_row(
            "SELECT COALESCE(AVG(mood), 0.0), COUNT(*)
             FROM evaluations
             WHERE user_id = ?1 AND created_at >= ?2 AND created_at < ?3",
            params![user, sql_ts(from), sql_ts(to)],
            |row| Ok((row.get::<_, f64>(0)?, row.get::<_, i64>(1)?)),
        )?;
        Ok(row)
    }

    /// When either member of the pair last said something in chat.
    pub fn last_couple_chat_at(&self, users: &[String]) -> Result<Option<DateTime<Utc>>, DbError> {
        if users.is_empty() {
            return Ok(None);
        }
        let placeholders = users
            .iter()
            .enumerate()
            .map(|(i, _)| format!("?{}", i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT MAX(created_at) FROM chat_messages
             WHERE user_id IN ({placeholders}) AND user_id <> 'System'"
        );
        let raw: Option<String> = self.conn_ref().query_row(
            &sql,
            rusqlite::params_from_iter(users.iter()),
            |row| row.get(0),
        )?;
        Ok(raw.and_then(|ts| parse_sql_ts(&ts)))
    }
}

// =============================================================================
// Tests
// =============================================================================
