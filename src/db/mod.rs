//! SQLite-backed state for the proactive engine.
//!
//! The database lives at `~/.novapulse/novapulse.db`. Input tables (tasks,
//! assignments, schedule, evaluations, chat, push subscriptions) are owned by
//! the workspace app and read here; the engine owns `proactive_events` and
//! `user_activity_events`. The unique index on proactive_events plus the
//! append-only activity log are the only synchronization primitives relied on
//! for overlapping pass safety.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Connection;
use thiserror::Error;

pub mod activity;
pub mod capability;
pub mod events;
pub mod items;

pub use activity::ActivityEvent;
pub use capability::{OwnershipStrategy, SchemaCaps};
pub use events::ProactiveEvent;
pub use items::{ItemSource, WorkItem};

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Timestamp format used across every engine-owned column and deadline
/// comparison. Plain `datetime` text keeps string comparison and SQLite's
/// own `datetime()` output mutually orderable.
const SQL_TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Render a UTC instant in storage format.
pub fn sql_ts(dt: DateTime<Utc>) -> String {
    dt.format(SQL_TS_FORMAT).to_string()
}

/// Parse a storage-format timestamp back into a UTC instant.
pub fn parse_sql_ts(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw.trim(), SQL_TS_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// SQLite connection wrapper.
///
/// Intentionally not `Clone` or `Sync`: one pass owns one connection. The
/// unique-constraint semantics, not application locks, make concurrent
/// invocations safe.
pub struct PulseDb {
    conn: Connection,
}

impl PulseDb {
    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Open (or create) the database at `~/.novapulse/novapulse.db` and apply
    /// pending migrations.
    pub fn open() -> Result<Self, DbError> {
        let path = Self::db_path()?;
        Self::open_at(path)
    }

    /// Open a database at an explicit path. Useful for testing.
    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;

        // WAL for better concurrent read behavior under overlapping passes
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;

        Ok(Self { conn })
    }

    /// Resolve the default database path: `~/.novapulse/novapulse.db`.
    fn db_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".novapulse").join("novapulse.db"))
    }

    /// Discover every user the engine should process: the configured couple
    /// pair plus any distinct owner the capability set lets us see.
    pub fn discover_users(
        &self,
        caps: &SchemaCaps,
        seed_users: &[String],
    ) -> Result<Vec<String>, DbError> {
        let mut users: Vec<String> = seed_users.to_vec();

        let mut queries: Vec<&str> = Vec::new();
        if caps.push_subs_user {
            queries.push("SELECT DISTINCT user_id FROM push_subscriptions WHERE user_id IS NOT NULL");
        }
        if caps.tasks_assigned_to {
            queries.push("SELECT DISTINCT assigned_to FROM tasks WHERE assigned_to IS NOT NULL");
        }
        if caps.tasks_completed_by {
            queries.push("SELECT DISTINCT completed_by FROM tasks WHERE completed_by IS NOT NULL");
        }
        if caps.assignments_assigned_to {
            queries.push("SELECT DISTINCT assigned_to FROM assignments WHERE assigned_to IS NOT NULL");
        }
        if caps.evaluations_user {
            queries.push("SELECT DISTINCT user_id FROM evaluations WHERE user_id IS NOT NULL");
        }
        if caps.chat_messages_user {
            queries.push(
                "SELECT DISTINCT user_id FROM chat_messages
                 WHERE user_id IS NOT NULL AND user_id <> 'System'",
            );
        }

        for sql in queries {
            let mut stmt = self.conn.prepare(sql)?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            for row in rows {
                let user = row?.trim().to_string();
                if !user.is_empty() && !users.iter().any(|u| u == &user) {
                    users.push(user);
                }
            }
        }

        Ok(users)
    }
}

pub mod test_utils {
    use super::PulseDb;

    /// Create a temporary database for testing.
    ///
    /// We leak the `TempDir` so the directory persists for the duration of the
    /// test. Test temp dirs are cleaned up by the OS.
    pub fn test_db() -> PulseDb {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("test.db");
        std::mem::forget(dir);
        PulseDb::open_at(path).expect("Failed to open test database")
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::test_utils::test_db;
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sql_ts_round_trip() {
        let dt = Utc.with_ymd_and_hms(2026, 8, 5, 13, 45, 9).unwrap();
        let text = sql_ts(dt);
        assert_eq!(text, "2026-08-05 13:45:09");
        assert_eq!(parse_sql_ts(&text), Some(dt));
    }

    #[test]
    fn test_parse_sql_ts_rejects_garbage() {
        assert!(parse_sql_ts("not-a-time").is_none());
        assert!(parse_sql_ts("").is_none());
    }

    #[test]
    fn test_discover_users_unions_sources() {
        let db = test_db();
        let caps = SchemaCaps::probe(db.conn_ref());
        db.conn_ref()
            .execute(
                "INSERT INTO tasks (title, assigned_to) VALUES ('x', 'Third')",
                [],
            )
            .unwrap();

        let seed = vec!["Zaldy".to_string(), "Nesya".to_string()];
        let users = db.discover_users(&caps, &seed).unwrap();
        assert!(users.contains(&"Zaldy".to_string()));
        assert!(users.contains(&"Nesya".to_string()));
        assert!(users.contains(&"Third".to_string()));
    }

    #[test]
    fn test_discover_users_skips_system_chat_user() {
        let db = test_db();
        let caps = SchemaCaps::probe(db.conn_ref());
        db.conn_ref()
            .execute(
                "INSERT INTO chat_messages (user_id, content) VALUES ('System', 'boot')",
                [],
            )
            .unwrap();

        let users = db.discover_users(&caps, &[]).unwrap();
        assert!(users.is_empty());
    }
}
