//! Schema capability probe.
//!
//! Ownership columns vary by deployment (older installs track only
//! `created_by`, newer ones `assigned_to`, some both). Rather than re-probing
//! ad hoc per query, the orchestrator resolves a capability set once per pass
//! and collectors build their ownership predicates from it.

use rusqlite::Connection;

/// How rows of a table are attributed to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipStrategy {
    /// Only `assigned_to` exists.
    AssignedOnly,
    /// Only `created_by` exists.
    CreatedOnly,
    /// Both columns exist; a row belongs to a user matching either.
    Either,
    /// No ownership column: nobody owns the row, treat it as shared.
    Broadcast,
}

impl OwnershipStrategy {
    /// SQL predicate scoping rows to the user bound at `?1`.
    ///
    /// `Broadcast` matches every row for any non-null user (it still consumes
    /// the `?1` binding); callers decide whether shared rows should reach
    /// every known user or be skipped (per-collector choice).
    pub fn clause(self) -> &'static str {
        match self {
            OwnershipStrategy::AssignedOnly => "assigned_to = ?1",
            OwnershipStrategy::CreatedOnly => "created_by = ?1",
            OwnershipStrategy::Either => "(assigned_to = ?1 OR created_by = ?1)",
            OwnershipStrategy::Broadcast => "?1 IS NOT NULL",
        }
    }

    /// The single column naming a row's owner, when one exists.
    pub fn owner_column(self) -> Option<&'static str> {
        match self {
            OwnershipStrategy::AssignedOnly | OwnershipStrategy::Either => Some("assigned_to"),
            OwnershipStrategy::CreatedOnly => Some("created_by"),
            OwnershipStrategy::Broadcast => None,
        }
    }
}

/// Which optional columns the surrounding store actually has.
///
/// Resolved once per pass. Probe failures degrade to the broadcast/absent
/// case instead of aborting; a missing table must never crash the pass.
#[derive(Debug, Clone)]
pub struct SchemaCaps {
    pub push_subs_user: bool,
    pub tasks_assigned_to: bool,
    pub tasks_created_by: bool,
    pub tasks_completed_by: bool,
    pub assignments_assigned_to: bool,
    pub evaluations_user: bool,
    pub chat_messages_user: bool,
}

impl SchemaCaps {
    pub fn probe(conn: &Connection) -> Self {
        Self {
            push_subs_user: has_column(conn, "push_subscriptions", "user_id"),
            tasks_assigned_to: has_column(conn, "tasks", "assigned_to"),
            tasks_created_by: has_column(conn, "tasks", "created_by"),
            tasks_completed_by: has_column(conn, "tasks", "completed_by"),
            assignments_assigned_to: has_column(conn, "assignments", "assigned_to"),
            evaluations_user: has_column(conn, "evaluations", "user_id"),
            chat_messages_user: has_column(conn, "chat_messages", "user_id"),
        }
    }

    pub fn task_ownership(&self) -> OwnershipStrategy {
        match (self.tasks_assigned_to, self.tasks_created_by) {
            (true, true) => OwnershipStrategy::Either,
            (true, false) => OwnershipStrategy::AssignedOnly,
            (false, true) => OwnershipStrategy::CreatedOnly,
            (false, false) => OwnershipStrategy::Broadcast,
        }
    }

    pub fn assignment_ownership(&self) -> OwnershipStrategy {
        if self.assignments_assigned_to {
            OwnershipStrategy::AssignedOnly
        } else {
            OwnershipStrategy::Broadcast
        }
    }
}

/// Check whether `table` has `column`. Any error (missing table included)
/// reads as "column absent".
fn has_column(conn: &Connection, table: &str, column: &str) -> bool {
    conn.query_row(
        "SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2",
        rusqlite::params![table, column],
        |_| Ok(()),
    )
    .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_db;

    #[test]
    fn test_probe_full_schema() {
        let db = test_db();
        let caps = SchemaCaps::probe(db.conn_ref());
        assert!(caps.tasks_assigned_to);
        assert!(caps.tasks_created_by);
        assert!(caps.assignments_assigned_to);
        assert_eq!(caps.task_ownership(), OwnershipStrategy::Either);
        assert_eq!(
            caps.assignment_ownership(),
            OwnershipStrategy::AssignedOnly
        );
    }

    #[test]
    fn test_probe_missing_table_degrades_to_broadcast() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let caps = SchemaCaps::probe(&conn);
        assert!(!caps.tasks_assigned_to);
        assert_eq!(caps.task_ownership(), OwnershipStrategy::Broadcast);
        assert_eq!(caps.assignment_ownership(), OwnershipStrategy::Broadcast);
    }

    #[test]
    fn test_probe_reduced_task_schema() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE tasks (id INTEGER PRIMARY KEY, title TEXT, created_by TEXT);")
            .unwrap();
        let caps = SchemaCaps::probe(&conn);
        assert_eq!(caps.task_ownership(), OwnershipStrategy::CreatedOnly);
        assert_eq!(caps.task_ownership().owner_column(), Some("created_by"));
    }

    #[test]
    fn test_ownership_clause_shapes() {
        assert_eq!(OwnershipStrategy::AssignedOnly.clause(), "assigned_to = ?1");
        assert_eq!(
            OwnershipStrategy::Either.clause(),
            "(assigned_to = ?1 OR created_by = ?1)"
        );
        assert_eq!(OwnershipStrategy::Broadcast.clause(), "?1 IS NOT NULL");
        assert_eq!(OwnershipStrategy::Broadcast.owner_column(), None);
    }
}
