//! Crate-level error type.
//!
//! Per-user and per-collector failures are logged and absorbed inside the
//! pass; `EngineError` is reserved for failures that make the pass itself
//! impossible (no database, broken migration).

use thiserror::Error;

use crate::db::DbError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Db(#[from] DbError),
}
