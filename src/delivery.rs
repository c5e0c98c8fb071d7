//! Push delivery adapter.
//!
//! The actual wire transport is an external capability behind the
//! `PushTransport` trait. The adapter fans one message out over a user's
//! subscriptions: a permanent failure (gone/expired endpoint) removes the
//! subscription, a transient one is logged and left for the next pass;
//! no in-pass retry.

use rusqlite::params;
use serde::Serialize;
use thiserror::Error;

use crate::db::{DbError, PulseDb};

/// One tappable button on a delivered notification.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushAction {
    pub action: String,
    pub title: String,
}

impl PushAction {
    pub fn new(action: &str, title: &str) -> Self {
        Self {
            action: action.to_string(),
            title: title.to_string(),
        }
    }
}

/// The payload handed to the transport, serialized as-is.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub url: String,
    pub tag: String,
    pub actions: Vec<PushAction>,
    pub data: serde_json::Value,
}

/// Transport failure classification drives subscription cleanup.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Endpoint is gone or rejected the subscription: drop it.
    #[error("permanent delivery failure: {0}")]
    Permanent(String),
    /// Anything else: leave the subscription alone, a later pass may succeed.
    #[error("transient delivery failure: {0}")]
    Transient(String),
}

/// External push capability.
pub trait PushTransport {
    fn send(&self, endpoint: &str, keys_json: &str, payload: &str) -> Result<(), DeliveryError>;
}

/// Transport that logs instead of sending. Default wiring for local runs
/// and dry environments without push credentials.
pub struct LogTransport;

impl PushTransport for LogTransport {
    fn send(&self, endpoint: &str, _keys_json: &str, payload: &str) -> Result<(), DeliveryError> {
        log::info!("push (log transport) -> {}: {}", endpoint, payload);
        Ok(())
    }
}

/// Send `message` to every subscription `user` has. Returns how many
/// endpoints accepted it; dead subscriptions are deleted along the way.
pub fn deliver_to_user(
    db: &PulseDb,
    transport: &dyn PushTransport,
    user: &str,
    message: &PushMessage,
) -> Result<usize, DbError> {
    let payload = serde_json::to_string(message).unwrap_or_else(|_| "{}".to_string());

    let mut stmt = db.conn_ref().prepare(
        "SELECT id, endpoint, keys_json FROM push_subscriptions WHERE user_id = ?1",
    )?;
    let subs = stmt
        .query_map(params![user], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut delivered = 0usize;
    for (sub_id, endpoint, keys_json) in subs {
        match transport.send(&endpoint, &keys_json, &payload) {
            Ok(()) => delivered += 1,
            Err(DeliveryError::Permanent(reason)) => {
                log::warn!(
                    "Removing dead push subscription {} for {}: {}",
                    sub_id,
                    user,
                    reason
                );
                db.conn_ref().execute(
                    "DELETE FROM push_subscriptions WHERE id = ?1",
                    params![sub_id],
                )?;
            }
            Err(DeliveryError::Transient(reason)) => {
                log::warn!("Push to {} failed (transient): {}", user, reason);
            }
        }
    }

    Ok(delivered)
}

// =============================================================================
// Tests
// =============================================================================
