//! The orchestrator: one batch pass over every active user.
//!
//! Resolve the window once, probe schema capabilities once, discover users,
//! run each collector, then for every fresh event: admission policy →
//! delivery → activity log. Invoked by an external scheduler at an
//! unspecified cadence; safe under arbitrary overlap or repetition because
//! event emission is unique-keyed and every policy input converges from the
//! append-only log.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::collectors::{default_collectors, Candidate, CollectorCtx};
use crate::config::EngineConfig;
use crate::db::{DbError, ProactiveEvent, PulseDb, SchemaCaps};
use crate::delivery::{deliver_to_user, PushMessage, PushTransport};
use crate::error::EngineError;
use crate::policy::{PolicyInput, PushPolicy};
use crate::token;
use crate::window::LocalWindow;

/// Per-collector outcome counters for one pass.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectorStats {
    /// Fresh events persisted (conflict-free inserts).
    pub generated: usize,
    /// Events that cleared the policy and were handed to the transport.
    pub delivered: usize,
    /// Events denied by the admission policy.
    pub denied: usize,
    /// Collector or per-candidate failures absorbed without aborting.
    pub errors: usize,
}

/// What one `run_pass` did.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    pub window: LocalWindow,
    pub users: Vec<String>,
    pub notify: bool,
    pub stats: BTreeMap<String, CollectorStats>,
}

enum CandidateOutcome {
    AlreadyEmitted,
    Emitted,
    Denied,
    Delivered,
}

/// Run one pass at `now`. With `notify` false the pass still collects and
/// persists events (dry-run/backfill) but skips policy, delivery and
/// activity logging entirely.
pub fn run_pass(
    db: &PulseDb,
    config: &EngineConfig,
    transport: &dyn PushTransport,
    now: DateTime<Utc>,
    notify: bool,
) -> Result<PassReport, EngineError> {
    let window = LocalWindow::resolve(now, config.tz_offset_hours);
    let caps = SchemaCaps::probe(db.conn_ref());
    let users = db.discover_users(&caps, &config.couple_users)?;
    log::info!(
        "Proactive pass at {} local {} ({} users, notify={})",
        window.hour_bucket(),
        window.local_hour,
        users.len(),
        notify
    );

    let ctx = CollectorCtx {
        window: &window,
        caps: &caps,
        config,
        users: &users,
    };
    let policy = PushPolicy::new(config);

    let mut stats = BTreeMap::new();
    for entry in default_collectors() {
        let mut counters = CollectorStats::default();

        match (entry.run)(db, &ctx) {
            Err(err) => {
                log::warn!("Collector {} failed: {}", entry.name, err);
                counters.errors += 1;
            }
            Ok(candidates) => {
                for candidate in candidates {
                    match process_candidate(db, config, &policy, transport, &window, &candidate, notify) {
                        Ok(CandidateOutcome::AlreadyEmitted) => {}
                        Ok(CandidateOutcome::Emitted) => counters.generated += 1,
                        Ok(CandidateOutcome::Denied) => {
                            counters.generated += 1;
                            counters.denied += 1;
                        }
                        Ok(CandidateOutcome::Delivered) => {
                            counters.generated += 1;
                            counters.delivered += 1;
                        }
                        Err(err) => {
                            // One bad candidate must not sink the rest of the pass.
                            log::warn!(
                                "Candidate {}/{} for {} failed: {}",
                                entry.name,
                                candidate.event_type,
                                candidate.user,
                                err
                            );
                            counters.errors += 1;
                        }
                    }
                }
            }
        }

        stats.insert(entry.name.to_string(), counters);
    }

    Ok(PassReport {
        window,
        users,
        notify,
        stats,
    })
}

fn entity_refs(payload: &serde_json::Value) -> (Option<String>, Option<String>) {
    let entity_type = payload
        .get("source")
        .or_else(|| payload.get("entity_type"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let entity_id = payload
        .get("item_id")
        .or_else(|| payload.get("entity_id"))
        .map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        });
    (entity_type, entity_id)
}

fn process_candidate(
    db: &PulseDb,
    config: &EngineConfig,
    policy: &PushPolicy,
    transport: &dyn PushTransport,
    window: &LocalWindow,
    candidate: &Candidate,
    notify: bool,
) -> Result<CandidateOutcome, DbError> {
    let event_id = match db.emit_event(
        &candidate.to_new_event(),
        &window.local_date,
        window.now_utc,
    )? {
        Some(id) => id,
        // A previous or concurrent pass already owns this condition today.
        None => return Ok(CandidateOutcome::AlreadyEmitted),
    };

    if !notify {
        return Ok(CandidateOutcome::Emitted);
    }

    let decision = policy.evaluate(
        db,
        window,
        &PolicyInput {
            user: &candidate.user,
            event_type: &candidate.event_type,
            dedup_key: None,
            payload: &candidate.payload,
        },
    )?;
    let (entity_type, entity_id) = entity_refs(&candidate.payload);

    if !decision.allowed {
        log::debug!(
            "Policy denied {} for {}: {}",
            candidate.event_type,
            candidate.user,
            decision.reason.as_str()
        );
        db.append_activity(
            &candidate.user,
            "push_ignored",
            entity_type.as_deref(),
            entity_id.as_deref(),
            &serde_json::json!({
                "reason": decision.reason.as_str(),
                "event_type": candidate.event_type,
                "event_family": decision.trace.family,
                "dedup_key": decision.trace.dedup_key,
            }),
            window.now_utc,
        )?;
        return Ok(CandidateOutcome::Denied);
    }

    let mut data = serde_json::json!({
        "url": candidate.url,
        "event_type": candidate.event_type,
    });
    if !config.action_token_secret.is_empty() {
        match token::create_action_token(
            &config.action_token_secret,
            &candidate.user,
            entity_type.as_deref().unwrap_or("general"),
            entity_id.as_deref().unwrap_or(""),
            &candidate.url,
            &decision.trace.family,
            config.action_token_ttl_secs,
            window.now_utc,
        ) {
            Ok(tok) => {
                data["action_token"] = serde_json::Value::String(tok);
            }
            Err(err) => {
                log::warn!("Action token issuance failed: {:?}", err);
            }
        }
    }

    let message = PushMessage {
        title: candidate.title.clone(),
        body: candidate.body.clone(),
        url: candidate.url.clone(),
        tag: candidate.event_type.clone(),
        actions: candidate.actions.clone(),
        data,
    };
    let delivered_count = deliver_to_user(db, transport, &candidate.user, &message)?;

    db.mark_event_delivered(&event_id, window.now_utc)?;
    db.append_activity(
        &candidate.user,
        "push_sent",
        entity_type.as_deref(),
        entity_id.as_deref(),
        &serde_json::json!({
            "event_type": candidate.event_type,
            "event_family": decision.trace.family,
            "dedup_key": decision.trace.dedup_key,
            "source_domain": decision.trace.source_domain,
            "horizon_bucket": decision.trace.horizon_bucket,
            "daily_count": decision.trace.daily_count,
            "delivered_count": delivered_count,
        }),
        window.now_utc,
    )?;

    Ok(CandidateOutcome::Delivered)
}

// ---------------------------------------------------------------------------
// Recent-activity feed
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSignals {
    pub urgent_count: i64,
}

/// The "what happened recently" view one user sees.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProactiveFeed {
    pub items: Vec<ProactiveEvent>,
    pub signals: FeedSignals,
    pub generated_at: String,
}

pub fn proactive_feed(
    db: &PulseDb,
    user: &str,
    limit: usize,
    now: DateTime<Utc>,
) -> Result<ProactiveFeed, EngineError> {
    let caps = SchemaCaps::probe(db.conn_ref());
    let items = db.recent_events_for_user(user, limit)?;
    let urgent_count = db.urgent_open_task_count(&caps, user, now + Duration::hours(2))?;

    Ok(ProactiveFeed {
        items,
        signals: FeedSignals { urgent_count },
        generated_at: crate::db::sql_ts(now),
    })
}

// =============================================================================
// Tests
// =============================================================================
