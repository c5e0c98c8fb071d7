//! Watch-mode scheduler.
//!
//! Optional long-running loop for deployments without an external cron:
//! polls once a minute, runs a pass on the configured cadence, and detects
//! sleep/wake time jumps to fire a catch-up pass immediately. Passes are
//! idempotent, so an extra run after a wake is always safe.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::db::PulseDb;
use crate::delivery::PushTransport;
use crate::engine;

/// Poll interval for the watch loop (1 minute).
const POLL_INTERVAL_SECS: u64 = 60;

/// Time jump threshold to detect sleep/wake (5 minutes).
const TIME_JUMP_THRESHOLD_SECS: i64 = 300;

/// Run passes forever at `interval_minutes` cadence.
pub async fn run_watch(
    db: &PulseDb,
    config: &EngineConfig,
    transport: &dyn PushTransport,
    interval_minutes: i64,
) {
    let interval_minutes = interval_minutes.max(1);
    let mut last_check = Utc::now();
    let mut last_pass: Option<DateTime<Utc>> = None;

    loop {
        tokio::time::sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await;

        let now = Utc::now();
        let time_jump = (now - last_check).num_seconds();
        let woke = time_jump > TIME_JUMP_THRESHOLD_SECS;
        if woke {
            log::info!(
                "Detected system wake (time jumped {} seconds), running catch-up pass",
                time_jump
            );
        }

        let due = match last_pass {
            None => true,
            Some(at) => (now - at).num_minutes() >= interval_minutes,
        };

        if due || woke {
            match engine::run_pass(db, config, transport, now, true) {
                Ok(report) => {
                    let generated: usize = report.stats.values().map(|s| s.generated).sum();
                    let delivered: usize = report.stats.values().map(|s| s.delivered).sum();
                    log::info!(
                        "Pass complete: {} events generated, {} delivered",
                        generated,
                        delivered
                    );
                }
                Err(err) => {
                    log::error!("Pass failed: {}", err);
                }
            }
            last_pass = Some(now);
        }

        last_check = now;
    }
}
