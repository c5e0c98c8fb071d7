//! Batch entry point.
//!
//! One-shot by default: run a single pass against the database and print the
//! pass report as JSON. `--watch` keeps a scheduler loop alive for
//! deployments without an external cron.

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;

use nova_pulse::config::EngineConfig;
use nova_pulse::db::PulseDb;
use nova_pulse::delivery::LogTransport;
use nova_pulse::{engine, scheduler};

struct Args {
    db_path: Option<PathBuf>,
    dry_run: bool,
    watch: bool,
    interval_minutes: i64,
}

fn print_usage() {
    eprintln!(
        "Usage: nova-pulse [--db PATH] [--dry-run] [--watch] [--interval MINUTES]\n\
         \n\
         Runs one proactive pass (or a watch loop) and prints the pass report.\n\
           --db PATH           database file (default ~/.novapulse/novapulse.db)\n\
           --dry-run           collect and persist events, skip policy and delivery\n\
           --watch             keep running, one pass per interval\n\
           --interval MINUTES  watch cadence (default 30)"
    );
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        db_path: None,
        dry_run: false,
        watch: false,
        interval_minutes: 30,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--db" => {
                let value = iter.next().ok_or("--db requires a path")?;
                args.db_path = Some(PathBuf::from(value));
            }
            "--dry-run" => args.dry_run = true,
            "--watch" => args.watch = true,
            "--interval" => {
                let value = iter.next().ok_or("--interval requires minutes")?;
                args.interval_minutes = value
                    .parse::<i64>()
                    .map_err(|_| format!("Invalid interval: {}", value))?;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => return Err(format!("Unknown argument: {}", other)),
        }
    }

    Ok(args)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{}", err);
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    let config = EngineConfig::load_or_default(EngineConfig::config_path().as_deref());

    let db = match &args.db_path {
        Some(path) => PulseDb::open_at(path.clone()),
        None => PulseDb::open(),
    };
    let db = match db {
        Ok(db) => db,
        Err(err) => {
            eprintln!("Failed to open database: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let transport = LogTransport;

    if args.watch {
        scheduler::run_watch(&db, &config, &transport, args.interval_minutes).await;
        return ExitCode::SUCCESS;
    }

    match engine::run_pass(&db, &config, &transport, Utc::now(), !args.dry_run) {
        Ok(report) => {
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{}", json),
                Err(err) => {
                    eprintln!("Failed to serialize report: {}", err);
                    return ExitCode::FAILURE;
                }
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Pass failed: {}", err);
            ExitCode::FAILURE
        }
    }
}
