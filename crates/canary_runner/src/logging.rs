//! Diagnostic logger setup
//!
//! Every log line and every notification body carries a ctime-style
//! timestamp (`Thu Oct 15 20:20:00 2026`), the format operators already
//! grep cron logs for.

use chrono::{DateTime, Local};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::EnvFilter;

const CTIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Format a timestamp the way ctime(3) does
pub fn ctime(at: &DateTime<Local>) -> String {
    at.format(CTIME_FORMAT).to_string()
}

pub fn ctime_now() -> String {
    ctime(&Local::now())
}

/// Timer for the fmt layer
#[derive(Debug, Clone, Copy, Default)]
pub struct CtimeTimer;

impl FormatTime for CtimeTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{} :", ctime_now())
    }
}

/// Initialize the global subscriber. `RUST_LOG` overrides `level`.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // A second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(CtimeTimer)
        .with_target(false)
        .try_init();
}
