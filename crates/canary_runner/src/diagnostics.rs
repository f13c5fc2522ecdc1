//! Operator diagnostics
//!
//! Builds the text that goes into the log and into failure notifications:
//! a timestamped description, an error report with a bounded cause trace,
//! and the decoded state when there is one.

use canary_common::{CycleError, DecodeError, InstallationState, Integer};
use std::error::Error;
use std::fmt;
use tracing::error;

/// Causes listed in a report before the rest are summarized
pub const MAX_TRACE_DEPTH: usize = 6;

const SEPARATOR_WIDTH: usize = 60;

/// Error kind, description and the cause chain below it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub kind: String,
    pub description: String,
    pub trace: Vec<String>,
    pub omitted: usize,
}

impl ErrorReport {
    pub fn new(kind: &str, err: &(dyn Error + 'static)) -> Self {
        let mut trace = Vec::new();
        let mut omitted = 0;
        let mut cause = err.source();
        while let Some(current) = cause {
            if trace.len() < MAX_TRACE_DEPTH {
                trace.push(current.to_string());
            } else {
                omitted += 1;
            }
            cause = current.source();
        }
        Self {
            kind: kind.to_string(),
            description: err.to_string(),
            trace,
            omitted,
        }
    }

    pub fn from_cycle_error(err: &CycleError) -> Self {
        Self::new(err.kind(), err)
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error: {}\nDescription: {}\nTraceback:", self.kind, self.description)?;
        for (depth, cause) in self.trace.iter().enumerate() {
            write!(f, "\n  {}: {}", depth, cause)?;
        }
        if self.omitted > 0 {
            write!(f, "\n  ... {} more", self.omitted)?;
        }
        Ok(())
    }
}

/// Full notification body
pub fn failure_body(timestamp: &str, text: &str, report: Option<&ErrorReport>) -> String {
    let mut body = format!("[{}] {}\n", timestamp, text);
    if let Some(report) = report {
        body.push('\n');
        body.push_str(&report.to_string());
        body.push('\n');
    }
    body
}

/// Log a fatal diagnostic, framed so it stands out in cron output
pub fn log_failure(text: &str, report: &ErrorReport) {
    error!("Exception: {}", text);
    error!("{}", "-".repeat(SEPARATOR_WIDTH));
    for line in report.to_string().lines() {
        error!("{}", line);
    }
    error!("{}", "-".repeat(SEPARATOR_WIDTH));
}

pub fn install_failure_text() -> String {
    "failed to download/install the software under test".to_string()
}

pub fn decode_failure_text(err: &DecodeError) -> String {
    let mut text = "failed to open/read/decode state file".to_string();
    if let Some(content) = err.raw_content() {
        text.push_str("\n\nstate file content was: ");
        text.push_str(content);
    }
    text
}

pub fn malformed_state_text(state: &InstallationState) -> String {
    format!(
        "failed in checking for expected key\n\nstate is: {}",
        state
    )
}

pub fn mismatch_text(expected: &Integer, state: &InstallationState) -> String {
    format!(
        "check for expected key:\n{}..\n\nfailed\n\nstate is: {}",
        expected, state
    )
}
