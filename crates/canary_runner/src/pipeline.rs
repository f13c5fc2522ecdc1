//! Pipeline controller
//!
//! One verification cycle:
//! 1. Provision the software under test
//! 2. Wait for the external registry to settle
//! 3. Extract the installation state
//! 4. Verify the expected credential is present
//! 5. Notify operators on anything but a pass
//! 6. Uninstall, on every path, exactly once
//!
//! A cycle never retries; the external scheduler runs the next one.

use crate::diagnostics::{self, ErrorReport};
use crate::logging::ctime_now;
use crate::notify::Notifier;
use crate::provision::Provisioner;
use canary_common::{
    find_match, CanaryConfig, CycleError, InstallationState, Integer, StateExtractor,
};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info, warn};

/// How a cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    Passed,
    FailedNoCredential,
    FailedError,
}

impl CycleOutcome {
    /// Process exit status for scheduler-level alerting
    pub fn exit_code(&self) -> i32 {
        match self {
            CycleOutcome::Passed => 0,
            CycleOutcome::FailedNoCredential => 2,
            CycleOutcome::FailedError => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CycleOutcome::Passed => "passed",
            CycleOutcome::FailedNoCredential => "failed: credential not found",
            CycleOutcome::FailedError => "failed: error",
        }
    }
}

/// Controller states, in the order a cycle visits them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    Idle,
    Provisioning,
    Settling,
    Extracting,
    Verifying,
    Passed,
    FailedNoCredential,
    FailedError,
    Cleaning,
    Terminal,
}

/// What happened to the failure notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "error")]
pub enum NotificationStatus {
    NotSent,
    Delivered,
    Failed(String),
}

/// What happened during cleanup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "error")]
pub enum CleanupStatus {
    Clean,
    Failed(String),
}

/// Record of one cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub phases: Vec<CyclePhase>,
    pub notification: NotificationStatus,
    pub cleanup: CleanupStatus,
    /// Unit that carried the expected credential, on a pass
    pub matched_unit: Option<String>,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

/// The settle wait
pub trait Settle {
    fn settle(&self, duration: Duration);
}

/// Blocks the whole process for the settle duration
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockingSettle;

impl Settle for BlockingSettle {
    fn settle(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Result of the provision/extract/verify stretch, before escalation
enum Verdict {
    Passed { unit: String },
    Missing { state: InstallationState },
    Failed {
        error: CycleError,
        state: Option<InstallationState>,
    },
}

/// Sequences one cycle over its collaborators
pub struct Pipeline<'a> {
    expected: &'a Integer,
    settle_for: Duration,
    subject: String,
    provisioner: &'a dyn Provisioner,
    extractor: &'a dyn StateExtractor,
    notifier: &'a dyn Notifier,
    settle: &'a dyn Settle,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a CanaryConfig,
        subject: String,
        provisioner: &'a dyn Provisioner,
        extractor: &'a dyn StateExtractor,
        notifier: &'a dyn Notifier,
        settle: &'a dyn Settle,
    ) -> Self {
        Self {
            expected: &config.verify.expected_e,
            settle_for: config.verify.settle_duration(),
            subject,
            provisioner,
            extractor,
            notifier,
            settle,
        }
    }

    /// Override the configured settle duration
    pub fn with_settle_duration(mut self, duration: Duration) -> Self {
        self.settle_for = duration;
        self
    }

    /// Run exactly one cycle. Never panics on collaborator failure and
    /// always uninstalls before returning.
    pub fn run_cycle(&self) -> CycleReport {
        let mut run = CycleRun::new();

        let outcome = match self.advance(&mut run) {
            Verdict::Passed { unit } => {
                info!("passed: expected key found in unit '{}'", unit);
                run.matched_unit = Some(unit);
                CycleOutcome::Passed
            }
            Verdict::Missing { state } => {
                let text = diagnostics::mismatch_text(self.expected, &state);
                warn!("{}", text);
                self.escalate(&mut run, &text, None);
                CycleOutcome::FailedNoCredential
            }
            Verdict::Failed { error, state } => {
                let text = match (&error, &state) {
                    (CycleError::Provision(_), _) => diagnostics::install_failure_text(),
                    (CycleError::Decode(e), _) => diagnostics::decode_failure_text(e),
                    (CycleError::Malformed(_), Some(state)) => diagnostics::malformed_state_text(state),
                    (CycleError::Malformed(_), None) => "failed in checking for expected key".to_string(),
                };
                let report = ErrorReport::from_cycle_error(&error);
                diagnostics::log_failure(&text, &report);
                self.escalate(&mut run, &text, Some(&report));
                CycleOutcome::FailedError
            }
        };
        run.enter(match outcome {
            CycleOutcome::Passed => CyclePhase::Passed,
            CycleOutcome::FailedNoCredential => CyclePhase::FailedNoCredential,
            CycleOutcome::FailedError => CyclePhase::FailedError,
        });

        run.enter(CyclePhase::Cleaning);
        run.cleanup = match self.provisioner.uninstall() {
            Ok(()) => {
                info!("cleanup complete");
                CleanupStatus::Clean
            }
            Err(e) => {
                error!("cleanup failed: {}", e);
                CleanupStatus::Failed(e.to_string())
            }
        };
        run.enter(CyclePhase::Terminal);

        run.finish(outcome)
    }

    fn advance(&self, run: &mut CycleRun) -> Verdict {
        run.enter(CyclePhase::Provisioning);
        if let Err(e) = self.provisioner.install() {
            return Verdict::Failed {
                error: e.into(),
                state: None,
            };
        }

        run.enter(CyclePhase::Settling);
        info!("sleeping for {}s to let the registry settle", self.settle_for.as_secs());
        self.settle.settle(self.settle_for);

        run.enter(CyclePhase::Extracting);
        info!("retrieving installation state");
        let state = match self.extractor.read() {
            Ok(state) => state,
            Err(e) => {
                return Verdict::Failed {
                    error: e.into(),
                    state: None,
                }
            }
        };

        run.enter(CyclePhase::Verifying);
        info!("checking {} units for the expected key", state.len());
        let found = find_match(&state, self.expected).map(|m| m.map(|m| m.unit.to_string()));
        match found {
            Ok(Some(unit)) => Verdict::Passed { unit },
            Ok(None) => Verdict::Missing { state },
            Err(e) => Verdict::Failed {
                error: e.into(),
                state: Some(state),
            },
        }
    }

    /// Notify operators. Delivery failure is logged, never propagated.
    fn escalate(&self, run: &mut CycleRun, text: &str, report: Option<&ErrorReport>) {
        let body = diagnostics::failure_body(&ctime_now(), text, report);
        run.notification = match self.notifier.notify(&self.subject, &body) {
            Ok(()) => NotificationStatus::Delivered,
            Err(e) => {
                error!("notification failed: {}", e);
                NotificationStatus::Failed(e.to_string())
            }
        };
    }
}

/// Mutable bookkeeping for one cycle
struct CycleRun {
    phases: Vec<CyclePhase>,
    notification: NotificationStatus,
    cleanup: CleanupStatus,
    matched_unit: Option<String>,
    started_at: DateTime<Local>,
}

impl CycleRun {
    fn new() -> Self {
        Self {
            phases: vec![CyclePhase::Idle],
            notification: NotificationStatus::NotSent,
            cleanup: CleanupStatus::Clean,
            matched_unit: None,
            started_at: Local::now(),
        }
    }

    fn enter(&mut self, phase: CyclePhase) {
        if let Some(previous) = self.phases.last() {
            info!("cycle phase: {:?} -> {:?}", previous, phase);
        }
        self.phases.push(phase);
    }

    fn finish(self, outcome: CycleOutcome) -> CycleReport {
        CycleReport {
            outcome,
            phases: self.phases,
            notification: self.notification,
            cleanup: self.cleanup,
            matched_unit: self.matched_unit,
            started_at: self.started_at,
            finished_at: Local::now(),
        }
    }
}
