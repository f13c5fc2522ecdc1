//! Install canary runner
//!
//! Provisions the software under test, waits for it to register, checks the
//! resulting state for the expected credential and escalates to operators
//! on any deviation. Always uninstalls before returning.

pub mod diagnostics;
pub mod host;
pub mod logging;
pub mod notify;
pub mod pipeline;
pub mod provision;

pub use notify::{MailNotifier, Notifier};
pub use pipeline::{BlockingSettle, CycleOutcome, CyclePhase, CycleReport, Pipeline, Settle};
pub use provision::{Provisioner, ShellProvisioner};
