//! Cycles against real state artifacts on disk
//!
//! Uses the file-backed extractor so the decode path is exercised exactly
//! as in production; provisioning and mail stay faked.

use canary_common::{CanaryConfig, FileStateExtractor, NotifyError, ProvisionError};
use canary_runner::{CycleOutcome, Notifier, Pipeline, Provisioner, Settle};
use std::cell::Cell;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

/// Stands in for install.sh: writes the artifact the software would write
struct ArtifactWriter<'a> {
    path: &'a Path,
    content: Option<&'a str>,
    uninstalls: Cell<usize>,
}

impl Provisioner for ArtifactWriter<'_> {
    fn install(&self) -> Result<(), ProvisionError> {
        if let Some(content) = self.content {
            fs::create_dir_all(self.path.parent().unwrap()).unwrap();
            fs::write(self.path, content).unwrap();
        }
        Ok(())
    }

    fn uninstall(&self) -> Result<(), ProvisionError> {
        self.uninstalls.set(self.uninstalls.get() + 1);
        let _ = fs::remove_file(self.path);
        Ok(())
    }
}

#[derive(Default)]
struct CountingNotifier {
    bodies: std::cell::RefCell<Vec<String>>,
}

impl Notifier for CountingNotifier {
    fn notify(&self, _subject: &str, body: &str) -> Result<(), NotifyError> {
        self.bodies.borrow_mut().push(body.to_string());
        Ok(())
    }
}

struct NoWait;

impl Settle for NoWait {
    fn settle(&self, _duration: Duration) {}
}

fn config(prefix: &Path) -> CanaryConfig {
    let config: CanaryConfig = toml::from_str(&format!(
        r#"
[provision]
prefix = {:?}
source_url = "https://example.org/dist/seattle_linux.tgz"
install_dir = "seattle_repy"

[verify]
expected_e = "100410155996328658394016174672712730146493471136460054943977610055010406541029967456210961113332433L"

[notify]
recipients = ["ops@example.org"]
"#,
        prefix.display().to_string()
    ))
    .unwrap();
    config.validate().unwrap();
    config
}

fn run(content: Option<&str>) -> (CycleOutcome, Vec<String>, usize, bool) {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path());
    let state_path = config.state_path();
    let provisioner = ArtifactWriter {
        path: &state_path,
        content,
        uninstalls: Cell::new(0),
    };
    let extractor = FileStateExtractor::new(&state_path);
    let notifier = CountingNotifier::default();

    let report = Pipeline::new(&config, "subject".to_string(), &provisioner, &extractor, &notifier, &NoWait).run_cycle();
    let bodies = notifier.bodies.borrow().clone();
    (report.outcome, bodies, provisioner.uninstalls.get(), state_path.exists())
}

#[test]
fn test_real_vessel_record_passes() {
    let record = "{'v2': {'userkeys': [{'e': 100410155996328658394016174672712730146493471136460054943977610055010406541029967456210961113332433L, 'n': 1234567L}], 'ownerkey': {'e': 65537L, 'n': 99L}, 'status': 'Started', 'advertise': True, 'ownerinformation': '', 'oldmetadata': None, 'stopfilename': 'v2.stop', 'logfilename': ('v2.old', 'v2.new')}}\n";
    let (outcome, bodies, uninstalls, left_behind) = run(Some(record));
    assert_eq!(outcome, CycleOutcome::Passed);
    assert!(bodies.is_empty());
    assert_eq!(uninstalls, 1);
    assert!(!left_behind);
}

#[test]
fn test_missing_artifact_is_decode_failure() {
    let (outcome, bodies, uninstalls, _) = run(None);
    assert_eq!(outcome, CycleOutcome::FailedError);
    assert_eq!(bodies.len(), 1);
    assert!(bodies[0].contains("failed to read state file"));
    assert_eq!(uninstalls, 1);
}

#[test]
fn test_empty_artifact_is_decode_failure() {
    let (outcome, bodies, uninstalls, _) = run(Some(""));
    assert_eq!(outcome, CycleOutcome::FailedError);
    assert!(bodies[0].contains("Error: DecodeError"));
    assert_eq!(uninstalls, 1);
}

#[test]
fn test_executable_artifact_is_rejected() {
    let (outcome, bodies, uninstalls, _) = run(Some("__import__('os').system('touch /tmp/pwned')\n"));
    assert_eq!(outcome, CycleOutcome::FailedError);
    assert!(bodies[0].contains("unsupported name '__import__'"));
    assert_eq!(uninstalls, 1);
}

#[test]
fn test_fresh_unit_without_onepercent_key_notifies() {
    let (outcome, bodies, uninstalls, _) = run(Some("{'v1': {'userkeys': [], 'status': 'Fresh'}}\n"));
    assert_eq!(outcome, CycleOutcome::FailedNoCredential);
    assert!(bodies[0].contains("100410155996328658394016174672712730146493471136460054943977610055010406541029967456210961113332433"));
    assert_eq!(uninstalls, 1);
}
