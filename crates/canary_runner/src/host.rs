//! Host and program identity for notification subjects

use std::process::Command;
use tracing::debug;

/// Used when the local hostname cannot be determined
pub const UNKNOWN_HOST: &str = "unknown host";

/// Best-effort hostname, preferring the canonical (fully qualified) name
pub fn resolve_hostname() -> String {
    let short = match nix::unistd::gethostname() {
        Ok(name) => Some(name.to_string_lossy().into_owned()),
        Err(e) => {
            debug!("gethostname failed: {}", e);
            None
        }
    };
    pick_hostname(canonical_hostname(), short)
}

fn canonical_hostname() -> Option<String> {
    let output = Command::new("hostname").arg("-f").output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn pick_hostname(canonical: Option<String>, short: Option<String>) -> String {
    [canonical, short]
        .into_iter()
        .flatten()
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| UNKNOWN_HOST.to_string())
}

/// Name the process was invoked as
pub fn program_name() -> String {
    std::env::args_os()
        .next()
        .map(|arg| arg.to_string_lossy().into_owned())
        .unwrap_or_else(|| "install-canary".to_string())
}

/// Subject line for every failure notification
pub fn failure_subject(host: &str, program: &str) -> String {
    format!("install check failed @ {} : {}", host, program)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_canonical_name() {
        assert_eq!(
            pick_hostname(Some("node7.cs.example.edu\n".into()), Some("node7".into())),
            "node7.cs.example.edu"
        );
    }

    #[test]
    fn test_falls_back_to_short_name() {
        assert_eq!(pick_hostname(None, Some("node7\n".into())), "node7");
        assert_eq!(pick_hostname(Some(String::new()), Some("node7".into())), "node7");
    }

    #[test]
    fn test_unknown_host_sentinel() {
        assert_eq!(pick_hostname(None, None), UNKNOWN_HOST);
        assert_eq!(pick_hostname(Some("  ".into()), Some("".into())), UNKNOWN_HOST);
    }

    #[test]
    fn test_subject_names_host_and_program() {
        assert_eq!(
            failure_subject("node7", "/usr/bin/install-canary"),
            "install check failed @ node7 : /usr/bin/install-canary"
        );
    }

    #[test]
    fn test_resolve_never_empty() {
        assert!(!resolve_hostname().is_empty());
    }
}
