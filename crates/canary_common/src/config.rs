//! Canary configuration
//!
//! Loaded once from /etc/install-canary/config.toml and passed by reference
//! into the pipeline. Credentials for the mail relay never live in the file;
//! they come from the environment (see `MAIL_USER_ENV` / `MAIL_PASSWORD_ENV`).

use crate::error::ConfigError;
use crate::literal::Integer;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing::level_filters::LevelFilter;

/// Default config file path
pub const CONFIG_PATH: &str = "/etc/install-canary/config.toml";

/// Relay username environment variable
pub const MAIL_USER_ENV: &str = "CANARY_MAIL_USER";

/// Relay password environment variable
pub const MAIL_PASSWORD_ENV: &str = "CANARY_MAIL_PASSWORD";

/// Provisioning settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionConfig {
    /// Directory the archive is downloaded to and unpacked in
    #[serde(default = "default_prefix")]
    pub prefix: PathBuf,

    /// Where the distribution archive is fetched from
    pub source_url: String,

    /// Archive file name. Defaults to the last path segment of `source_url`.
    #[serde(default)]
    pub archive_name: Option<String>,

    /// Directory the archive unpacks to, relative to `prefix`
    #[serde(default = "default_install_dir")]
    pub install_dir: String,

    /// Skip TLS certificate checks when downloading
    #[serde(default)]
    pub insecure_download: bool,
}

fn default_prefix() -> PathBuf {
    PathBuf::from("/var/lib/install-canary")
}

fn default_install_dir() -> String {
    "install".to_string()
}

impl ProvisionConfig {
    pub fn archive_name(&self) -> &str {
        match &self.archive_name {
            Some(name) => name,
            None => self
                .source_url
                .rsplit('/')
                .next()
                .unwrap_or(&self.source_url),
        }
    }

    pub fn archive_path(&self) -> PathBuf {
        self.prefix.join(self.archive_name())
    }

    pub fn install_path(&self) -> PathBuf {
        self.prefix.join(&self.install_dir)
    }
}

/// Verification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Fingerprint (`e`) that must appear in some unit's userkeys.
    /// Written as a string since it does not fit a TOML integer.
    pub expected_e: Integer,

    /// State artifact, relative to the install directory
    #[serde(default = "default_state_file")]
    pub state_file: String,

    /// Wait between install and extraction
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
}

fn default_state_file() -> String {
    "vesseldict".to_string()
}

fn default_settle_secs() -> u64 {
    1800 // 30 minutes for the registry to pick up the new install
}

impl VerifyConfig {
    pub fn settle_duration(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }
}

/// Mail transport selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotifyTransportKind {
    #[default]
    Sendmail,
    Http,
}

/// Notification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Operator addresses. An entry may hold several comma-separated addresses.
    pub recipients: Vec<String>,

    #[serde(default = "default_from")]
    pub from: String,

    #[serde(default)]
    pub transport: NotifyTransportKind,

    #[serde(default = "default_sendmail_path")]
    pub sendmail_path: PathBuf,

    /// Relay URL, required for the http transport
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

fn default_from() -> String {
    "install-canary@localhost".to_string()
}

fn default_sendmail_path() -> PathBuf {
    PathBuf::from("/usr/sbin/sendmail")
}

fn default_http_timeout() -> u64 {
    30
}

impl NotifyConfig {
    /// Recipient addresses with comma-joined entries split out, in order
    pub fn addresses(&self) -> Vec<String> {
        self.recipients
            .iter()
            .flat_map(|entry| entry.split(','))
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Complete canary configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanaryConfig {
    pub provision: ProvisionConfig,

    pub verify: VerifyConfig,

    pub notify: NotifyConfig,

    #[serde(default)]
    pub log: LogConfig,
}

impl CanaryConfig {
    /// Load and validate config from `path`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: CanaryConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provision.source_url.trim().is_empty() {
            return Err(ConfigError::Invalid("provision.source_url is empty".to_string()));
        }
        let archive = Path::new(self.provision.archive_name());
        if !matches!(archive.components().collect::<Vec<_>>().as_slice(), [Component::Normal(_)]) {
            return Err(ConfigError::Invalid(format!(
                "cannot derive an archive name from '{}'; set provision.archive_name",
                self.provision.source_url
            )));
        }
        let install_dir = Path::new(&self.provision.install_dir);
        if self.provision.install_dir.is_empty()
            || !install_dir.components().all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(ConfigError::Invalid(
                "provision.install_dir must be a relative directory name".to_string(),
            ));
        }
        if self.notify.addresses().is_empty() {
            return Err(ConfigError::Invalid("notify.recipients has no addresses".to_string()));
        }
        if self.notify.transport == NotifyTransportKind::Http && self.notify.endpoint.is_none() {
            return Err(ConfigError::Invalid(
                "notify.endpoint is required for the http transport".to_string(),
            ));
        }
        if self.log.level.parse::<LevelFilter>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "log.level '{}' is not one of off, error, warn, info, debug, trace",
                self.log.level
            )));
        }
        Ok(())
    }

    /// Full path of the state artifact
    pub fn state_path(&self) -> PathBuf {
        self.provision.install_path().join(&self.verify.state_file)
    }
}

/// Get the default config file path
pub fn config_path() -> PathBuf {
    PathBuf::from(CONFIG_PATH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
[provision]
source_url = "https://example.org/dist/seattle_linux.tgz"

[verify]
expected_e = "100410155996328658394016174672712730146493471136460054943977610055010406541029967L"

[notify]
recipients = ["ops@example.org, oncall@example.org", "lead@example.org"]
"#;

    fn parse(src: &str) -> CanaryConfig {
        toml::from_str(src).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(MINIMAL);
        assert!(config.validate().is_ok());
        assert_eq!(config.verify.settle_secs, 1800);
        assert_eq!(config.verify.settle_duration(), Duration::from_secs(1800));
        assert_eq!(config.verify.state_file, "vesseldict");
        assert_eq!(config.notify.transport, NotifyTransportKind::Sendmail);
        assert_eq!(config.log.level, "info");
        assert!(!config.provision.insecure_download);
    }

    #[test]
    fn test_expected_e_is_canonical() {
        let config = parse(MINIMAL);
        assert_eq!(
            config.verify.expected_e.as_str(),
            "100410155996328658394016174672712730146493471136460054943977610055010406541029967"
        );
    }

    #[test]
    fn test_non_integer_expected_e_fails_parse() {
        let src = MINIMAL.replace("100410155996328658394016174672712730146493471136460054943977610055010406541029967L", "abc");
        assert!(toml::from_str::<CanaryConfig>(&src).is_err());
    }

    #[test]
    fn test_paths_derive_from_prefix() {
        let config = parse(MINIMAL);
        assert_eq!(config.provision.archive_name(), "seattle_linux.tgz");
        assert_eq!(
            config.provision.archive_path(),
            PathBuf::from("/var/lib/install-canary/seattle_linux.tgz")
        );
        assert_eq!(
            config.state_path(),
            PathBuf::from("/var/lib/install-canary/install/vesseldict")
        );
    }

    #[test]
    fn test_addresses_split_comma_entries() {
        let config = parse(MINIMAL);
        assert_eq!(
            config.notify.addresses(),
            vec!["ops@example.org", "oncall@example.org", "lead@example.org"]
        );
    }

    #[test]
    fn test_validation_failures() {
        let mut config = parse(MINIMAL);
        config.notify.recipients = vec![" , ".to_string()];
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = parse(MINIMAL);
        config.notify.transport = NotifyTransportKind::Http;
        assert!(config.validate().is_err());
        config.notify.endpoint = Some("https://relay.example.org/send".to_string());
        assert!(config.validate().is_ok());

        let mut config = parse(MINIMAL);
        config.provision.install_dir = "/abs".to_string();
        assert!(config.validate().is_err());

        let mut config = parse(MINIMAL);
        config.provision.source_url = "https://example.org/dist/".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_install_dir_cannot_leave_prefix() {
        for dir in ["..", ".", "a/../..", "./install", "install/.."] {
            let mut config = parse(MINIMAL);
            config.provision.install_dir = dir.to_string();
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid(_))),
                "install_dir {:?} accepted",
                dir
            );
        }

        let mut config = parse(MINIMAL);
        config.provision.install_dir = "seattle/repy".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_archive_name_is_a_single_file_name() {
        let mut config = parse(MINIMAL);
        config.provision.source_url = "https://example.org/dist/..".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        for name in ["..", ".", "a/b.tgz", "/tmp/pkg.tgz"] {
            let mut config = parse(MINIMAL);
            config.provision.archive_name = Some(name.to_string());
            assert!(config.validate().is_err(), "archive_name {:?} accepted", name);
        }

        let mut config = parse(MINIMAL);
        config.provision.source_url = "https://example.org/dist/..".to_string();
        config.provision.archive_name = Some("pkg.tgz".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_log_level_must_be_known() {
        let mut config = parse(MINIMAL);
        config.log.level = "verbose".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(ref m)) if m.contains("verbose")));

        for level in ["off", "error", "WARN", "debug", "trace"] {
            config.log.level = level.to_string();
            assert!(config.validate().is_ok(), "level {:?} rejected", level);
        }
    }

    #[test]
    fn test_load_reports_path() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("config.toml");
        let err = CanaryConfig::load(&missing).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));

        fs::write(&missing, MINIMAL).unwrap();
        let config = CanaryConfig::load(&missing).unwrap();
        assert_eq!(config.notify.addresses().len(), 3);

        fs::write(&missing, "[provision\n").unwrap();
        assert!(matches!(CanaryConfig::load(&missing), Err(ConfigError::Parse { .. })));
    }
}
