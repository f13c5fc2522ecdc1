//! Provisioner - download, unpack, install and remove the target software
//!
//! Every step runs through `sh -c` inside the configured prefix. The
//! pipeline only sees success or a [`ProvisionError`] naming the step.

use canary_common::config::ProvisionConfig;
use canary_common::ProvisionError;
use shell_escape::escape;
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

/// Stderr kept in a step failure
const MAX_STDERR_BYTES: usize = 4 * 1024;

/// Install/uninstall lifecycle of the software under test
pub trait Provisioner {
    fn install(&self) -> Result<(), ProvisionError>;

    /// Must leave no installation behind, even after a partial install
    fn uninstall(&self) -> Result<(), ProvisionError>;
}

/// Provisioner backed by wget/tar and the distribution's own scripts
#[derive(Debug, Clone)]
pub struct ShellProvisioner {
    prefix: PathBuf,
    source_url: String,
    archive: PathBuf,
    install_dir: PathBuf,
    insecure_download: bool,
}

impl ShellProvisioner {
    pub fn from_config(config: &ProvisionConfig) -> Self {
        Self {
            prefix: config.prefix.clone(),
            source_url: config.source_url.clone(),
            archive: config.archive_path(),
            install_dir: config.install_path(),
            insecure_download: config.insecure_download,
        }
    }

    fn download_command(&self) -> String {
        // file:// and bare paths come from a local mirror
        let local = self
            .source_url
            .strip_prefix("file://")
            .or_else(|| self.source_url.starts_with('/').then_some(self.source_url.as_str()));
        match local {
            Some(path) => format!("cp {} {}", quote(path), quote_path(&self.archive)),
            None => format!(
                "wget -q {}-O {} {}",
                if self.insecure_download { "--no-check-certificate " } else { "" },
                quote_path(&self.archive),
                quote(&self.source_url)
            ),
        }
    }

    fn run_step(&self, step: &str, command: &str) -> Result<(), ProvisionError> {
        debug!("{}: {}", step, command);
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.prefix)
            .output()
            .map_err(|source| ProvisionError::Spawn {
                step: step.to_string(),
                source,
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(ProvisionError::Exit {
                step: step.to_string(),
                code: output.status.code(),
                stderr: tail_lossy(&output.stderr),
            })
        }
    }

    fn remove(&self, path: &Path, step: &str) -> Result<(), ProvisionError> {
        let result = if path.is_dir() {
            fs::remove_dir_all(path)
        } else if path.exists() {
            fs::remove_file(path)
        } else {
            return Ok(());
        };
        result.map_err(|source| ProvisionError::Remove {
            step: step.to_string(),
            path: path.to_path_buf(),
            source,
        })
    }

    fn run_uninstall_script(&self) -> Result<(), ProvisionError> {
        if !self.install_dir.join("uninstall.sh").exists() {
            debug!("no uninstall script under {}", self.install_dir.display());
            return Ok(());
        }
        info!("uninstalling");
        self.run_step(
            "uninstall",
            &format!(
                "cd {} && chmod +x ./uninstall.sh && ./uninstall.sh",
                quote_path(&self.install_dir)
            ),
        )
    }

    /// Remove the install dir and the archive. Both are attempted; the
    /// first failure is returned.
    fn remove_files(&self) -> Result<(), ProvisionError> {
        info!("removing all files");
        let mut first_error = None;
        for path in [&self.install_dir, &self.archive] {
            if let Err(e) = self.remove(path, "remove") {
                warn!("{}", e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Provisioner for ShellProvisioner {
    fn install(&self) -> Result<(), ProvisionError> {
        fs::create_dir_all(&self.prefix).map_err(|source| ProvisionError::Prepare {
            path: self.prefix.clone(),
            source,
        })?;

        // An interrupted earlier run may have left its installation behind
        if self.install_dir.exists() || self.archive.exists() {
            warn!("removing leftovers of an earlier run under {}", self.prefix.display());
            if let Err(e) = self.run_uninstall_script() {
                warn!("{}", e);
            }
            self.remove_files()?;
        }

        info!("downloading {}", self.source_url);
        self.run_step("download", &self.download_command())?;

        info!("unpacking {}", self.archive.display());
        self.run_step("unpack", &format!("tar -xzf {}", quote_path(&self.archive)))?;

        info!("installing from {}", self.install_dir.display());
        self.run_step(
            "install",
            &format!("cd {} && ./install.sh", quote_path(&self.install_dir)),
        )
    }

    fn uninstall(&self) -> Result<(), ProvisionError> {
        let script = self.run_uninstall_script();
        if let Err(e) = &script {
            warn!("{}", e);
        }
        let removal = self.remove_files();
        script.and(removal)
    }
}

fn quote(value: &str) -> String {
    escape(Cow::Borrowed(value)).into_owned()
}

fn quote_path(path: &Path) -> String {
    quote(&path.to_string_lossy())
}

fn tail_lossy(bytes: &[u8]) -> String {
    let start = bytes.len().saturating_sub(MAX_STDERR_BYTES);
    String::from_utf8_lossy(&bytes[start..]).trim().to_string()
}
