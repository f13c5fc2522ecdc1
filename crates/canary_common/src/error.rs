//! Error types for the install canary.

use std::path::PathBuf;
use thiserror::Error;

/// Install/uninstall infrastructure failure
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("cannot create {}: {source}", .path.display())]
    Prepare {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{step}: could not start command: {source}")]
    Spawn {
        step: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{step}: exited with status {}: {stderr}", exit_label(.code))]
    Exit {
        step: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{step}: failed to remove {}: {source}", .path.display())]
    Remove {
        step: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string())
}

/// Unreadable or unparsable state artifact
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("failed to read state file {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state file {} is empty", .path.display())]
    Empty { path: PathBuf },

    #[error("state record does not parse at column {column}: {message}")]
    Syntax {
        column: usize,
        message: String,
        content: String,
    },

    #[error("state record is of type {found}, expected a mapping of unit names")]
    NotAMapping { found: &'static str, content: String },

    #[error("state record has a non-string unit name ({found})")]
    NonStringKey { found: &'static str, content: String },

    #[error("state record names unit '{name}' more than once")]
    DuplicateUnit { name: String, content: String },
}

impl DecodeError {
    /// Raw record text that failed to decode, when it was read at all
    pub fn raw_content(&self) -> Option<&str> {
        match self {
            DecodeError::Unreadable { .. } | DecodeError::Empty { .. } => None,
            DecodeError::Syntax { content, .. }
            | DecodeError::NotAMapping { content, .. }
            | DecodeError::NonStringKey { content, .. }
            | DecodeError::DuplicateUnit { content, .. } => Some(content),
        }
    }
}

/// Decoded state that violates the unit/userkeys/e shape
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedStateError {
    #[error("unit '{unit}' is of type {found}, expected a mapping")]
    UnitNotMapping { unit: String, found: &'static str },

    #[error("unit '{unit}' has no 'userkeys' field")]
    MissingUserkeys { unit: String },

    #[error("unit '{unit}' has 'userkeys' of type {found}, expected a list")]
    UserkeysNotList { unit: String, found: &'static str },

    #[error("unit '{unit}' userkeys[{index}] is of type {found}, expected a mapping")]
    EntryNotMapping {
        unit: String,
        index: usize,
        found: &'static str,
    },

    #[error("unit '{unit}' userkeys[{index}] has no 'e' field")]
    MissingExponent { unit: String, index: usize },

    #[error("unit '{unit}' userkeys[{index}] has 'e' of type {found}, expected an integer")]
    ExponentNotInteger {
        unit: String,
        index: usize,
        found: &'static str,
    },
}

/// Notification transport failure. Never fatal to a cycle.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("notifier not ready: {0}")]
    NotReady(String),

    #[error("delivery to {recipient} failed: {reason}")]
    Transport { recipient: String, reason: String },

    #[error("delivery failed for {failed} of {total} recipients: {details}")]
    Partial {
        failed: usize,
        total: usize,
        details: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration could not be loaded
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Anything that ends a cycle as FailedError
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("install failed: {0}")]
    Provision(#[from] ProvisionError),

    #[error("state extraction failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("state verification failed: {0}")]
    Malformed(#[from] MalformedStateError),
}

impl CycleError {
    /// Error kind name used in operator reports
    pub fn kind(&self) -> &'static str {
        match self {
            CycleError::Provision(_) => "ProvisionError",
            CycleError::Decode(_) => "DecodeError",
            CycleError::Malformed(_) => "MalformedStateError",
        }
    }
}
