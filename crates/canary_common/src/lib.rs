//! Shared types for the install canary.
//!
//! Holds everything that does not touch the host: configuration, the error
//! taxonomy, the state artifact decoder and the credential verifier.

pub mod config;
pub mod error;
pub mod extract;
pub mod literal;
pub mod state;
pub mod verify;

pub use config::{CanaryConfig, LogConfig, NotifyConfig, NotifyTransportKind, ProvisionConfig, VerifyConfig};
pub use error::{ConfigError, CycleError, DecodeError, MalformedStateError, NotifyError, ProvisionError};
pub use extract::{decode_state, FileStateExtractor, StateExtractor};
pub use literal::{parse_literal, Integer, Literal, LiteralError};
pub use state::InstallationState;
pub use verify::{check, find_match, CredentialMatch};
