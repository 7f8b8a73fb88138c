use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::identity::TransitionStep;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong between invocation and `execvp`. All of
/// these are terminal: the caller prints the message and exits.
#[derive(Debug, Error)]
pub enum Error {
    #[error("insufficient privileges")]
    InsufficientPrivilege,

    #[error("unable to get passwd file entry for {name}")]
    UnknownAccount { name: String },

    #[error("unable to get shadow file entry for {name}")]
    ShadowLookupFailed { name: String },

    #[error("password is locked")]
    AccountLocked,

    #[error("incorrect password")]
    IncorrectPassword,

    #[error("process does not have controlling terminal")]
    NoControllingTerminal,

    #[error("unable to read process status: {source}")]
    ProcessStatus { source: io::Error },

    #[error("unable to {action} terminal attributes: {source}")]
    TerminalState {
        action: &'static str,
        source: io::Error,
    },

    #[error("unable to allocate memory")]
    Allocation,

    #[error("unable to read password: {source}")]
    Read { source: io::Error },

    #[error("unable to hash input: {source}")]
    Hashing { source: io::Error },

    #[error("no program given")]
    NoProgramGiven,

    #[error("unable to {step}: {source}")]
    PrivilegeTransition {
        step: TransitionStep,
        source: io::Error,
    },

    #[error("unable to run {program}: {reason}")]
    Exec {
        program: String,
        reason: ExecFailure,
    },

    #[error("unable to read config {path}: {source}")]
    ConfigRead { path: PathBuf, source: io::Error },

    #[error("invalid config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Why `execvp` did not replace the process image. A missing command is
/// reported differently from every other launch failure.
#[derive(Debug)]
pub enum ExecFailure {
    NotFound,
    Other(io::Error),
}

impl std::fmt::Display for ExecFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecFailure::NotFound => write!(f, "no such command"),
            ExecFailure::Other(source) => write!(f, "{source}"),
        }
    }
}
