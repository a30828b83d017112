//! Fatal launch errors.
//!
//! Anything that reaches `main` as a [`LaunchError`] ends the process with
//! status 1. Recoverable conditions are logged where they happen and never
//! become an error value.

use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

use crate::lookup::LookPathError;
use crate::privileges::DropStep;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("no agent command specified (set AGENT_COMMAND or pass as argument)")]
    NoCommand,

    #[error("invalid agent configuration: {0}")]
    Config(#[from] envy::Error),

    #[error("agent binary not found: {command}: {source}")]
    BinaryNotFound {
        command: String,
        #[source]
        source: LookPathError,
    },

    #[error("{step}({id}): {source}")]
    Privilege {
        step: DropStep,
        id: u32,
        #[source]
        source: Errno,
    },

    #[error("{what} contains an interior NUL byte")]
    InvalidArgument { what: &'static str },

    #[error("exec {}: {source}", path.display())]
    Exec {
        path: PathBuf,
        #[source]
        source: Errno,
    },

    #[error("spawn {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
