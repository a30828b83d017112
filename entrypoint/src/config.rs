//! Variable names, compiled-in defaults and the agent launch configuration.

use std::str::FromStr;

use clap::Parser;
use serde::Deserialize;

use crate::env::Captured;

// Control-plane variables: read, then stripped before the agent starts.
pub const SESSION_TOKEN: &str = "SESSION_TOKEN";
pub const CONTROL_PLANE_URL: &str = "CONTROL_PLANE_URL";
pub const SESSION_ID: &str = "SESSION_ID";

pub const CONTROL_PLANE_VARS: [&str; 3] = [SESSION_TOKEN, CONTROL_PLANE_URL, SESSION_ID];

// Agent configuration variables.
pub const AGENT_COMMAND: &str = "AGENT_COMMAND";
pub const AGENT_ARGS: &str = "AGENT_ARGS";
pub const AGENT_USER: &str = "AGENT_USER";
pub const AGENT_WORKDIR: &str = "AGENT_WORKDIR";
pub const ENTRYPOINT_HANDOFF: &str = "ENTRYPOINT_HANDOFF";

pub const AGENT_VARS: [&str; 5] = [
    AGENT_COMMAND,
    AGENT_ARGS,
    AGENT_USER,
    AGENT_WORKDIR,
    ENTRYPOINT_HANDOFF,
];

pub const DEFAULT_USER: &str = "agent";
pub const DEFAULT_WORKDIR: &str = "/workspace";

/// Positional fallback for the agent command line.
///
/// Help and version flags are disabled so that everything after the binary
/// name reaches the workload untouched. A leading `--` is a separator and is
/// not part of the command line.
#[derive(Debug, Parser)]
#[command(
    name = "polis-entrypoint",
    disable_help_flag = true,
    disable_version_flag = true
)]
pub struct Cli {
    /// Agent command followed by its arguments, used when `AGENT_COMMAND` is unset.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub argv: Vec<String>,
}

/// How control passes to the workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandoffMode {
    /// Replace the process image with `execve`.
    #[default]
    Exec,
    /// Spawn the workload as a child, wait, and propagate its exit status.
    Spawn,
}

impl FromStr for HandoffMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exec" => Ok(Self::Exec),
            "spawn" => Ok(Self::Spawn),
            other => Err(format!("unknown handoff mode {other:?}")),
        }
    }
}

impl std::fmt::Display for HandoffMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Exec => "exec",
            Self::Spawn => "spawn",
        })
    }
}

/// Agent configuration captured from `AGENT_*` variables via `envy`.
///
/// Each field maps to its upper-case variable name. Empty values are
/// treated as absent by every accessor.
#[derive(Debug, Default, Deserialize)]
pub struct AgentConfig {
    agent_command: Option<String>,
    agent_args: Option<String>,
    agent_user: Option<String>,
    agent_workdir: Option<String>,
    entrypoint_handoff: Option<String>,
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}

impl AgentConfig {
    /// Build from values captured by [`crate::env::extract_and_strip`].
    ///
    /// # Errors
    ///
    /// Returns the `envy` error if the captured values cannot be deserialized.
    pub fn from_captured(captured: Captured) -> Result<Self, envy::Error> {
        envy::from_iter(captured)
    }

    #[must_use]
    pub fn command(&self) -> Option<&str> {
        non_empty(self.agent_command.as_ref())
    }

    /// `AGENT_ARGS` split on runs of whitespace, if it was set.
    ///
    /// A value made only of whitespace yields an empty list rather than
    /// `None`, so it still overrides positional arguments.
    #[must_use]
    pub fn args(&self) -> Option<Vec<String>> {
        non_empty(self.agent_args.as_ref())
            .map(|raw| raw.split_whitespace().map(str::to_owned).collect())
    }

    #[must_use]
    pub fn user(&self) -> &str {
        non_empty(self.agent_user.as_ref()).unwrap_or(DEFAULT_USER)
    }

    #[must_use]
    pub fn workdir(&self) -> &str {
        non_empty(self.agent_workdir.as_ref()).unwrap_or(DEFAULT_WORKDIR)
    }

    /// Requested hand-off mode; unknown values fall back to `exec`.
    #[must_use]
    pub fn handoff(&self) -> HandoffMode {
        let Some(raw) = non_empty(self.entrypoint_handoff.as_ref()) else {
            return HandoffMode::default();
        };
        raw.parse().unwrap_or_else(|e| {
            tracing::warn!("{e}, using exec");
            HandoffMode::default()
        })
    }
}
