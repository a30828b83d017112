//! Polis sandbox entrypoint.
//!
//! Runs first inside the workspace container: strips control-plane secrets
//! from the environment, drops root to the agent account, moves into the
//! agent's working directory and replaces itself with the agent process.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod env;
pub mod error;
pub mod handoff;
pub mod identity;
pub mod launcher;
pub mod lookup;
pub mod privileges;
pub mod system;

#[cfg(test)]
mod test_support;

pub use config::{AgentConfig, Cli, HandoffMode};
pub use env::{Captured, ControlPlaneCredentials, EnvStore, extract_and_strip};
pub use error::LaunchError;
pub use handoff::{Handoff, SystemHandoff, Workload};
pub use identity::{Identity, IdentityError, PasswdFile};
pub use launcher::{LaunchPlan, Launcher};
pub use lookup::{LookPathError, look_path};
pub use privileges::{DropOutcome, DropStep, FailurePolicy, drop_privileges};
pub use system::{ProcessControl, System};
