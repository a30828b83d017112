//! Passing control to the workload.
//!
//! [`HandoffMode::Exec`] replaces the process image, so nothing of the
//! entrypoint stays resident. [`HandoffMode::Spawn`] runs the workload as a
//! child and exits with its status; callers see the same exit code and
//! environment, but the entrypoint stays alive as the parent and signals
//! sent to it are not forwarded.

use std::ffi::{CString, OsString};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};

use nix::unistd::execve;

use crate::config::HandoffMode;
use crate::error::LaunchError;

/// Everything the workload inherits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workload {
    /// Resolved executable.
    pub path: PathBuf,
    /// Full argument vector; `argv[0]` is `path`.
    pub argv: Vec<String>,
    /// Sanitized environment.
    pub env: Vec<(OsString, OsString)>,
}

pub trait Handoff {
    /// Hand control to `workload`.
    ///
    /// Returns only when the workload ran as a child (`Spawn`), with the
    /// status the entrypoint should exit with.
    ///
    /// # Errors
    ///
    /// Returns the fatal error if the workload could not be started.
    fn hand_off(&mut self, mode: HandoffMode, workload: Workload) -> Result<u8, LaunchError>;
}

/// Production hand-off.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHandoff;

impl Handoff for SystemHandoff {
    fn hand_off(&mut self, mode: HandoffMode, workload: Workload) -> Result<u8, LaunchError> {
        match mode {
            HandoffMode::Exec => match exec(&workload)? {},
            HandoffMode::Spawn => spawn(&workload),
        }
    }
}

fn c_string(bytes: &[u8], what: &'static str) -> Result<CString, LaunchError> {
    CString::new(bytes).map_err(|_| LaunchError::InvalidArgument { what })
}

/// Replace the current process image. Never returns on success.
fn exec(workload: &Workload) -> Result<std::convert::Infallible, LaunchError> {
    let path = c_string(workload.path.as_os_str().as_bytes(), "executable path")?;
    let argv = workload
        .argv
        .iter()
        .map(|arg| c_string(arg.as_bytes(), "argument"))
        .collect::<Result<Vec<_>, _>>()?;
    let env = workload
        .env
        .iter()
        .map(|(k, v)| {
            let mut entry = k.as_bytes().to_vec();
            entry.push(b'=');
            entry.extend_from_slice(v.as_bytes());
            c_string(&entry, "environment entry")
        })
        .collect::<Result<Vec<_>, _>>()?;

    execve(&path, &argv, &env).map_err(|source| LaunchError::Exec {
        path: workload.path.clone(),
        source,
    })
}

fn spawn(workload: &Workload) -> Result<u8, LaunchError> {
    let status = Command::new(&workload.path)
        .args(workload.argv.iter().skip(1))
        .env_clear()
        .envs(workload.env.iter().map(|(k, v)| (k, v)))
        .status()
        .map_err(|source| LaunchError::Spawn {
            path: workload.path.clone(),
            source,
        })?;
    Ok(exit_code(status))
}

/// Exit code a shell would report for `status`.
fn exit_code(status: ExitStatus) -> u8 {
    let raw = status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(1);
    u8::try_from(raw).unwrap_or(1)
}
