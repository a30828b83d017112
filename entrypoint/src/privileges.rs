//! Ordered privilege drop: supplementary groups, then gid, then uid.
//!
//! The gid must change while the process still holds `CAP_SETGID`; once the
//! uid is dropped that capability is gone and a later `setgid` would fail,
//! leaving the workload in root's group. [`DropStep::SEQUENCE`] is the only
//! order the steps are ever applied in.

use std::fmt;

use crate::error::LaunchError;
use crate::identity::{Identity, PasswdFile};
use crate::system::ProcessControl;

/// What happens when a step's syscall fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log and carry on with the next step.
    Warn,
    /// Abort the launch.
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropStep {
    SupplementaryGroups,
    Gid,
    Uid,
}

impl DropStep {
    pub const SEQUENCE: [Self; 3] = [Self::SupplementaryGroups, Self::Gid, Self::Uid];

    #[must_use]
    pub const fn policy(self) -> FailurePolicy {
        match self {
            Self::SupplementaryGroups => FailurePolicy::Warn,
            Self::Gid | Self::Uid => FailurePolicy::Fatal,
        }
    }

    /// The id this step sets.
    #[must_use]
    pub const fn target(self, identity: Identity) -> u32 {
        match self {
            Self::SupplementaryGroups | Self::Gid => identity.gid,
            Self::Uid => identity.uid,
        }
    }
}

impl fmt::Display for DropStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SupplementaryGroups => "setgroups",
            Self::Gid => "setgid",
            Self::Uid => "setuid",
        })
    }
}

/// Result of [`drop_privileges`] when the launch may continue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropOutcome {
    /// Not running as root; nothing to drop.
    NotRoot { uid: u32 },
    /// The target user could not be resolved; still running as root.
    StillRoot,
    Dropped(Identity),
}

/// Drop from root to `username`.
///
/// A non-root caller is left alone. A failed lookup is logged and the
/// process stays root so the workload still starts.
///
/// # Errors
///
/// Returns [`LaunchError::Privilege`] when a step with
/// [`FailurePolicy::Fatal`] fails. Later steps are not attempted.
pub fn drop_privileges<P: ProcessControl + ?Sized>(
    process: &mut P,
    accounts: &PasswdFile,
    username: &str,
) -> Result<DropOutcome, LaunchError> {
    let uid = process.current_uid();
    if uid != 0 {
        tracing::info!(uid, "not root, skipping privilege drop");
        return Ok(DropOutcome::NotRoot { uid });
    }

    let identity = match accounts.resolve(username) {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!(user = username, "user lookup failed: {e} (continuing as root)");
            return Ok(DropOutcome::StillRoot);
        }
    };

    for step in DropStep::SEQUENCE {
        let id = step.target(identity);
        if let Err(source) = process.apply(step, identity) {
            match step.policy() {
                FailurePolicy::Warn => tracing::warn!("{step}({id}): {source}"),
                FailurePolicy::Fatal => return Err(LaunchError::Privilege { step, id, source }),
            }
        }
    }

    tracing::info!(
        user = username,
        uid = identity.uid,
        gid = identity.gid,
        "dropped privileges",
    );
    Ok(DropOutcome::Dropped(identity))
}
