//! Process-level operations the launcher needs from the host.
//!
//! The trait is the seam tests replace; [`System`] is the production
//! implementation backed by `nix`.

use std::path::Path;

use nix::errno::Errno;
use nix::unistd::{Gid, Uid, getuid, setgid, setgroups, setuid};

use crate::identity::Identity;
use crate::privileges::DropStep;

/// Credential and working-directory control over the current process.
pub trait ProcessControl {
    /// Real uid of the calling process.
    fn current_uid(&self) -> u32;

    /// Change the working directory.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error; callers treat it as a warning.
    fn change_dir(&mut self, dir: &Path) -> std::io::Result<()>;

    /// Perform a single privilege-drop step towards `identity`.
    ///
    /// # Errors
    ///
    /// Returns the errno reported by the syscall.
    fn apply(&mut self, step: DropStep, identity: Identity) -> Result<(), Errno>;
}

/// The real process.
#[derive(Debug, Default, Clone, Copy)]
pub struct System;

impl ProcessControl for System {
    fn current_uid(&self) -> u32 {
        getuid().as_raw()
    }

    fn change_dir(&mut self, dir: &Path) -> std::io::Result<()> {
        std::env::set_current_dir(dir)
    }

    fn apply(&mut self, step: DropStep, identity: Identity) -> Result<(), Errno> {
        match step {
            DropStep::SupplementaryGroups => setgroups(&[Gid::from_raw(identity.gid)]),
            DropStep::Gid => setgid(Gid::from_raw(identity.gid)),
            DropStep::Uid => setuid(Uid::from_raw(identity.uid)),
        }
    }
}
