//! Recording fakes for the launcher's host seams.

use std::path::{Path, PathBuf};

use nix::errno::Errno;

use crate::config::HandoffMode;
use crate::error::LaunchError;
use crate::handoff::{Handoff, Workload};
use crate::identity::Identity;
use crate::privileges::DropStep;
use crate::system::ProcessControl;

/// In-memory process: records chdir targets and drop steps, fails on request.
#[derive(Debug, Default)]
pub struct FakeProcess {
    pub uid: u32,
    pub fail: Option<DropStep>,
    pub fail_chdir: bool,
    pub applied: Vec<(DropStep, u32)>,
    pub dirs: Vec<PathBuf>,
}

impl ProcessControl for FakeProcess {
    fn current_uid(&self) -> u32 {
        self.uid
    }

    fn change_dir(&mut self, dir: &Path) -> std::io::Result<()> {
        self.dirs.push(dir.to_path_buf());
        if self.fail_chdir {
            return Err(std::io::Error::from(std::io::ErrorKind::NotFound));
        }
        Ok(())
    }

    fn apply(&mut self, step: DropStep, identity: Identity) -> Result<(), Errno> {
        self.applied.push((step, step.target(identity)));
        if self.fail == Some(step) {
            return Err(Errno::EPERM);
        }
        Ok(())
    }
}

/// Captures the workload instead of starting it.
#[derive(Debug, Default)]
pub struct RecordingHandoff {
    pub status: u8,
    pub calls: Vec<(HandoffMode, Workload)>,
}

impl Handoff for RecordingHandoff {
    fn hand_off(&mut self, mode: HandoffMode, workload: Workload) -> Result<u8, LaunchError> {
        self.calls.push((mode, workload));
        Ok(self.status)
    }
}
