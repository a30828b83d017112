//! Boot sequence: sanitize, plan, chdir, drop privileges, resolve, hand off.

use std::path::PathBuf;

use crate::config::{AGENT_VARS, AgentConfig, HandoffMode};
use crate::env::{ControlPlaneCredentials, EnvStore, extract_and_strip};
use crate::error::LaunchError;
use crate::handoff::{Handoff, Workload};
use crate::identity::PasswdFile;
use crate::lookup::look_path;
use crate::privileges::drop_privileges;
use crate::system::ProcessControl;

/// What to run, where, and as whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub command: String,
    pub args: Vec<String>,
    pub workdir: PathBuf,
    pub user: String,
    pub mode: HandoffMode,
}

impl LaunchPlan {
    /// Consume the agent configuration from `env`, falling back to the
    /// positional `argv` (command first, then its arguments).
    ///
    /// Every agent configuration variable is stripped from `env`, including
    /// on error.
    ///
    /// # Errors
    ///
    /// [`LaunchError::NoCommand`] when neither `AGENT_COMMAND` nor a
    /// positional command is present.
    pub fn from_env(env: &mut EnvStore, argv: &[String]) -> Result<Self, LaunchError> {
        let config = AgentConfig::from_captured(extract_and_strip(env, &AGENT_VARS))?;

        let command = match (config.command(), argv.first()) {
            (Some(command), _) => command.to_owned(),
            (None, Some(command)) => command.clone(),
            (None, None) => return Err(LaunchError::NoCommand),
        };

        let args = config
            .args()
            .unwrap_or_else(|| argv.iter().skip(1).cloned().collect());

        Ok(Self {
            command,
            args,
            workdir: PathBuf::from(config.workdir()),
            user: config.user().to_owned(),
            mode: config.handoff(),
        })
    }
}

/// Drives the sequence against a host and a hand-off implementation.
pub struct Launcher<P, H> {
    accounts: PasswdFile,
    process: P,
    handoff: H,
}

impl<P: ProcessControl, H: Handoff> Launcher<P, H> {
    #[must_use]
    pub fn new(accounts: PasswdFile, process: P, handoff: H) -> Self {
        Self {
            accounts,
            process,
            handoff,
        }
    }

    /// Run the whole boot sequence.
    ///
    /// With [`HandoffMode::Exec`] this only returns on failure. With
    /// [`HandoffMode::Spawn`] it returns the workload's exit status.
    ///
    /// # Errors
    ///
    /// Any fatal [`LaunchError`].
    pub fn run(&mut self, env: &mut EnvStore, argv: &[String]) -> Result<u8, LaunchError> {
        let credentials = ControlPlaneCredentials::take(env);
        tracing::info!(
            session_id = %credentials.session_id,
            control_plane = %credentials.control_plane_url,
            token_present = credentials.session_token.is_present(),
            "control plane variables stripped",
        );
        drop(credentials);

        let plan = LaunchPlan::from_env(env, argv)?;
        self.launch(&plan, env)
    }

    /// Steps after planning: chdir, privilege drop, path resolution and
    /// the hand-off itself.
    ///
    /// # Errors
    ///
    /// Any fatal [`LaunchError`].
    pub fn launch(&mut self, plan: &LaunchPlan, env: &EnvStore) -> Result<u8, LaunchError> {
        if let Err(e) = self.process.change_dir(&plan.workdir) {
            tracing::warn!("chdir {}: {e}", plan.workdir.display());
        }

        drop_privileges(&mut self.process, &self.accounts, &plan.user)?;

        let cwd = std::env::current_dir().unwrap_or_else(|_| plan.workdir.clone());
        let path = look_path(&plan.command, env.get("PATH"), &cwd).map_err(|source| {
            LaunchError::BinaryNotFound {
                command: plan.command.clone(),
                source,
            }
        })?;

        let mut argv = Vec::with_capacity(plan.args.len() + 1);
        argv.push(path.to_string_lossy().into_owned());
        argv.extend(plan.args.iter().cloned());

        tracing::info!(
            path = %path.display(),
            args = ?plan.args,
            workdir = %plan.workdir.display(),
            mode = %plan.mode,
            "handing off to agent",
        );

        self.handoff.hand_off(
            plan.mode,
            Workload {
                path,
                argv,
                env: env.snapshot(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CONTROL_PLANE_VARS;
    use crate::privileges::DropStep;
    use crate::test_support::{FakeProcess, RecordingHandoff};
    use std::io::Write;
    use std::path::Path;

    fn env(pairs: &[(&str, &str)]) -> EnvStore {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| (*s).to_owned()).collect()
    }

    fn passwd(content: &str) -> (tempfile::NamedTempFile, PasswdFile) {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(content.as_bytes()).expect("write");
        let db = PasswdFile::new(file.path());
        (file, db)
    }

    // ── LaunchPlan ───────────────────────────────────────────────────────────

    #[test]
    fn test_plan_prefers_env_over_positional() {
        let mut e = env(&[("AGENT_COMMAND", "/bin/echo"), ("AGENT_ARGS", "hello world")]);
        let plan = LaunchPlan::from_env(&mut e, &args(&["/bin/true", "x"])).expect("plan");
        assert_eq!(plan.command, "/bin/echo");
        assert_eq!(plan.args, ["hello", "world"]);
    }

    #[test]
    fn test_plan_positional_command_with_no_args() {
        let mut e = EnvStore::default();
        let plan = LaunchPlan::from_env(&mut e, &args(&["/bin/true"])).expect("plan");
        assert_eq!(plan.command, "/bin/true");
        assert!(plan.args.is_empty());
    }

    #[test]
    fn test_plan_positional_args_when_agent_args_unset() {
        let mut e = env(&[("AGENT_COMMAND", "claude")]);
        let plan =
            LaunchPlan::from_env(&mut e, &args(&["ignored", "--model", "opus"])).expect("plan");
        assert_eq!(plan.command, "claude");
        assert_eq!(plan.args, ["--model", "opus"]);
    }

    #[test]
    fn test_plan_without_command_is_fatal_and_still_strips() {
        let mut e = env(&[("AGENT_USER", "agent"), ("AGENT_COMMAND", "")]);
        let err = LaunchPlan::from_env(&mut e, &[]).unwrap_err();
        assert!(matches!(err, LaunchError::NoCommand));
        assert!(e.is_empty());
    }

    #[test]
    fn test_plan_defaults_and_strips_agent_vars() {
        let mut e = env(&[("AGENT_COMMAND", "sh"), ("PATH", "/bin")]);
        let plan = LaunchPlan::from_env(&mut e, &[]).expect("plan");
        assert_eq!(plan.workdir, Path::new("/workspace"));
        assert_eq!(plan.user, "agent");
        assert_eq!(plan.mode, HandoffMode::Exec);
        for name in AGENT_VARS {
            assert!(!e.contains(name), "{name} still visible");
        }
        assert!(e.contains("PATH"));
    }

    // ── End-to-end with fakes ────────────────────────────────────────────────

    #[test]
    fn test_scenario_unprivileged_echo() {
        let (_f, db) = passwd("root:x:0:0::/root:/bin/sh\n");
        let mut launcher = Launcher::new(
            db,
            FakeProcess {
                uid: 1000,
                ..Default::default()
            },
            RecordingHandoff::default(),
        );
        let mut e = env(&[
            ("AGENT_COMMAND", "/bin/echo"),
            ("AGENT_ARGS", "hello world"),
            ("SESSION_TOKEN", "s3cr3t"),
            ("CONTROL_PLANE_URL", "http://cp:8090"),
            ("SESSION_ID", "sandbox-1"),
            ("PATH", "/usr/bin:/bin"),
        ]);

        let code = launcher.run(&mut e, &[]).expect("run");

        assert_eq!(code, 0);
        assert!(launcher.process.applied.is_empty());
        assert_eq!(launcher.process.dirs, [PathBuf::from("/workspace")]);

        let (mode, workload) = launcher.handoff.calls.pop().expect("handed off");
        assert_eq!(mode, HandoffMode::Exec);
        assert_eq!(workload.path, Path::new("/bin/echo"));
        assert_eq!(workload.argv, ["/bin/echo", "hello", "world"]);
        let names: Vec<_> = workload.env.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(names, ["PATH"]);
        for name in CONTROL_PLANE_VARS.iter().chain(AGENT_VARS.iter()) {
            assert!(!e.contains(name));
        }
    }

    #[test]
    fn test_scenario_positional_true() {
        let (_f, db) = passwd("");
        let mut launcher = Launcher::new(
            db,
            FakeProcess {
                uid: 1000,
                ..Default::default()
            },
            RecordingHandoff::default(),
        );
        let mut e = env(&[("PATH", "/usr/bin:/bin")]);

        launcher.run(&mut e, &args(&["/bin/true"])).expect("run");

        let (_, workload) = launcher.handoff.calls.pop().expect("handed off");
        assert_eq!(workload.argv, ["/bin/true"]);
    }

    #[test]
    fn test_scenario_no_command_never_hands_off() {
        let (_f, db) = passwd("");
        let mut launcher =
            Launcher::new(db, FakeProcess::default(), RecordingHandoff::default());
        let mut e = EnvStore::default();

        let err = launcher.run(&mut e, &[]).unwrap_err();

        assert!(matches!(err, LaunchError::NoCommand));
        assert!(launcher.handoff.calls.is_empty());
        assert!(launcher.process.dirs.is_empty());
    }

    #[test]
    fn test_scenario_root_to_root() {
        let (_f, db) = passwd("root:x:0:0:root:/root:/bin/bash\n");
        let mut launcher =
            Launcher::new(db, FakeProcess::default(), RecordingHandoff::default());
        let mut e = env(&[("AGENT_COMMAND", "/bin/true"), ("AGENT_USER", "root")]);

        launcher.run(&mut e, &[]).expect("run");

        assert_eq!(
            launcher.process.applied,
            [
                (DropStep::SupplementaryGroups, 0),
                (DropStep::Gid, 0),
                (DropStep::Uid, 0),
            ]
        );
        assert_eq!(launcher.handoff.calls.len(), 1);
    }

    #[test]
    fn test_chdir_failure_is_only_a_warning() {
        let (_f, db) = passwd("");
        let mut launcher = Launcher::new(
            db,
            FakeProcess {
                uid: 1000,
                fail_chdir: true,
                ..Default::default()
            },
            RecordingHandoff::default(),
        );
        let mut e = env(&[("AGENT_COMMAND", "/bin/true"), ("AGENT_WORKDIR", "/nope")]);

        launcher.run(&mut e, &[]).expect("run");

        assert_eq!(launcher.process.dirs, [PathBuf::from("/nope")]);
        assert_eq!(launcher.handoff.calls.len(), 1);
    }

    #[test]
    fn test_setuid_failure_stops_before_handoff() {
        let (_f, db) = passwd("agent:x:1000:1000::/home/agent:/bin/sh\n");
        let mut launcher = Launcher::new(
            db,
            FakeProcess {
                fail: Some(DropStep::Uid),
                ..Default::default()
            },
            RecordingHandoff::default(),
        );
        let mut e = env(&[("AGENT_COMMAND", "/bin/true")]);

        let err = launcher.run(&mut e, &[]).unwrap_err();

        assert!(matches!(err, LaunchError::Privilege { .. }));
        assert!(launcher.handoff.calls.is_empty());
    }

    #[test]
    fn test_unresolvable_binary_is_fatal() {
        let (_f, db) = passwd("");
        let mut launcher = Launcher::new(
            db,
            FakeProcess {
                uid: 1000,
                ..Default::default()
            },
            RecordingHandoff::default(),
        );
        let mut e = env(&[("AGENT_COMMAND", "no-such-agent-xyz"), ("PATH", "/bin")]);

        let err = launcher.run(&mut e, &[]).unwrap_err();

        assert_eq!(
            err.to_string(),
            "agent binary not found: no-such-agent-xyz: executable file not found in $PATH"
        );
        assert!(launcher.handoff.calls.is_empty());
    }

    #[test]
    fn test_spawn_mode_is_forwarded() {
        let (_f, db) = passwd("");
        let mut launcher = Launcher::new(
            db,
            FakeProcess {
                uid: 1000,
                ..Default::default()
            },
            RecordingHandoff {
                status: 3,
                ..Default::default()
            },
        );
        let mut e = env(&[("AGENT_COMMAND", "/bin/true"), ("ENTRYPOINT_HANDOFF", "spawn")]);

        let code = launcher.run(&mut e, &[]).expect("run");

        assert_eq!(code, 3);
        let (mode, workload) = launcher.handoff.calls.pop().expect("handed off");
        assert_eq!(mode, HandoffMode::Spawn);
        assert!(workload.env.is_empty());
    }
}
