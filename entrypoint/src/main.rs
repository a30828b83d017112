//! Polis sandbox entrypoint binary.

use std::io::IsTerminal;
use std::process::ExitCode;

use anyhow::{Result, anyhow};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use polis_entrypoint::{Cli, EnvStore, Launcher, PasswdFile, System, SystemHandoff};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();

    match run() {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("polis-entrypoint: fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<u8> {
    let cli = Cli::try_parse().map_err(|e| anyhow!("invalid command line: {}", e.kind()))?;
    let mut env = EnvStore::from_process();
    let mut launcher = Launcher::new(PasswdFile::default(), System, SystemHandoff);
    Ok(launcher.run(&mut env, &cli.argv)?)
}
