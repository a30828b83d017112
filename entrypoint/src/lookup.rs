//! Locate the agent executable on the sanitized `PATH`.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LookPathError {
    #[error("executable file not found in $PATH")]
    NotFound,

    #[error("{}: not an executable file", path.display())]
    NotExecutable {
        path: PathBuf,
        #[source]
        source: which::Error,
    },
}

/// Resolve `command` the way a shell would.
///
/// A command containing `/` is checked in place; a relative one is joined
/// onto `cwd`. Otherwise each non-empty entry of `search_path` is tried in
/// order and the first executable regular file wins. Empty entries do not
/// mean the current directory.
///
/// # Errors
///
/// `NotExecutable` for a path-like command that is missing or not
/// executable, `NotFound` when the search turns up nothing.
pub fn look_path(
    command: &str,
    search_path: Option<&OsStr>,
    cwd: &Path,
) -> Result<PathBuf, LookPathError> {
    if command.contains('/') {
        return which::which_in(command, None::<&OsStr>, cwd).map_err(|source| {
            LookPathError::NotExecutable {
                path: PathBuf::from(command),
                source,
            }
        });
    }

    let dirs: Vec<PathBuf> = search_path
        .map(|raw| {
            std::env::split_paths(raw)
                .filter(|dir| !dir.as_os_str().is_empty())
                .collect()
        })
        .unwrap_or_default();
    if dirs.is_empty() {
        return Err(LookPathError::NotFound);
    }
    let dirs = std::env::join_paths(dirs).map_err(|_| LookPathError::NotFound)?;

    which::which_in(command, Some(dirs), cwd).map_err(|_| LookPathError::NotFound)
}
