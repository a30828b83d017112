//! Username to uid/gid resolution straight from the flat account file.
//!
//! Nothing here goes through NSS or `getpwnam`, so the binary keeps working
//! in root filesystems that ship `/etc/passwd` and nothing else.

use std::num::ParseIntError;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Well-known location of the local account database.
pub const PASSWD_PATH: &str = "/etc/passwd";

/// Numeric identity bound to a user name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub uid: u32,
    pub gid: u32,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("user {username:?} not found")]
    NotFound { username: String },

    #[error("parsing {field} {value:?} for user {username:?}: {source}")]
    Malformed {
        username: String,
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("reading {}: {source}", path.display())]
    Unavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Reader for a passwd-format account file.
#[derive(Debug, Clone)]
pub struct PasswdFile {
    path: PathBuf,
}

impl Default for PasswdFile {
    fn default() -> Self {
        Self::new(PASSWD_PATH)
    }
}

impl PasswdFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve `username` to its uid and gid.
    ///
    /// # Errors
    ///
    /// `Unavailable` if the file cannot be read, otherwise whatever
    /// [`find_identity`] reports.
    pub fn resolve(&self, username: &str) -> Result<Identity, IdentityError> {
        let content =
            std::fs::read_to_string(&self.path).map_err(|source| IdentityError::Unavailable {
                path: self.path.clone(),
                source,
            })?;
        find_identity(&content, username)
    }
}

/// Find the first record in `content` whose name field equals `username`.
///
/// Records with fewer than four colon-separated fields are skipped.
///
/// # Errors
///
/// `NotFound` when no record matches, `Malformed` when the matching
/// record's uid or gid is not an unsigned integer.
pub fn find_identity(content: &str, username: &str) -> Result<Identity, IdentityError> {
    for line in content.split('\n') {
        let mut fields = line.split(':');
        let (Some(name), Some(_password), Some(uid), Some(gid)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        if name != username {
            continue;
        }
        return Ok(Identity {
            uid: parse_id(username, "uid", uid)?,
            gid: parse_id(username, "gid", gid)?,
        });
    }

    Err(IdentityError::NotFound {
        username: username.to_owned(),
    })
}

fn parse_id(username: &str, field: &'static str, value: &str) -> Result<u32, IdentityError> {
    value.parse().map_err(|source| IdentityError::Malformed {
        username: username.to_owned(),
        field,
        value: value.to_owned(),
        source,
    })
}
