//! Explicit process environment and the secret sanitizer.
//!
//! The entrypoint never mutates the ambient environment table. `main` seeds an
//! [`EnvStore`] once, every stage reads and strips through it, and the final
//! hand-off passes the store's snapshot as the workload's entire environment.

use std::collections::{BTreeMap, btree_map};
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::os::unix::ffi::OsStringExt;

use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::config::{CONTROL_PLANE_URL, CONTROL_PLANE_VARS, SESSION_ID, SESSION_TOKEN};

// ── Store ─────────────────────────────────────────────────────────────────────

/// Ordered name/value store standing in for the process environment.
///
/// Lookups return the first entry for a name (matching `getenv`); removal
/// drops every entry for that name so duplicates cannot survive a strip.
#[derive(Clone, Default)]
pub struct EnvStore {
    vars: Vec<(OsString, OsString)>,
}

impl EnvStore {
    /// Snapshot the real environment of the current process.
    #[must_use]
    pub fn from_process() -> Self {
        std::env::vars_os().collect()
    }

    #[must_use]
    pub fn get(&self, name: impl AsRef<OsStr>) -> Option<&OsStr> {
        let name = name.as_ref();
        self.vars
            .iter()
            .find(|(k, _)| k.as_os_str() == name)
            .map(|(_, v)| v.as_os_str())
    }

    /// Remove every entry for `name`, returning the value `get` would have seen.
    ///
    /// Shadowed duplicates are wiped before they are freed.
    pub fn remove(&mut self, name: impl AsRef<OsStr>) -> Option<OsString> {
        let name = name.as_ref();
        let mut first = None;
        self.vars.retain_mut(|(k, v)| {
            if k.as_os_str() != name {
                return true;
            }
            let value = std::mem::take(v);
            if first.is_none() {
                first = Some(value);
            } else {
                value.into_vec().zeroize();
            }
            false
        });
        first
    }

    #[must_use]
    pub fn contains(&self, name: impl AsRef<OsStr>) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.vars.iter().map(|(k, v)| (k.as_os_str(), v.as_os_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Full copy of the current contents, in insertion order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(OsString, OsString)> {
        self.vars.clone()
    }
}

impl<K: Into<OsString>, V: Into<OsString>> FromIterator<(K, V)> for EnvStore {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

// Values may hold secrets until they are stripped, so only names are printed.
impl fmt::Debug for EnvStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.vars.iter().map(|(k, _)| k))
            .finish()
    }
}

// ── Sanitizer ─────────────────────────────────────────────────────────────────

type Entry = (String, Zeroizing<String>);

/// Values captured by [`extract_and_strip`], keyed by variable name.
///
/// Every value is wiped when the set is dropped.
#[derive(Default)]
pub struct Captured {
    values: BTreeMap<String, Zeroizing<String>>,
}

impl ZeroizeOnDrop for Captured {}

impl Captured {
    /// Captured value, or `""` when the variable was absent.
    #[must_use]
    pub fn get(&self, name: &str) -> &str {
        self.values.get(name).map_or("", |v| v.as_str())
    }

    /// Move a value out without copying it; `""` when absent.
    pub fn take(&mut self, name: &str) -> Zeroizing<String> {
        self.values
            .remove(name)
            .unwrap_or_else(|| Zeroizing::new(String::new()))
    }
}

/// Plain `(name, value)` pairs for `envy`. Only for variables that are not secret.
impl IntoIterator for Captured {
    type Item = (String, String);
    type IntoIter = std::iter::Map<
        btree_map::IntoIter<String, Zeroizing<String>>,
        fn(Entry) -> (String, String),
    >;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter().map(unwrap_entry)
    }
}

fn unwrap_entry((name, mut value): Entry) -> (String, String) {
    (name, std::mem::take(&mut *value))
}

impl fmt::Debug for Captured {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

/// Read each of `names` out of `env` and remove it.
///
/// Absent variables are captured as the empty string. Afterwards none of
/// `names` is visible through `get`, `iter` or `snapshot`.
pub fn extract_and_strip(env: &mut EnvStore, names: &[&str]) -> Captured {
    let mut values = BTreeMap::new();
    for &name in names {
        let value = env
            .remove(name)
            .map_or_else(|| Zeroizing::new(String::new()), into_secret);
        values.insert(name.to_owned(), value);
    }
    Captured { values }
}

/// Take ownership of a removed value; non-UTF-8 bytes are replaced lossily
/// and the raw buffer is wiped.
fn into_secret(value: OsString) -> Zeroizing<String> {
    match value.into_string() {
        Ok(text) => Zeroizing::new(text),
        Err(raw) => {
            let bytes = Zeroizing::new(raw.into_vec());
            Zeroizing::new(String::from_utf8_lossy(&bytes).into_owned())
        }
    }
}

// ── Control-plane credentials ─────────────────────────────────────────────────

/// Opaque session token. Redacted in `Debug`, wiped from memory on drop.
pub struct SessionToken(Zeroizing<String>);

impl Default for SessionToken {
    fn default() -> Self {
        Self::from(String::new())
    }
}

impl SessionToken {
    #[must_use]
    pub fn is_present(&self) -> bool {
        !self.0.is_empty()
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl ZeroizeOnDrop for SessionToken {}

impl From<String> for SessionToken {
    fn from(value: String) -> Self {
        Self(Zeroizing::new(value))
    }
}

impl From<Zeroizing<String>> for SessionToken {
    fn from(value: Zeroizing<String>) -> Self {
        Self(value)
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_present() {
            f.write_str("SessionToken(<redacted>)")
        } else {
            f.write_str("SessionToken(<empty>)")
        }
    }
}

/// Control-plane values handed to the sandbox by its launcher.
#[derive(Debug, Default)]
pub struct ControlPlaneCredentials {
    pub session_token: SessionToken,
    pub control_plane_url: String,
    pub session_id: String,
}

impl ControlPlaneCredentials {
    /// Capture and strip the control-plane variables from `env`.
    ///
    /// The token moves from the store into [`SessionToken`] without an
    /// intermediate copy.
    pub fn take(env: &mut EnvStore) -> Self {
        let mut captured = extract_and_strip(env, &CONTROL_PLANE_VARS);
        Self {
            session_token: SessionToken::from(captured.take(SESSION_TOKEN)),
            control_plane_url: captured.get(CONTROL_PLANE_URL).to_owned(),
            session_id: captured.get(SESSION_ID).to_owned(),
        }
    }
}
