//! Startup selection of the shaping profile.
//!
//! The profile comes from a one-line text file (by default
//! `/etc/fan-control/profile`) so it can be changed without touching the
//! service definition. Anything other than a recognized name selects
//! [`Profile::Linear`].

use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

use crate::curve::Profile;
use crate::error::Error;
use crate::tracing::prelude::*;

/// Why an override file did not yield a profile.
#[derive(Debug, thiserror::Error)]
pub enum OverrideError {
    #[error("override file not present")]
    Missing,

    #[error("read failed: {0}")]
    Unreadable(#[source] io::Error),

    #[error("override file is empty")]
    Empty,

    #[error("unknown profile '{0}'")]
    Unknown(String),
}

impl OverrideError {
    /// Absence and emptiness are the normal "no override" states; only
    /// the other cases deserve a warning.
    fn is_expected(&self) -> bool {
        matches!(self, OverrideError::Missing | OverrideError::Empty)
    }
}

/// Parse a profile name, ignoring case and surrounding whitespace.
pub fn parse_profile(raw: &str) -> Option<Profile> {
    Profile::from_str(&raw.trim().to_lowercase()).ok()
}

/// Read the override file at `path`.
pub fn read_override(path: &Path) -> Result<Profile, OverrideError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(OverrideError::Missing),
        Err(e) => return Err(OverrideError::Unreadable(e)),
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(OverrideError::Empty);
    }

    parse_profile(trimmed).ok_or_else(|| OverrideError::Unknown(trimmed.to_string()))
}

/// Resolve the profile to run with, falling back to the default on any
/// override problem.
pub fn resolve_profile(path: &Path) -> Profile {
    match read_override(path) {
        Ok(profile) => {
            info!(path = %path.display(), profile = %profile, "Using profile override");
            profile
        }
        Err(e) => {
            let fallback = Profile::default();
            if e.is_expected() {
                debug!(
                    path = %path.display(),
                    reason = %e,
                    profile = %fallback,
                    "No profile override"
                );
            } else {
                let e = Error::from(e);
                warn!(
                    path = %path.display(),
                    error = %e,
                    profile = %fallback,
                    "Ignoring profile override"
                );
            }
            fallback
        }
    }
}
