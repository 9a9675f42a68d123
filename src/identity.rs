use std::path::{Path, PathBuf};

use thiserror::Error;

/// Name of the identity file under the user's home directory.
pub(crate) const IDENTITY_FILE: &str = ".tunnel";

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("no identity file at {0}, write your token into it and retry")]
    NotFound(String),
    #[error("identity file unreadable: {0}")]
    ReadFailure(std::io::Error),
    #[error("identity file is empty")]
    Empty,
    #[error("could not resolve the home directory")]
    NoHome,
}

/// Reads the bootstrap token from `~/.tunnel`. A missing or unreadable file
/// is a configuration error, not a transient fault, so there is no retry.
pub(crate) fn read() -> Result<String, IdentityError> {
    read_from(&default_path()?)
}

pub(crate) fn read_from(path: &Path) -> Result<String, IdentityError> {
    if !path.exists() {
        return Err(IdentityError::NotFound(path.display().to_string()));
    }
    let raw = std::fs::read_to_string(path).map_err(IdentityError::ReadFailure)?;
    let identity = raw.trim_matches('\n');
    if identity.is_empty() {
        return Err(IdentityError::Empty);
    }
    Ok(identity.to_string())
}

fn default_path() -> Result<PathBuf, IdentityError> {
    let home = dirs::home_dir().ok_or(IdentityError::NoHome)?;
    Ok(home.join(IDENTITY_FILE))
}
