// Input validation utilities
//
// Values validated here end up inside shell command strings (`su - <user> -c "..."`) or URLs.
// Only narrow alphabets are accepted.

use anyhow::Result;
use regex::Regex;
use std::path::Path;

/// Validate a system account name (POSIX portable user name, as accepted by `useradd`).
pub fn validate_user_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(anyhow::anyhow!("User name cannot be empty"));
    }
    if name.len() > 32 {
        return Err(anyhow::anyhow!("User name cannot exceed 32 characters"));
    }

    let re = Regex::new(r"^[a-z_][a-z0-9_-]*\$?$").map_err(|e| {
        anyhow::anyhow!("Internal error: failed to compile user name regex: {}", e)
    })?;
    if !re.is_match(name) {
        return Err(anyhow::anyhow!(
            "User name '{}' contains invalid characters",
            name
        ));
    }

    Ok(())
}

/// Validate an absolute path that is later spliced into a `su -c` command line.
///
/// Only `A-Z a-z 0-9 . _ - /` are accepted.
pub fn validate_shell_path(path: &Path) -> Result<()> {
    if !path.is_absolute() {
        return Err(anyhow::anyhow!(
            "Path must be absolute (got {:?})",
            path
        ));
    }
    let re = Regex::new(r"^/[A-Za-z0-9._/-]*$").map_err(|e| {
        anyhow::anyhow!("Internal error: failed to compile path regex: {}", e)
    })?;
    let ok = path.to_str().is_some_and(|s| re.is_match(s));
    if !ok {
        return Err(anyhow::anyhow!(
            "Path {:?} contains characters that cannot be used in a shell command",
            path
        ));
    }
    Ok(())
}

/// Validate the base directory the install folder is created in.
pub fn validate_base_directory(dir: &Path) -> Result<()> {
    validate_shell_path(dir).map_err(|e| anyhow::anyhow!("Invalid install directory: {}", e))
}

/// Validate a release version string read from the remote manifest.
pub fn validate_release_version(version: &str) -> Result<()> {
    let re = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,63}$").map_err(|e| {
        anyhow::anyhow!("Internal error: failed to compile version regex: {}", e)
    })?;
    if !re.is_match(version) {
        return Err(anyhow::anyhow!(
            "Release manifest returned an invalid version string: '{}'",
            version
        ));
    }
    Ok(())
}
