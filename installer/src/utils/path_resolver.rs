use anyhow::Result;
use std::path::{Path, PathBuf};

/// Default system-wide log folder (root runs only).
pub const SYSTEM_LOG_DIR: &str = "/var/log/koozic-installer";

/// Resolve log folder (absolute path)
///
/// Order: explicit override, `/var/log/koozic-installer`, the invoking user's data dir,
/// then the working directory. The first folder that can be created wins.
pub fn resolve_log_folder(override_dir: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = override_dir {
        std::fs::create_dir_all(dir)
            .map_err(|e| anyhow::anyhow!("Failed to create log folder {:?}: {}", dir, e))?;
        return Ok(dir.to_path_buf());
    }

    let mut candidates = vec![PathBuf::from(SYSTEM_LOG_DIR)];
    if let Some(data) = dirs::data_local_dir() {
        candidates.push(data.join("koozic-installer").join("logs"));
    }

    for candidate in candidates {
        if std::fs::create_dir_all(&candidate).is_ok() {
            return Ok(candidate);
        }
    }

    // Fallback: current working directory (best-effort).
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let log_dir = cwd.join("koozic-installer-logs");
    std::fs::create_dir_all(&log_dir)
        .map_err(|e| anyhow::anyhow!("Failed to create log folder: {}", e))?;
    Ok(log_dir)
}
