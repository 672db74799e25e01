// Persisted install state
//
// Written once by `install`, read back verbatim by `uninstall` / `upgrade`, deleted by uninstall
// cleanup. A missing or malformed file is fatal; there is no default.

use anyhow::{Context, Result};
use log::{debug, info};
use std::path::{Path, PathBuf};

use crate::error::InstallerError;
use crate::utils::validation::{validate_shell_path, validate_user_name};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallState {
    pub owning_user: String,
    pub install_dir: PathBuf,
}

impl InstallState {
    pub fn new(owning_user: impl Into<String>, install_dir: impl Into<PathBuf>) -> Self {
        Self {
            owning_user: owning_user.into(),
            install_dir: install_dir.into(),
        }
    }

    /// `USER=<name>` / `DIR=<path>` lines.
    pub fn render(&self) -> String {
        format!(
            "USER={}\nDIR={}\n",
            self.owning_user,
            self.install_dir.display()
        )
    }

    /// Parse the state file. Keys are case-insensitive; unknown keys are ignored.
    pub fn parse(contents: &str, path: &Path) -> Result<Self, InstallerError> {
        let malformed = |reason: String| InstallerError::StateMalformed {
            path: path.to_path_buf(),
            reason,
        };

        let mut user: Option<String> = None;
        let mut dir: Option<PathBuf> = None;

        for (idx, raw) in contents.lines().enumerate() {
            if raw.trim().is_empty() {
                continue;
            }
            let Some((key, value)) = raw.split_once('=') else {
                return Err(malformed(format!("line {} has no '='", idx + 1)));
            };
            let value = value.trim_end();
            match key.trim().to_ascii_lowercase().as_str() {
                "user" => user = Some(value.to_string()),
                "dir" => dir = Some(PathBuf::from(value)),
                _ => {}
            }
        }

        let owning_user = user
            .filter(|u| !u.is_empty())
            .ok_or_else(|| malformed("USER is missing or empty".to_string()))?;
        let install_dir = dir
            .filter(|d| !d.as_os_str().is_empty())
            .ok_or_else(|| malformed("DIR is missing or empty".to_string()))?;
        validate_user_name(&owning_user).map_err(|e| malformed(format!("USER: {}", e)))?;
        validate_shell_path(&install_dir).map_err(|e| malformed(format!("DIR: {}", e)))?;

        Ok(Self {
            owning_user,
            install_dir,
        })
    }

    pub async fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        tokio::fs::write(path, self.render())
            .await
            .with_context(|| format!("Failed to write install state {:?}", path))?;
        info!(
            "[PHASE: install] [STEP: state] Persisted install state (path={:?}, user={}, dir={:?})",
            path, self.owning_user, self.install_dir
        );
        Ok(())
    }

    /// Load the state file, first moving a state file left by an older installer into place.
    pub async fn load(path: &Path, legacy_path: &Path) -> Result<Self> {
        if tokio::fs::try_exists(legacy_path).await.unwrap_or(false)
            && !tokio::fs::try_exists(path).await.unwrap_or(false)
        {
            tokio::fs::rename(legacy_path, path)
                .await
                .with_context(|| {
                    format!("Failed to move legacy state {:?} to {:?}", legacy_path, path)
                })?;
            info!(
                "[PHASE: state] [STEP: migrate] Moved legacy state file {:?} to {:?}",
                legacy_path, path
            );
        }

        let contents = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(InstallerError::StateMissing(path.to_path_buf()).into());
            }
            Err(e) => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("Failed to read install state {:?}", path));
            }
        };

        let state = Self::parse(&contents, path)?;
        debug!(
            "[PHASE: state] [STEP: load] Loaded install state (user={}, dir={:?})",
            state.owning_user, state.install_dir
        );
        Ok(state)
    }
}
