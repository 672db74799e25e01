// Installer settings
//
// Layering (lowest -> highest precedence):
//   built-in defaults -> /etc/koozic-installer.toml (or --config) -> KOOZIC_INSTALLER_* env -> CLI flags
//
// Resolved once at startup into an immutable `InstallerSettings` that is passed by reference.

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::InstallerError;
use crate::installation::FailurePolicy;
use crate::platform::PlatformFamily;
use crate::utils::validation::{validate_base_directory, validate_user_name};

pub const DEFAULT_SETTINGS_FILE: &str = "/etc/koozic-installer.toml";
pub const ENV_PREFIX: &str = "KOOZIC_INSTALLER";

/// Folder created under the base directory; also the database name.
pub const INSTALL_DIR_NAME: &str = "koozic-v2";

#[derive(Debug, Clone, Deserialize)]
pub struct InstallerSettings {
    /// Account the application runs as.
    pub user: String,
    /// Base directory; the install folder is `<directory>/koozic-v2`.
    pub directory: PathBuf,
    /// OS family; when unset the operator is asked.
    #[serde(default)]
    pub os: Option<PlatformFamily>,
    /// Escalate package-manager / service-control failures to fatal errors.
    pub fail_fast: bool,
    pub command_timeout_secs: u64,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

/// Values given on the command line. `None` / `false` means "not given".
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub user: Option<String>,
    pub directory: Option<PathBuf>,
    pub os: Option<PlatformFamily>,
    pub fail_fast: bool,
    pub log_dir: Option<PathBuf>,
}

impl InstallerSettings {
    pub fn install_dir(&self) -> PathBuf {
        self.directory.join(INSTALL_DIR_NAME)
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        if self.fail_fast {
            FailurePolicy::FailFast
        } else {
            FailurePolicy::BestEffort
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs.max(1))
    }

    pub fn validate(&self) -> Result<(), InstallerError> {
        validate_user_name(&self.user)
            .map_err(|e| InstallerError::InvalidSetting(e.to_string()))?;
        validate_base_directory(&self.directory)
            .map_err(|e| InstallerError::InvalidSetting(e.to_string()))?;
        Ok(())
    }
}

/// Build settings from all layers.
///
/// `file_required` is true when the operator named the file explicitly (`--config`).
pub fn load_settings(
    file: &Path,
    file_required: bool,
    env_prefix: &str,
    overrides: &SettingsOverrides,
) -> Result<InstallerSettings> {
    let file_name = file.to_string_lossy().into_owned();

    let builder = Config::builder()
        .set_default("user", "root")?
        .set_default("directory", "/opt")?
        .set_default("fail_fast", false)?
        .set_default("command_timeout_secs", 3600_i64)?
        .add_source(File::new(&file_name, FileFormat::Toml).required(file_required))
        .add_source(Environment::with_prefix(env_prefix).try_parsing(true))
        .set_override_option("user", overrides.user.clone())?
        .set_override_option(
            "directory",
            overrides
                .directory
                .as_ref()
                .map(|d| d.to_string_lossy().into_owned()),
        )?
        .set_override_option("os", overrides.os.map(|f| f.as_str().to_string()))?
        .set_override_option("fail_fast", overrides.fail_fast.then_some(true))?
        .set_override_option(
            "log_dir",
            overrides
                .log_dir
                .as_ref()
                .map(|d| d.to_string_lossy().into_owned()),
        )?;

    let settings: InstallerSettings = builder
        .build()
        .with_context(|| format!("Failed to read installer settings ({})", file_name))?
        .try_deserialize()
        .context("Invalid installer settings")?;

    settings.validate()?;
    Ok(settings)
}
