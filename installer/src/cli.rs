// Command-line surface

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::models::settings::SettingsOverrides;
use crate::platform::PlatformFamily;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Install,
    Uninstall,
    Upgrade,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Install => "install",
            Mode::Uninstall => "uninstall",
            Mode::Upgrade => "upgrade",
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "koozic-installer", version, about = "KooZic (un)-installer")]
pub struct Cli {
    /// install, uninstall or upgrade
    #[arg(value_enum)]
    pub mode: Mode,

    /// User running KooZic [default: root]
    #[arg(short, long)]
    pub user: Option<String>,

    /// Base install directory; KooZic goes into <DIRECTORY>/koozic-v2 [default: /opt]
    #[arg(short, long)]
    pub directory: Option<PathBuf>,

    /// Operating system family; asked interactively when not given
    #[arg(long, value_enum)]
    pub os: Option<PlatformFamily>,

    /// Abort on the first failed package-manager, database or service command
    #[arg(long)]
    pub fail_fast: bool,

    /// Settings file [default: /etc/koozic-installer.toml, optional]
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Folder for the run's log files
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,
}

impl Cli {
    pub fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            user: self.user.clone(),
            directory: self.directory.clone(),
            os: self.os,
            fail_fast: self.fail_fast,
            log_dir: self.log_dir.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_is_required() {
        assert!(Cli::try_parse_from(["koozic-installer"]).is_err());
        assert!(Cli::try_parse_from(["koozic-installer", "reinstall"]).is_err());
    }

    #[test]
    fn flags_map_to_overrides() {
        let cli = Cli::try_parse_from([
            "koozic-installer",
            "install",
            "-u",
            "media",
            "--directory",
            "/srv",
            "--os",
            "suse",
            "--fail-fast",
        ])
        .expect("parse");
        assert_eq!(cli.mode, Mode::Install);
        let o = cli.overrides();
        assert_eq!(o.user.as_deref(), Some("media"));
        assert_eq!(o.directory, Some(PathBuf::from("/srv")));
        assert_eq!(o.os, Some(PlatformFamily::Suse));
        assert!(o.fail_fast);
        assert_eq!(o.log_dir, None);
    }

    #[test]
    fn unset_flags_stay_unset() {
        let cli = Cli::try_parse_from(["koozic-installer", "upgrade"]).expect("parse");
        assert_eq!(cli.mode.as_str(), "upgrade");
        let o = cli.overrides();
        assert!(o.user.is_none());
        assert!(o.directory.is_none());
        assert!(o.os.is_none());
        assert!(!o.fail_fast);
    }
}
