// Absolute system paths the installer reads or writes.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::installation::linux::{AccountDatabase, OS_RELEASE_PATH};
use crate::installation::service::SERVICE_TEMPLATE_NAME;
use crate::release::codec::{CODEC_BINARY, SYSTEM_BIN_DIR};

pub const STATE_FILE: &str = "/etc/koozic-install.conf";
pub const LEGACY_STATE_FILE: &str = "/etc/odoo.conf";
pub const SYSTEMD_UNIT_DIR: &str = "/etc/systemd/system";
pub const PASSWD_FILE: &str = "/etc/passwd";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemLayout {
    pub state_file: PathBuf,
    pub legacy_state_file: PathBuf,
    pub systemd_unit_dir: PathBuf,
    pub codec_bin_dir: PathBuf,
    /// Account resolution: the name service on a real host, a passwd file when re-rooted.
    pub accounts: AccountDatabase,
    pub os_release: PathBuf,
    /// `PATH` value used to look for an existing ffmpeg.
    pub search_path: Option<OsString>,
}

impl SystemLayout {
    pub fn system() -> Self {
        Self {
            state_file: PathBuf::from(STATE_FILE),
            legacy_state_file: PathBuf::from(LEGACY_STATE_FILE),
            systemd_unit_dir: PathBuf::from(SYSTEMD_UNIT_DIR),
            codec_bin_dir: PathBuf::from(SYSTEM_BIN_DIR),
            accounts: AccountDatabase::System,
            os_release: PathBuf::from(OS_RELEASE_PATH),
            search_path: std::env::var_os("PATH"),
        }
    }

    /// Same layout re-rooted under `root` (e.g. a temp dir).
    pub fn rooted_at(root: &Path) -> Self {
        let under = |p: &str| root.join(p.trim_start_matches('/'));
        Self {
            state_file: under(STATE_FILE),
            legacy_state_file: under(LEGACY_STATE_FILE),
            systemd_unit_dir: under(SYSTEMD_UNIT_DIR),
            codec_bin_dir: under(SYSTEM_BIN_DIR),
            accounts: AccountDatabase::PasswdFile(under(PASSWD_FILE)),
            os_release: under(OS_RELEASE_PATH),
            search_path: Some(under("usr/bin").into_os_string()),
        }
    }

    pub fn unit_file(&self) -> PathBuf {
        self.systemd_unit_dir.join(SERVICE_TEMPLATE_NAME)
    }

    pub fn codec_binary(&self) -> PathBuf {
        self.codec_bin_dir.join(CODEC_BINARY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_layout_paths() {
        let l = SystemLayout::system();
        assert_eq!(l.unit_file(), PathBuf::from("/etc/systemd/system/koozic@.service"));
        assert_eq!(l.codec_binary(), PathBuf::from("/usr/local/bin/ffmpeg"));
        assert_eq!(l.state_file, PathBuf::from("/etc/koozic-install.conf"));
        assert_eq!(l.accounts, AccountDatabase::System);
    }

    #[test]
    fn rooted_layout_stays_under_root() {
        let l = SystemLayout::rooted_at(Path::new("/tmp/x"));
        assert_eq!(l.state_file, PathBuf::from("/tmp/x/etc/koozic-install.conf"));
        assert_eq!(l.legacy_state_file, PathBuf::from("/tmp/x/etc/odoo.conf"));
        assert_eq!(l.codec_binary(), PathBuf::from("/tmp/x/usr/local/bin/ffmpeg"));
        assert_eq!(l.search_path, Some(OsString::from("/tmp/x/usr/bin")));
        assert_eq!(
            l.accounts,
            AccountDatabase::PasswdFile(PathBuf::from("/tmp/x/etc/passwd"))
        );
    }
}
