// Linux host queries
//
// Thin I/O wrappers around linux_parsers.rs plus the libc calls the installer needs
// (effective uid, account lookup, CPU count, physical memory).

use anyhow::{Context, Result};
use log::debug;
use std::path::{Path, PathBuf};

use crate::error::InstallerError;
use crate::installation::linux_parsers::{
    parse_meminfo_total_kb, parse_os_release, parse_passwd_entry, LinuxDistro, PasswdEntry,
};

pub const OS_RELEASE_PATH: &str = "/etc/os-release";
pub const MEMINFO_PATH: &str = "/proc/meminfo";

#[cfg(target_os = "linux")]
pub fn is_running_as_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(target_os = "linux"))]
pub fn is_running_as_root() -> bool {
    false
}

pub fn require_root() -> Result<(), InstallerError> {
    if is_running_as_root() {
        Ok(())
    } else {
        Err(InstallerError::NotRoot)
    }
}

/// Read and parse os-release. Missing file yields `None` (detection is only a hint).
pub async fn detect_linux_distro(path: &Path) -> Option<LinuxDistro> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Some(parse_os_release(&contents)),
        Err(e) => {
            debug!(
                "[PHASE: preflight] [STEP: distro] os-release unreadable (path={:?}, err={})",
                path, e
            );
            None
        }
    }
}

/// Where account names are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountDatabase {
    /// The host's name service (`getpwnam_r`), so NSS sources like sssd or LDAP are honored.
    System,
    /// A passwd-format file, for hosts rooted in a temp dir.
    PasswdFile(PathBuf),
}

impl AccountDatabase {
    /// Resolve `user`. `Ok(None)` means the account does not exist.
    pub async fn find(&self, user: &str) -> Result<Option<PasswdEntry>> {
        match self {
            AccountDatabase::System => {
                let name = user.to_string();
                tokio::task::spawn_blocking(move || getpwnam(&name))
                    .await
                    .context("Account lookup task join failed")?
            }
            AccountDatabase::PasswdFile(path) => {
                let contents = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read account database {:?}", path))?;
                Ok(parse_passwd_entry(&contents, user))
            }
        }
    }
}

/// Resolve `user`, failing with `UnknownUser` when the account does not exist.
pub async fn lookup_account(accounts: &AccountDatabase, user: &str) -> Result<PasswdEntry> {
    accounts
        .find(user)
        .await?
        .ok_or_else(|| InstallerError::UnknownUser(user.to_string()).into())
}

#[cfg(target_os = "linux")]
fn getpwnam(user: &str) -> Result<Option<PasswdEntry>> {
    use std::ffi::{CStr, CString, OsStr};
    use std::os::unix::ffi::OsStrExt;

    let name = CString::new(user).with_context(|| format!("Invalid account name {:?}", user))?;
    // SAFETY: sysconf only reads a system constant.
    let hint = unsafe { libc::sysconf(libc::_SC_GETPW_R_SIZE_MAX) };
    let mut buf_len = usize::try_from(hint).ok().filter(|n| *n > 0).unwrap_or(1024);

    loop {
        let mut buf: Vec<libc::c_char> = vec![0; buf_len];
        // SAFETY: passwd is plain old data; getpwnam_r fills it before it is read.
        let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
        let mut result: *mut libc::passwd = std::ptr::null_mut();
        // SAFETY: every pointer refers to live, correctly sized storage owned by this frame.
        let rc = unsafe {
            libc::getpwnam_r(
                name.as_ptr(),
                &mut pwd,
                buf.as_mut_ptr(),
                buf.len(),
                &mut result,
            )
        };
        if rc == libc::ERANGE && buf_len < 1 << 20 {
            buf_len *= 2;
            continue;
        }
        if rc != 0 {
            return Err(std::io::Error::from_raw_os_error(rc))
                .with_context(|| format!("getpwnam_r failed for {:?}", user));
        }
        if result.is_null() {
            return Ok(None);
        }
        // SAFETY: on success pw_dir points to a NUL-terminated string inside `buf`.
        let home = unsafe { CStr::from_ptr(pwd.pw_dir) };
        return Ok(Some(PasswdEntry {
            name: user.to_string(),
            uid: pwd.pw_uid,
            gid: pwd.pw_gid,
            home: PathBuf::from(OsStr::from_bytes(home.to_bytes())),
        }));
    }
}

#[cfg(not(target_os = "linux"))]
fn getpwnam(_user: &str) -> Result<Option<PasswdEntry>> {
    Ok(None)
}

/// Online CPU count as reported by the kernel.
#[cfg(target_os = "linux")]
pub fn online_cpu_count() -> Option<u64> {
    // SAFETY: sysconf only reads a system constant.
    let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    u64::try_from(n).ok().filter(|n| *n > 0)
}

#[cfg(not(target_os = "linux"))]
pub fn online_cpu_count() -> Option<u64> {
    std::thread::available_parallelism()
        .ok()
        .map(|n| n.get() as u64)
}

/// Physical memory in bytes (`_SC_PAGESIZE * _SC_PHYS_PAGES`).
#[cfg(target_os = "linux")]
pub fn physical_memory_bytes() -> Option<u64> {
    // SAFETY: sysconf only reads system constants.
    let (page, pages) = unsafe {
        (
            libc::sysconf(libc::_SC_PAGESIZE),
            libc::sysconf(libc::_SC_PHYS_PAGES),
        )
    };
    let page = u64::try_from(page).ok().filter(|n| *n > 0)?;
    let pages = u64::try_from(pages).ok().filter(|n| *n > 0)?;
    page.checked_mul(pages)
}

#[cfg(not(target_os = "linux"))]
pub fn physical_memory_bytes() -> Option<u64> {
    None
}

/// `MemTotal` from a meminfo-format file, in bytes.
pub fn meminfo_total_bytes(path: &Path) -> Option<u64> {
    let contents = std::fs::read_to_string(path).ok()?;
    parse_meminfo_total_kb(&contents)?.checked_mul(1024)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_account_unknown_user() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let passwd = tmp.path().join("passwd");
        std::fs::write(&passwd, "root:x:0:0:root:/root:/bin/bash\n").expect("write");
        let accounts = AccountDatabase::PasswdFile(passwd);

        let err = lookup_account(&accounts, "ghost").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<InstallerError>(),
            Some(InstallerError::UnknownUser(u)) if u == "ghost"
        ));
        assert!(accounts.find("ghost").await.expect("lookup").is_none());
        let root = lookup_account(&accounts, "root").await.expect("root");
        assert_eq!(root.uid, 0);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn system_accounts_resolve_through_name_service() {
        let root = lookup_account(&AccountDatabase::System, "root")
            .await
            .expect("root");
        assert_eq!(root.uid, 0);
        assert_eq!(root.gid, 0);
        assert!(root.home.is_absolute());

        let missing = AccountDatabase::System
            .find("koozic-no-such-account")
            .await
            .expect("lookup");
        assert!(missing.is_none());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn require_root_follows_effective_uid() {
        // SAFETY: geteuid has no preconditions.
        let euid = unsafe { libc::geteuid() };
        match require_root() {
            Ok(()) => assert_eq!(euid, 0),
            Err(e) => {
                assert_ne!(euid, 0);
                assert!(matches!(e, InstallerError::NotRoot));
            }
        }
    }

    #[tokio::test]
    async fn detect_linux_distro_missing_file_is_none() {
        let tmp = tempfile::tempdir().expect("tempdir");
        assert!(detect_linux_distro(&tmp.path().join("os-release")).await.is_none());
    }

    #[test]
    fn meminfo_total_bytes_reads_file() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let p = tmp.path().join("meminfo");
        std::fs::write(&p, "MemTotal:        2048 kB\n").expect("write");
        assert_eq!(meminfo_total_bytes(&p), Some(2048 * 1024));
        assert_eq!(meminfo_total_bytes(&tmp.path().join("nope")), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn live_host_facts_are_positive() {
        assert!(online_cpu_count().unwrap_or(0) >= 1);
        assert!(physical_memory_bytes().unwrap_or(0) > 0);
    }
}
