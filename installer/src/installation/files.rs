//! File placement helpers.
//!
//! - Async I/O (tokio) where tokio covers it; ownership changes run on the blocking pool
//! - Every failure carries the path in its context
//! - Removal of a path that is already gone is not an error

use anyhow::{Context, Result};
use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::io::AsyncWriteExt;

/// Numeric owner applied to placed files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ownership {
    pub uid: u32,
    pub gid: u32,
}

/// Write `contents` to `path`, then apply `mode` and (optionally) ownership.
///
/// A symlink already sitting at `path` is replaced, never followed.
pub async fn write_owned_file(
    path: &Path,
    contents: &[u8],
    mode: u32,
    owner: Option<Ownership>,
) -> Result<()> {
    debug!(
        "[PHASE: installation] [STEP: files] write_owned_file entered (path={:?}, bytes={}, mode={:o})",
        path,
        contents.len(),
        mode
    );
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }
    if let Ok(meta) = tokio::fs::symlink_metadata(path).await {
        if meta.file_type().is_symlink() {
            warn!(
                "[PHASE: installation] [STEP: files] Replacing symlink at {:?}",
                path
            );
            tokio::fs::remove_file(path)
                .await
                .with_context(|| format!("Failed to remove symlink {:?}", path))?;
        }
    }

    let mut opts = tokio::fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    opts.mode(mode);
    #[cfg(target_os = "linux")]
    opts.custom_flags(libc::O_NOFOLLOW);
    let mut file = opts
        .open(path)
        .await
        .with_context(|| format!("Failed to open {:?} for writing", path))?;
    file.write_all(contents)
        .await
        .with_context(|| format!("Failed to write {:?}", path))?;
    file.flush()
        .await
        .with_context(|| format!("Failed to write {:?}", path))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(mode))
            .await
            .with_context(|| format!("Failed to chmod {:o} {:?}", mode, path))?;
    }
    drop(file);

    if let Some(o) = owner {
        chown_path(path, o).await?;
    }
    Ok(())
}

#[cfg(unix)]
fn chown_one(path: &Path, owner: Ownership) -> Result<()> {
    std::os::unix::fs::lchown(path, Some(owner.uid), Some(owner.gid))
        .with_context(|| format!("Failed to chown {}:{} {:?}", owner.uid, owner.gid, path))
}

#[cfg(not(unix))]
fn chown_one(_path: &Path, _owner: Ownership) -> Result<()> {
    Ok(())
}

/// Change the owner of a single path (symlinks are not followed).
pub async fn chown_path(path: &Path, owner: Ownership) -> Result<()> {
    let p = path.to_path_buf();
    tokio::task::spawn_blocking(move || chown_one(&p, owner))
        .await
        .context("chown task join failed")?
}

/// `chown -R` equivalent. Returns the number of entries changed.
pub async fn chown_recursive(root: &Path, owner: Ownership) -> Result<usize> {
    let started = Instant::now();
    let root_owned = root.to_path_buf();
    let changed = tokio::task::spawn_blocking(move || -> Result<usize> {
        let mut count = 0usize;
        let mut stack: Vec<PathBuf> = vec![root_owned];
        while let Some(p) = stack.pop() {
            chown_one(&p, owner)?;
            count += 1;
            let meta = std::fs::symlink_metadata(&p)
                .with_context(|| format!("stat failed: {:?}", p))?;
            if meta.is_dir() {
                for ent in
                    std::fs::read_dir(&p).with_context(|| format!("read_dir failed: {:?}", p))?
                {
                    stack.push(ent?.path());
                }
            }
        }
        Ok(count)
    })
    .await
    .context("chown task join failed")??;

    info!(
        "[PHASE: installation] [STEP: files] Ownership applied (root={:?}, uid={}, gid={}, entries={}, duration_ms={})",
        root,
        owner.uid,
        owner.gid,
        changed,
        started.elapsed().as_millis()
    );
    Ok(changed)
}

/// Remove a file, symlink or directory tree.
///
/// Returns `false` when nothing existed at `path`.
pub async fn remove_path(path: &Path) -> Result<bool> {
    let meta = match tokio::fs::symlink_metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(
                "[PHASE: installation] [STEP: files] remove_path: nothing to remove (path={:?})",
                path
            );
            return Ok(false);
        }
        Err(e) => {
            return Err(anyhow::Error::new(e)).with_context(|| format!("stat failed: {:?}", path))
        }
    };

    if meta.is_dir() {
        tokio::fs::remove_dir_all(path)
            .await
            .with_context(|| format!("Failed to remove directory {:?}", path))?;
    } else {
        tokio::fs::remove_file(path)
            .await
            .with_context(|| format!("Failed to remove file {:?}", path))?;
    }
    info!(
        "[PHASE: installation] [STEP: files] Removed {:?}",
        path
    );
    Ok(true)
}

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    digest
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::{MetadataExt, PermissionsExt};

    fn own_ids(path: &Path) -> Ownership {
        let m = std::fs::metadata(path).expect("metadata");
        Ownership {
            uid: m.uid(),
            gid: m.gid(),
        }
    }

    #[tokio::test]
    async fn write_owned_file_sets_mode_and_creates_parents() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let owner = own_ids(tmp.path());
        let p = tmp.path().join("home").join(".odoorc");

        write_owned_file(&p, b"[options]\n", 0o640, Some(owner))
            .await
            .expect("write");

        let meta = std::fs::metadata(&p).expect("metadata");
        assert_eq!(meta.permissions().mode() & 0o777, 0o640);
        assert_eq!(meta.uid(), owner.uid);
        assert_eq!(std::fs::read_to_string(&p).expect("read"), "[options]\n");
    }

    #[tokio::test]
    async fn write_owned_file_replaces_planted_symlink() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let owner = own_ids(tmp.path());
        let target = tmp.path().join("shadow");
        std::fs::write(&target, "root:secret\n").expect("target");
        std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o600)).expect("chmod");
        let p = tmp.path().join(".odoorc");
        std::os::unix::fs::symlink(&target, &p).expect("symlink");

        write_owned_file(&p, b"[options]\n", 0o640, Some(owner))
            .await
            .expect("write");

        assert_eq!(std::fs::read_to_string(&target).expect("target"), "root:secret\n");
        let target_meta = std::fs::metadata(&target).expect("metadata");
        assert_eq!(target_meta.permissions().mode() & 0o777, 0o600);
        let meta = std::fs::symlink_metadata(&p).expect("metadata");
        assert!(meta.file_type().is_file());
        assert_eq!(meta.permissions().mode() & 0o777, 0o640);
        assert_eq!(std::fs::read_to_string(&p).expect("read"), "[options]\n");
    }

    #[tokio::test]
    async fn write_owned_file_truncates_existing_contents() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let p = tmp.path().join(".odoorc");
        std::fs::write(&p, "a much longer previous body\n").expect("seed");
        std::fs::set_permissions(&p, std::fs::Permissions::from_mode(0o666)).expect("chmod");

        write_owned_file(&p, b"short\n", 0o640, None).await.expect("write");

        assert_eq!(std::fs::read_to_string(&p).expect("read"), "short\n");
        let meta = std::fs::metadata(&p).expect("metadata");
        assert_eq!(meta.permissions().mode() & 0o777, 0o640);
    }

    #[tokio::test]
    async fn chown_recursive_counts_every_entry() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let owner = own_ids(tmp.path());
        let root = tmp.path().join("koozic-v2");
        std::fs::create_dir_all(root.join("addons/oomusic")).expect("mkdir");
        std::fs::write(root.join("odoo-bin"), "#!/bin/sh\n").expect("write");
        std::fs::write(root.join("addons/oomusic/__init__.py"), "").expect("write");

        let n = chown_recursive(&root, owner).await.expect("chown");
        // root, addons, addons/oomusic, odoo-bin, __init__.py
        assert_eq!(n, 5);
    }

    #[tokio::test]
    async fn remove_path_handles_files_dirs_and_missing() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let f = tmp.path().join("ffmpeg");
        let d = tmp.path().join("koozic-v2");
        std::fs::write(&f, "bin").expect("write");
        std::fs::create_dir_all(d.join("odoo")).expect("mkdir");

        assert!(remove_path(&f).await.expect("file"));
        assert!(remove_path(&d).await.expect("dir"));
        assert!(!f.exists());
        assert!(!d.exists());
        assert!(!remove_path(&f).await.expect("already gone"));
    }

    #[test]
    fn sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
