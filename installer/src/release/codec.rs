// Bundled ffmpeg
//
// Releases ship a static ffmpeg under extra/ffmpeg/*.tar.gz. It is unpacked into the system binary
// directory only when no ffmpeg is found on PATH.

use anyhow::{Context, Result};
use log::info;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::extract_tar_gz;
use crate::installation::files::{chown_path, Ownership};

pub const CODEC_BINARY: &str = "ffmpeg";
pub const SYSTEM_BIN_DIR: &str = "/usr/local/bin";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecOutcome {
    AlreadyOnPath(PathBuf),
    NotBundled,
    Installed(PathBuf),
}

/// First `*.tar.gz` (by name) under `<install_dir>/extra/ffmpeg`.
pub async fn bundled_codec_archive(install_dir: &Path) -> Result<Option<PathBuf>> {
    let dir = install_dir.join("extra").join(CODEC_BINARY);
    let mut rd = match tokio::fs::read_dir(&dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(anyhow::Error::new(e)).with_context(|| format!("read_dir failed: {:?}", dir))
        }
    };
    let mut found = Vec::new();
    while let Some(ent) = rd.next_entry().await? {
        let p = ent.path();
        if p.to_string_lossy().ends_with(".tar.gz") && ent.file_type().await?.is_file() {
            found.push(p);
        }
    }
    found.sort();
    Ok(found.into_iter().next())
}

/// Install the bundled ffmpeg into `bin_dir` unless `ffmpeg` resolves on `search_path`.
pub async fn install_codec_toolset(
    install_dir: &Path,
    bin_dir: &Path,
    search_path: Option<OsString>,
    owner: Ownership,
) -> Result<CodecOutcome> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
    if let Ok(existing) = which::which_in(CODEC_BINARY, search_path, cwd) {
        info!(
            "[PHASE: install] [STEP: codec] ffmpeg already available at {:?}; not copying the bundled one",
            existing
        );
        return Ok(CodecOutcome::AlreadyOnPath(existing));
    }

    let Some(archive) = bundled_codec_archive(install_dir).await? else {
        info!("[PHASE: install] [STEP: codec] Release ships no ffmpeg archive");
        return Ok(CodecOutcome::NotBundled);
    };

    tokio::fs::create_dir_all(bin_dir)
        .await
        .with_context(|| format!("Failed to create {:?}", bin_dir))?;
    let src = archive.clone();
    let dest = bin_dir.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let f = std::fs::File::open(&src).with_context(|| format!("open failed: {:?}", src))?;
        extract_tar_gz(std::io::BufReader::new(f), &dest)
    })
    .await
    .context("Extraction task join failed")??;

    let binary = bin_dir.join(CODEC_BINARY);
    if tokio::fs::symlink_metadata(&binary).await.is_ok() {
        chown_path(&binary, owner).await?;
    }
    info!(
        "[PHASE: install] [STEP: codec] Installed bundled ffmpeg from {:?} to {:?}",
        archive, binary
    );
    Ok(CodecOutcome::Installed(binary))
}
