// Release retrieval and extraction
//
// The manifest's first line is the latest version; the archive for that version is streamed to an
// anonymous temp file (hashing as it goes), then unpacked next to the install dir and renamed.
// No timeout and no retry on the network fetch.

pub mod codec;

use anyhow::{Context, Result};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use sha2::{Digest, Sha256};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::installation::files::sha256_hex;
use crate::utils::validation::validate_release_version;

pub const VERSIONS_URL: &str = "https://raw.githubusercontent.com/DocMarty84/koozic/v2/VERSIONS.md";
pub const DOWNLOAD_BASE_URL: &str = "https://github.com/DocMarty84/koozic/releases/download/";
/// Top-level folder inside every release archive.
pub const ARCHIVE_ROOT_DIR: &str = "koozic";

/// A downloaded archive held in an anonymous temp file.
#[derive(Debug)]
pub struct DownloadedArchive {
    pub file: std::fs::File,
    pub sha256: String,
    pub size: u64,
}

impl DownloadedArchive {
    /// Spool in-memory bytes to a temp file.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut file = tempfile::tempfile().context("Failed to create temporary file")?;
        file.write_all(bytes)
            .context("Failed to write temporary archive")?;
        Ok(Self {
            file,
            sha256: sha256_hex(bytes),
            size: bytes.len() as u64,
        })
    }
}

#[async_trait]
pub trait ReleaseSource: Send + Sync {
    async fn latest_version(&self) -> Result<String>;
    async fn fetch_archive(&self, version: &str) -> Result<DownloadedArchive>;
}

/// First non-blank line of the manifest, trimmed and validated.
pub fn parse_latest_version(manifest: &str) -> Result<String> {
    let first = manifest
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| anyhow::anyhow!("Release manifest is empty"))?;
    validate_release_version(first)?;
    Ok(first.to_string())
}

/// `<base>/<V>/koozic-<V>.tar.gz`
pub fn archive_url(download_base: &Url, version: &str) -> Result<Url> {
    validate_release_version(version)?;
    download_base
        .join(&format!("{v}/koozic-{v}.tar.gz", v = version))
        .with_context(|| format!("Failed to build archive URL for version {}", version))
}

pub struct HttpReleaseSource {
    client: reqwest::Client,
    versions_url: Url,
    download_base: Url,
}

impl HttpReleaseSource {
    pub fn new() -> Result<Self> {
        Self::with_urls(VERSIONS_URL, DOWNLOAD_BASE_URL)
    }

    pub fn with_urls(versions_url: &str, download_base: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("koozic-installer/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            versions_url: Url::parse(versions_url)
                .with_context(|| format!("Invalid manifest URL: {}", versions_url))?,
            download_base: Url::parse(download_base)
                .with_context(|| format!("Invalid download URL: {}", download_base))?,
        })
    }

    async fn get(&self, url: &Url) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Request failed: {}", url))?;
        if !response.status().is_success() {
            anyhow::bail!("Download failed with status {} ({})", response.status(), url);
        }
        Ok(response)
    }
}

fn download_progress(total: Option<u64>) -> Result<ProgressBar> {
    let pb = match total {
        Some(len) => {
            let style = ProgressStyle::default_bar()
                .template("[{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                .context("Invalid progress template")?
                .progress_chars("#>-");
            let pb = ProgressBar::new(len);
            pb.set_style(style);
            pb
        }
        None => {
            let style = ProgressStyle::default_spinner()
                .template("{spinner} {bytes} {msg}")
                .context("Invalid progress template")?;
            let pb = ProgressBar::new_spinner();
            pb.set_style(style);
            pb
        }
    };
    Ok(pb)
}

#[async_trait]
impl ReleaseSource for HttpReleaseSource {
    async fn latest_version(&self) -> Result<String> {
        debug!(
            "[PHASE: release] [STEP: manifest] Fetching {}",
            self.versions_url
        );
        let body = self
            .get(&self.versions_url)
            .await?
            .text()
            .await
            .context("Failed to read release manifest")?;
        parse_latest_version(&body)
    }

    async fn fetch_archive(&self, version: &str) -> Result<DownloadedArchive> {
        let url = archive_url(&self.download_base, version)?;
        info!("[PHASE: release] [STEP: download] Downloading {}", url);

        let mut response = self.get(&url).await?;
        let pb = download_progress(response.content_length())?;
        pb.set_message(format!("koozic-{}.tar.gz", version));

        let spool = tempfile::tempfile().context("Failed to create temporary file")?;
        let mut out = tokio::fs::File::from_std(spool);
        let mut hasher = Sha256::new();
        let mut size: u64 = 0;

        while let Some(chunk) = response
            .chunk()
            .await
            .with_context(|| format!("Download interrupted: {}", url))?
        {
            hasher.update(&chunk);
            out.write_all(&chunk)
                .await
                .context("Failed to write temporary archive")?;
            size = size.saturating_add(chunk.len() as u64);
            pb.set_position(size);
        }
        out.flush().await.context("Failed to flush temporary archive")?;
        pb.finish_and_clear();

        let sha256 = hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<String>();
        Ok(DownloadedArchive {
            file: out.into_std().await,
            sha256,
            size,
        })
    }
}

/// Extract a gzip'd tar stream into `dest`.
pub(crate) fn extract_tar_gz(reader: impl std::io::Read, dest: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    archive.set_preserve_permissions(true);
    archive
        .unpack(dest)
        .with_context(|| format!("Failed to extract archive into {:?}", dest))
}

/// Unpack a release into the parent of `install_dir` and rename its `koozic/` folder.
pub async fn unpack_release(archive: DownloadedArchive, install_dir: &Path) -> Result<PathBuf> {
    let parent = install_dir
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Install directory {:?} has no parent", install_dir))?
        .to_path_buf();
    tokio::fs::create_dir_all(&parent)
        .await
        .with_context(|| format!("Failed to create {:?}", parent))?;

    info!(
        "[PHASE: release] [STEP: extract] Extracting archive (bytes={}, sha256={}) into {:?}",
        archive.size, archive.sha256, parent
    );

    let dest = parent.clone();
    let mut file = archive.file;
    tokio::task::spawn_blocking(move || -> Result<()> {
        file.seek(SeekFrom::Start(0))
            .context("Failed to rewind temporary archive")?;
        extract_tar_gz(std::io::BufReader::new(file), &dest)
    })
    .await
    .context("Extraction task join failed")??;

    let extracted = parent.join(ARCHIVE_ROOT_DIR);
    tokio::fs::rename(&extracted, install_dir)
        .await
        .with_context(|| format!("Failed to move {:?} to {:?}", extracted, install_dir))?;
    Ok(install_dir.to_path_buf())
}

/// Resolve the latest version and download its archive, without touching the install dir.
pub async fn download_latest_release(
    source: &dyn ReleaseSource,
) -> Result<(String, DownloadedArchive)> {
    info!("[PHASE: release] [STEP: download] Downloading the latest KooZic version...");
    let version = source.latest_version().await?;
    info!("[PHASE: release] [STEP: manifest] Latest version is {}", version);
    let archive = source.fetch_archive(&version).await?;
    info!(
        "[PHASE: release] [STEP: download] Downloaded koozic-{}.tar.gz (bytes={}, sha256={})",
        version, archive.size, archive.sha256
    );
    Ok((version, archive))
}

/// Resolve, download and unpack the latest release.
pub async fn fetch_latest_release(source: &dyn ReleaseSource, install_dir: &Path) -> Result<String> {
    let (version, archive) = download_latest_release(source).await?;
    unpack_release(archive, install_dir).await?;
    Ok(version)
}
