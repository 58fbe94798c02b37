// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Obtain and cache the `rcodesign` signing toolchain.
//!
//! `rcodesign` is published as per-platform archives attached to GitHub
//! releases of the `apple-platform-rs` project. This crate resolves the archive
//! for a platform, downloads and unpacks it into a cache directory and reports
//! where the signing executable lives.
//!
//! The cache is considered complete when its license file (`COPYING`) exists.
//! This is a cheap check, not an integrity check: a cache whose other files
//! were removed or altered is still reported as complete.

pub mod archive;
mod error;
pub mod platform;
pub mod release;

pub use {
    crate::{
        archive::{extract_archive, install_extracted_tree, ArchiveFormat},
        error::ToolchainError,
        platform::Platform,
        release::{select_asset, GitHubReleases, Release, ReleaseAsset, ReleaseSource},
    },
};

use {
    fs2::FileExt,
    log::{debug, info, warn},
    std::{
        path::{Path, PathBuf},
        time::Duration,
    },
};

/// The GitHub API endpoint describing the latest `apple-platform-rs` release.
pub const LATEST_RELEASE_URL: &str =
    "https://api.github.com/repos/indygreg/apple-platform-rs/releases/latest";

/// Name prefix shared by all `rcodesign` release archives.
pub const ASSET_PREFIX: &str = "apple-codesign-";

/// File whose presence marks the cache as provisioned.
pub const MARKER_FILE: &str = "COPYING";

/// Settings controlling where and how the toolchain is obtained.
#[derive(Clone, Debug)]
pub struct ToolchainSettings {
    /// URL of the "latest release" API endpoint.
    pub release_url: String,
    /// Release assets must start with this prefix.
    pub asset_prefix: String,
    /// Name of the signing executable, without any `.exe` suffix.
    pub executable_name: String,
    /// File whose presence marks a complete cache.
    pub marker_file: String,
    /// `User-Agent` sent with HTTP requests. GitHub rejects requests without one.
    pub user_agent: String,
    /// Optional timeout applied to each HTTP request.
    pub http_timeout: Option<Duration>,
}

impl Default for ToolchainSettings {
    fn default() -> Self {
        Self {
            release_url: LATEST_RELEASE_URL.to_string(),
            asset_prefix: ASSET_PREFIX.to_string(),
            executable_name: "rcodesign".to_string(),
            marker_file: MARKER_FILE.to_string(),
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            http_timeout: None,
        }
    }
}

/// Represents a provisioned toolchain on the filesystem.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CachedToolchain {
    /// Directory holding the toolchain.
    pub path: PathBuf,

    /// Path to the signing executable.
    pub executable_path: PathBuf,

    /// Path to the license file marking the cache as complete.
    pub license_path: PathBuf,
}

impl CachedToolchain {
    /// Resolve the toolchain paths for a platform within a cache directory.
    ///
    /// This does not check whether they exist.
    pub fn in_dir(cache_dir: &Path, platform: Platform, settings: &ToolchainSettings) -> Self {
        let exe_suffix = if platform.is_windows() { ".exe" } else { "" };

        Self {
            path: cache_dir.to_path_buf(),
            executable_path: cache_dir.join(format!("{}{}", settings.executable_name, exe_suffix)),
            license_path: cache_dir.join(&settings.marker_file),
        }
    }

    /// Whether the completeness marker exists.
    pub fn is_complete(&self) -> bool {
        self.license_path.exists()
    }
}

/// Path of the lock file serializing provisioning of `cache_dir`.
///
/// This is a sibling of the cache directory named `<dir>.lock`. `cache_dir`
/// must exist, as it is canonicalized so paths like `.` or `sub/..` resolve
/// to a named directory.
fn lock_path(cache_dir: &Path) -> Result<PathBuf, ToolchainError> {
    let canonical = cache_dir
        .canonicalize()
        .map_err(ToolchainError::with_path(cache_dir))?;

    Ok(match (canonical.parent(), canonical.file_name()) {
        (Some(parent), Some(name)) => {
            let mut name = name.to_os_string();
            name.push(".lock");
            parent.join(name)
        }
        // Filesystem root.
        _ => canonical.join(".lock"),
    })
}

/// Ensures the signing toolchain is present in a cache directory.
pub struct ToolchainProvisioner<S: ReleaseSource = GitHubReleases> {
    cache_dir: PathBuf,
    platform: Platform,
    settings: ToolchainSettings,
    source: S,
}

impl ToolchainProvisioner<GitHubReleases> {
    /// Construct an instance provisioning for the host platform from GitHub.
    pub fn for_host(
        cache_dir: impl Into<PathBuf>,
        settings: ToolchainSettings,
    ) -> Result<Self, ToolchainError> {
        let source = GitHubReleases::new(&settings)?;

        Ok(Self::new(cache_dir, Platform::host()?, settings, source))
    }
}

impl<S: ReleaseSource> ToolchainProvisioner<S> {
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        platform: Platform,
        settings: ToolchainSettings,
        source: S,
    ) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            platform,
            settings,
            source,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Resolve the paths of the toolchain within the cache directory.
    ///
    /// This does not check whether they exist.
    pub fn cached_toolchain(&self) -> CachedToolchain {
        CachedToolchain::in_dir(&self.cache_dir, self.platform, &self.settings)
    }

    /// Whether the cache directory holds the completeness marker.
    pub fn is_cached(&self) -> bool {
        self.cached_toolchain().is_complete()
    }

    /// Ensure the toolchain exists in the cache directory, provisioning it if needed.
    ///
    /// Returns immediately without network access if the cache is complete.
    /// Concurrent callers in different processes are serialized with a lock
    /// file next to the cache directory.
    ///
    /// Files already moved into the cache are not rolled back on failure. But
    /// since the marker file is only checked and never written explicitly, a
    /// failed attempt is retried in full on the next call.
    pub fn ensure(&self) -> Result<CachedToolchain, ToolchainError> {
        let toolchain = self.cached_toolchain();

        if toolchain.is_complete() {
            debug!("{} exists; using cached toolchain", toolchain.license_path.display());
            return Ok(toolchain);
        }

        std::fs::create_dir_all(&self.cache_dir)
            .map_err(ToolchainError::with_path(&self.cache_dir))?;

        let lock_path = lock_path(&self.cache_dir)?;
        let lock = std::fs::File::create(&lock_path)
            .map_err(ToolchainError::with_path(&lock_path))?;
        lock.lock_exclusive()
            .map_err(ToolchainError::with_path(&lock_path))?;

        let res = if toolchain.is_complete() {
            debug!("toolchain provisioned while waiting on {}", lock_path.display());
            Ok(())
        } else {
            self.provision()
        };

        if let Err(e) = lock.unlock() {
            warn!("failed to release {}: {}", lock_path.display(), e);
        }

        res?;

        if toolchain.is_complete() {
            Ok(toolchain)
        } else {
            Err(ToolchainError::Extraction(format!(
                "archive did not provide {}",
                self.settings.marker_file
            )))
        }
    }

    fn provision(&self) -> Result<(), ToolchainError> {
        let release = self.source.latest_release()?;

        if let Some(tag) = &release.tag_name {
            info!("latest release is {}", tag);
        }

        let asset = select_asset(
            release.require_assets()?,
            &self.settings.asset_prefix,
            &self.platform.asset_suffix(),
        )?;
        let format = ArchiveFormat::from_file_name(&asset.name)?;

        let download_dir = tempfile::Builder::new()
            .prefix(".download-")
            .tempdir_in(&self.cache_dir)?;
        let archive_path = download_dir.path().join(&asset.name);

        self.source.download_asset(asset, &archive_path)?;

        let extract_dir = tempfile::Builder::new()
            .prefix(".extract-")
            .tempdir_in(&self.cache_dir)?;

        info!("extracting {}", asset.name);
        extract_archive(format, &archive_path, extract_dir.path())?;

        let installed = install_extracted_tree(extract_dir.path(), &self.cache_dir)?;
        info!(
            "installed {} entries into {}",
            installed.len(),
            self.cache_dir.display()
        );

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let exe = self.cached_toolchain().executable_path;
            if exe.is_file() {
                let mut permissions = std::fs::metadata(&exe)
                    .map_err(ToolchainError::with_path(&exe))?
                    .permissions();
                permissions.set_mode(permissions.mode() | 0o755);
                std::fs::set_permissions(&exe, permissions)
                    .map_err(ToolchainError::with_path(&exe))?;
            }
        }

        extract_dir.close()?;
        download_dir.close()?;

        Ok(())
    }
}
