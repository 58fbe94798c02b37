// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {std::path::PathBuf, thiserror::Error};

/// Unified error type for provisioning the signing toolchain.
#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("unsupported platform: {os} {arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("error fetching release metadata: {0}")]
    MetadataFetch(String),

    #[error("no matching asset found for platform suffix {0}")]
    NoMatchingAsset(String),

    #[error("unknown archive format: {0}")]
    UnknownArchiveFormat(String),

    #[error("error downloading {url}: {message}")]
    Download { url: String, message: String },

    #[error("error extracting archive: {0}")]
    Extraction(String),

    #[error("I/O error on {0}: {1}")]
    PathIo(PathBuf, std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolchainError {
    /// Construct a closure attaching a path to an [std::io::Error].
    pub(crate) fn with_path(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |e| Self::PathIo(path, e)
    }
}
