// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Release archive extraction.

use {
    crate::error::ToolchainError,
    log::debug,
    std::{
        fs::File,
        io::{BufReader, Read, Seek},
        path::{Path, PathBuf},
    },
};

/// Container formats release archives are published in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ArchiveFormat {
    /// Gzip compressed tar.
    TarGz,
    Zip,
}

impl ArchiveFormat {
    /// Infer the archive format from a file name suffix.
    pub fn from_file_name(name: &str) -> Result<Self, ToolchainError> {
        if name.ends_with(".zip") {
            Ok(Self::Zip)
        } else if name.ends_with(".tar.gz") {
            Ok(Self::TarGz)
        } else {
            Err(ToolchainError::UnknownArchiveFormat(name.to_string()))
        }
    }

    /// File name extension, including the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::TarGz => ".tar.gz",
            Self::Zip => ".zip",
        }
    }
}

/// Extract the archive at `archive_path` into `dest_dir`.
///
/// Entries whose paths would land outside `dest_dir` are rejected.
pub fn extract_archive(
    format: ArchiveFormat,
    archive_path: &Path,
    dest_dir: &Path,
) -> Result<(), ToolchainError> {
    let fh = File::open(archive_path).map_err(ToolchainError::with_path(archive_path))?;

    match format {
        ArchiveFormat::TarGz => extract_tar_gz(BufReader::new(fh), dest_dir),
        ArchiveFormat::Zip => extract_zip(BufReader::new(fh), dest_dir),
    }
}

fn extract_tar_gz(reader: impl Read, dest_dir: &Path) -> Result<(), ToolchainError> {
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(reader));

    let entries = archive
        .entries()
        .map_err(|e| ToolchainError::Extraction(format!("reading tar entries: {}", e)))?;

    for entry in entries {
        let mut entry = entry
            .map_err(|e| ToolchainError::Extraction(format!("resolving tar entry: {}", e)))?;

        let path = entry
            .path()
            .map_err(|e| ToolchainError::Extraction(format!("resolving entry path: {}", e)))?
            .to_path_buf();

        debug!("extracting {}", path.display());

        let unpacked = entry.unpack_in(dest_dir).map_err(|e| {
            ToolchainError::Extraction(format!("unpacking {}: {}", path.display(), e))
        })?;

        if !unpacked {
            return Err(ToolchainError::Extraction(format!(
                "archive entry escapes destination: {}",
                path.display()
            )));
        }
    }

    Ok(())
}

fn extract_zip(reader: impl Read + Seek, dest_dir: &Path) -> Result<(), ToolchainError> {
    let mut za = zip::ZipArchive::new(reader)
        .map_err(|e| ToolchainError::Extraction(format!("reading zip archive: {}", e)))?;

    for i in 0..za.len() {
        let mut file = za
            .by_index(i)
            .map_err(|e| ToolchainError::Extraction(format!("resolving zip entry {}: {}", i, e)))?;

        let rel_path = file.enclosed_name().map(|p| p.to_path_buf()).ok_or_else(|| {
            ToolchainError::Extraction(format!(
                "archive entry escapes destination: {}",
                file.name()
            ))
        })?;
        let dest_path = dest_dir.join(&rel_path);

        debug!("extracting {}", rel_path.display());

        if file.is_dir() {
            std::fs::create_dir_all(&dest_path).map_err(ToolchainError::with_path(&dest_path))?;
            continue;
        }

        if let Some(parent) = dest_path.parent() {
            std::fs::create_dir_all(parent).map_err(ToolchainError::with_path(parent))?;
        }

        let mut fh = File::create(&dest_path).map_err(ToolchainError::with_path(&dest_path))?;
        std::io::copy(&mut file, &mut fh).map_err(|e| {
            ToolchainError::Extraction(format!("unpacking {}: {}", rel_path.display(), e))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            if let Some(mode) = file.unix_mode() {
                std::fs::set_permissions(
                    &dest_path,
                    std::fs::Permissions::from_mode(mode & 0o777),
                )
                .map_err(ToolchainError::with_path(&dest_path))?;
            }
        }
    }

    Ok(())
}

/// Move the contents of the single top-level directory in `extract_dir` into `dest_dir`.
///
/// Existing files or directories in `dest_dir` with the same name are replaced.
///
/// Returns the destination paths that were installed.
pub fn install_extracted_tree(
    extract_dir: &Path,
    dest_dir: &Path,
) -> Result<Vec<PathBuf>, ToolchainError> {
    let mut top_level = std::fs::read_dir(extract_dir)
        .map_err(ToolchainError::with_path(extract_dir))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(ToolchainError::with_path(extract_dir))?;

    let root = match top_level.pop() {
        Some(entry) if top_level.is_empty() && entry.path().is_dir() => entry.path(),
        _ => {
            return Err(ToolchainError::Extraction(
                "archive does not contain exactly one top-level directory".into(),
            ))
        }
    };

    let mut entries = std::fs::read_dir(&root)
        .map_err(ToolchainError::with_path(&root))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(ToolchainError::with_path(&root))?;
    entries.sort_by_key(|entry| entry.file_name());

    let mut installed = Vec::with_capacity(entries.len());

    for entry in entries {
        let source = entry.path();
        let target = dest_dir.join(entry.file_name());

        if target.is_dir() {
            std::fs::remove_dir_all(&target).map_err(ToolchainError::with_path(&target))?;
        } else if target.exists() {
            std::fs::remove_file(&target).map_err(ToolchainError::with_path(&target))?;
        }

        debug!("installing {}", target.display());
        std::fs::rename(&source, &target).map_err(ToolchainError::with_path(&target))?;
        installed.push(target);
    }

    Ok(installed)
}
