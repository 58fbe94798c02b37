// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Map host operating systems and architectures to toolchain targets.

use crate::{archive::ArchiveFormat, error::ToolchainError};

/// A platform the signing toolchain publishes release artifacts for.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Platform {
    triple: &'static str,
    archive_format: ArchiveFormat,
}

impl Platform {
    /// Resolve the platform from an operating system and CPU architecture name.
    ///
    /// Operating system names are matched case-sensitively. Both the values of
    /// [std::env::consts::OS] (`macos`, `linux`, `windows`) and `uname` style
    /// names (`Darwin`, `Linux`, `Windows`) are recognized.
    pub fn identify(os: &str, arch: &str) -> Result<Self, ToolchainError> {
        let (triple, archive_format) = match os {
            "macos" | "Darwin" => {
                if arch == "arm64" || arch == "aarch64" {
                    ("aarch64-apple-darwin", ArchiveFormat::TarGz)
                } else {
                    ("x86_64-apple-darwin", ArchiveFormat::TarGz)
                }
            }
            "linux" | "Linux" => {
                if arch == "aarch64" {
                    ("aarch64-unknown-linux-musl", ArchiveFormat::TarGz)
                } else {
                    ("x86_64-unknown-linux-musl", ArchiveFormat::TarGz)
                }
            }
            "windows" | "Windows" => {
                if arch.ends_with("64") {
                    ("x86_64-pc-windows-msvc", ArchiveFormat::Zip)
                } else {
                    ("i686-pc-windows-msvc", ArchiveFormat::Zip)
                }
            }
            _ => {
                return Err(ToolchainError::UnsupportedPlatform {
                    os: os.to_string(),
                    arch: arch.to_string(),
                })
            }
        };

        Ok(Self {
            triple,
            archive_format,
        })
    }

    /// Resolve the platform of the running process.
    pub fn host() -> Result<Self, ToolchainError> {
        Self::identify(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// The Rust target triple of this platform.
    pub fn triple(&self) -> &'static str {
        self.triple
    }

    /// The container format release archives use for this platform.
    pub fn archive_format(&self) -> ArchiveFormat {
        self.archive_format
    }

    /// Whether executables on this platform carry an `.exe` suffix.
    pub fn is_windows(&self) -> bool {
        self.triple.contains("-windows-")
    }

    /// The suffix of release asset names built for this platform.
    ///
    /// e.g. `-x86_64-unknown-linux-musl.tar.gz`.
    pub fn asset_suffix(&self) -> String {
        format!("-{}{}", self.triple, self.archive_format.extension())
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.triple)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triple(os: &str, arch: &str) -> &'static str {
        Platform::identify(os, arch).unwrap().triple()
    }

    #[test]
    fn macos() {
        assert_eq!(triple("Darwin", "arm64"), "aarch64-apple-darwin");
        assert_eq!(triple("Darwin", "x86_64"), "x86_64-apple-darwin");
        assert_eq!(triple("macos", "aarch64"), "aarch64-apple-darwin");
        assert_eq!(triple("macos", "x86_64"), "x86_64-apple-darwin");
    }

    #[test]
    fn linux() {
        assert_eq!(triple("Linux", "aarch64"), "aarch64-unknown-linux-musl");
        assert_eq!(triple("Linux", "x86_64"), "x86_64-unknown-linux-musl");
        assert_eq!(triple("linux", "riscv64"), "x86_64-unknown-linux-musl");
        // arm64 is only the macOS spelling.
        assert_eq!(triple("Linux", "arm64"), "x86_64-unknown-linux-musl");
    }

    #[test]
    fn windows() {
        assert_eq!(triple("Windows", "AMD64"), "x86_64-pc-windows-msvc");
        assert_eq!(triple("windows", "x86_64"), "x86_64-pc-windows-msvc");
        assert_eq!(triple("Windows", "ARM64"), "x86_64-pc-windows-msvc");
        assert_eq!(triple("Windows", "x86"), "i686-pc-windows-msvc");
        assert_eq!(triple("windows", "i686"), "i686-pc-windows-msvc");
    }

    #[test]
    fn unsupported() {
        for (os, arch) in [
            ("freebsd", "x86_64"),
            ("darwin", "arm64"),
            ("LINUX", "aarch64"),
            ("", ""),
        ] {
            assert!(matches!(
                Platform::identify(os, arch),
                Err(ToolchainError::UnsupportedPlatform { .. })
            ));
        }
    }

    #[test]
    fn archive_suffixes() {
        assert_eq!(
            Platform::identify("Linux", "x86_64").unwrap().asset_suffix(),
            "-x86_64-unknown-linux-musl.tar.gz"
        );
        assert_eq!(
            Platform::identify("Darwin", "arm64").unwrap().asset_suffix(),
            "-aarch64-apple-darwin.tar.gz"
        );

        let windows = Platform::identify("Windows", "x86").unwrap();
        assert_eq!(windows.archive_format(), ArchiveFormat::Zip);
        assert_eq!(windows.asset_suffix(), "-i686-pc-windows-msvc.zip");
        assert!(windows.is_windows());
    }

    #[test]
    fn host_is_supported() {
        if cfg!(any(
            target_os = "macos",
            target_os = "linux",
            target_os = "windows"
        )) {
            assert!(Platform::host().is_ok());
        }
    }
}
