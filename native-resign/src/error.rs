// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {codesign_toolchain::ToolchainError, std::path::PathBuf, thiserror::Error};

/// Unified error type for rewriting and re-signing binaries.
#[derive(Debug, Error)]
pub enum ResignError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("input is not a recognized binary: {0}")]
    UnparsableBinary(String),

    #[error("binary parsing error: {0}")]
    Goblin(#[from] goblin::error::Error),

    #[error("data structure write error: {0}")]
    Scroll(#[from] scroll::Error),

    #[error("invalid Mach-O binary: {0}")]
    InvalidBinary(String),

    #[error("unable to locate __LINKEDIT segment")]
    MissingLinkedit,

    #[error("binary contains data after its code signature")]
    DataAfterSignature,

    #[error("I/O error on {0}: {1}")]
    PathIo(PathBuf, std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("signing toolchain error: {0}")]
    Toolchain(#[from] ToolchainError),

    #[error("signing process error: {0}")]
    SigningProcess(String),
}
