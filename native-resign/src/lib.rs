// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Prepare native binaries for redistribution.
//!
//! Binaries that were modified after linking (e.g. to relocate symbols) carry
//! code signatures that no longer match their content. This crate rewrites
//! such binaries so they can be shipped again:
//!
//! 1. The input is parsed and classified ([BinaryImage], [BinaryFormat]).
//! 2. Mach-O binaries have their embedded code signature removed (see
//!    [macho]). Other formats pass through unchanged.
//! 3. The result is written to a destination path.
//! 4. Mach-O output is re-signed in place by `rcodesign`, which is downloaded
//!    on demand into a cache directory (see [codesign_toolchain]).
//!
//! [SigningOrchestrator] ties these steps together.
//!
//! All operations are blocking. Nothing bounds how long a download,
//! extraction, or the signing process may take.

mod error;
pub mod macho;
pub mod orchestrate;
pub mod rewrite;
#[cfg(test)]
mod testutil;

pub use {
    crate::{
        error::ResignError,
        orchestrate::{
            run_signer, CodeSigner, ExitOutcome, HostRcodesign, RcodesignSigner, SigningOrchestrator,
            SigningReport,
        },
        rewrite::{BinaryFormat, BinaryImage},
    },
    codesign_toolchain,
};

use {codesign_toolchain::ToolchainSettings, std::path::PathBuf};

/// Default location of the signing toolchain cache, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = "apple-codesign";

/// Settings for processing binaries.
#[derive(Clone, Debug)]
pub struct ResignSettings {
    /// Directory the signing toolchain is cached in.
    pub cache_dir: PathBuf,
    /// How the signing toolchain is obtained.
    pub toolchain: ToolchainSettings,
    /// Treat a signer exiting unsuccessfully as an error.
    pub require_signing_success: bool,
}

impl Default for ResignSettings {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            toolchain: ToolchainSettings::default(),
            require_signing_success: false,
        }
    }
}

impl ResignSettings {
    /// Construct an orchestrator signing with a host `rcodesign` per these settings.
    pub fn orchestrator(&self) -> SigningOrchestrator<HostRcodesign> {
        SigningOrchestrator::new(HostRcodesign::new(&self.cache_dir, self.toolchain.clone()))
            .require_signing_success(self.require_signing_success)
    }
}
