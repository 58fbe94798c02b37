// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Rewrite a binary and re-sign it when its format requires it.

use {
    crate::{
        error::ResignError,
        rewrite::{BinaryFormat, BinaryImage},
    },
    codesign_toolchain::{
        CachedToolchain, GitHubReleases, Platform, ReleaseSource, ToolchainProvisioner,
        ToolchainSettings,
    },
    log::{info, warn},
    std::{
        ffi::OsString,
        path::{Path, PathBuf},
    },
};

/// The result of running a signing executable.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SigningReport {
    /// Whether the signer exited successfully.
    pub success: bool,
    /// Exit code, if the process exited normally.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Something capable of signing a file in place.
pub trait CodeSigner {
    fn sign(&self, path: &Path) -> Result<SigningReport, ResignError>;
}

/// Run `<executable> sign <path>` to completion, capturing its output.
///
/// Failure to launch the process is an error. A non-zero exit is not: it is
/// logged and reflected in the returned report.
pub fn run_signer(executable: &Path, path: &Path) -> Result<SigningReport, ResignError> {
    info!("signing {}", path.display());

    let args = vec![OsString::from("sign"), path.as_os_str().to_os_string()];

    let output = duct::cmd(executable, args)
        .stdin_null()
        .stdout_capture()
        .stderr_capture()
        .unchecked()
        .run()
        .map_err(|e| {
            ResignError::SigningProcess(format!("running {}: {}", executable.display(), e))
        })?;

    let success = output.status.success();

    for line in String::from_utf8_lossy(&output.stdout).lines() {
        info!("rcodesign> {}", line);
    }
    for line in String::from_utf8_lossy(&output.stderr).lines() {
        if success {
            info!("rcodesign> {}", line);
        } else {
            warn!("rcodesign> {}", line);
        }
    }

    if !success {
        warn!(
            "{} exited with {}; {} may not be signed",
            executable.display(),
            output.status,
            path.display()
        );
    }

    Ok(SigningReport {
        success,
        exit_code: output.status.code(),
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

/// [CodeSigner] running `rcodesign` from a provisioned toolchain cache.
pub struct RcodesignSigner<S: ReleaseSource = GitHubReleases> {
    provisioner: ToolchainProvisioner<S>,
}

impl<S: ReleaseSource> RcodesignSigner<S> {
    pub fn new(provisioner: ToolchainProvisioner<S>) -> Self {
        Self { provisioner }
    }
}

impl<S: ReleaseSource> CodeSigner for RcodesignSigner<S> {
    fn sign(&self, path: &Path) -> Result<SigningReport, ResignError> {
        let toolchain = self.provisioner.ensure()?;

        run_signer(&toolchain.executable_path, path)
    }
}

/// [CodeSigner] provisioning `rcodesign` for the host platform on first use.
///
/// Nothing about the host platform is resolved until something needs signing.
#[derive(Clone, Debug)]
pub struct HostRcodesign {
    cache_dir: PathBuf,
    settings: ToolchainSettings,
}

impl HostRcodesign {
    pub fn new(cache_dir: impl Into<PathBuf>, settings: ToolchainSettings) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            settings,
        }
    }
}

impl CodeSigner for HostRcodesign {
    fn sign(&self, path: &Path) -> Result<SigningReport, ResignError> {
        let toolchain = CachedToolchain::in_dir(&self.cache_dir, Platform::host()?, &self.settings);

        // The HTTP client is only needed when the cache is incomplete.
        if toolchain.is_complete() {
            return run_signer(&toolchain.executable_path, path);
        }

        let provisioner = ToolchainProvisioner::for_host(&self.cache_dir, self.settings.clone())?;

        RcodesignSigner::new(provisioner).sign(path)
    }
}

/// Terminal state of processing a binary.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExitOutcome {
    /// Input was not a recognized binary. Nothing was written.
    Skipped { reason: String },
    /// The image was written and did not need signing.
    Done { format: BinaryFormat },
    /// The image was written and the signer ran.
    Signed { report: SigningReport },
}

impl ExitOutcome {
    /// Process exit code conveying this outcome.
    ///
    /// The signer's own exit status is not reflected here.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Skipped { .. } => 1,
            Self::Done { .. } | Self::Signed { .. } => 0,
        }
    }
}

/// Drives a binary through parsing, signature removal, writing, and signing.
pub struct SigningOrchestrator<C: CodeSigner> {
    signer: C,
    require_signing_success: bool,
}

impl<C: CodeSigner> SigningOrchestrator<C> {
    pub fn new(signer: C) -> Self {
        Self {
            signer,
            require_signing_success: false,
        }
    }

    /// Whether a signer exiting unsuccessfully fails processing.
    ///
    /// Defaults to `false`: the failure is logged and the written binary is
    /// left as the signer left it.
    #[must_use]
    pub fn require_signing_success(mut self, value: bool) -> Self {
        self.require_signing_success = value;
        self
    }

    pub fn signer(&self) -> &C {
        &self.signer
    }

    /// Process raw binary data, writing the result to `dest_path`.
    pub fn process(&self, data: Vec<u8>, dest_path: &Path) -> Result<ExitOutcome, ResignError> {
        let mut image = match BinaryImage::parse(data) {
            Ok(image) => image,
            Err(ResignError::UnparsableBinary(reason)) => {
                warn!("not a recognized binary ({}); nothing written", reason);
                return Ok(ExitOutcome::Skipped { reason });
            }
            Err(e) => return Err(e),
        };

        let format = image.format();

        if format.requires_signing() {
            image.strip_signature()?;
        }

        image.write_to_path(dest_path)?;

        if !format.requires_signing() {
            info!("wrote {} image to {}", format, dest_path.display());
            return Ok(ExitOutcome::Done { format });
        }

        let report = self.signer.sign(dest_path)?;

        if !report.success && self.require_signing_success {
            return Err(ResignError::SigningProcess(format!(
                "signer exited with {}",
                report
                    .exit_code
                    .map(|code| code.to_string())
                    .unwrap_or_else(|| "no exit code".into())
            )));
        }

        Ok(ExitOutcome::Signed { report })
    }
}
