// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parse, classify, and rewrite binary images.

use {
    crate::{error::ResignError, macho},
    goblin::{mach::Mach, Object},
    log::{debug, info},
    std::path::Path,
};

/// The kind of binary an image was recognized as.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BinaryFormat {
    /// Mach-O, thin or universal. Carries an embedded code signature.
    MachO,
    Elf,
    Pe,
    /// A container the parser recognizes that is not an executable image
    /// of the other kinds, such as a static library archive.
    Unknown,
}

impl BinaryFormat {
    /// Whether images of this format need to be re-signed after rewriting.
    pub fn requires_signing(&self) -> bool {
        matches!(self, Self::MachO)
    }
}

impl std::fmt::Display for BinaryFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::MachO => "Mach-O",
            Self::Elf => "ELF",
            Self::Pe => "PE",
            Self::Unknown => "unknown",
        })
    }
}

/// A parsed binary image.
#[derive(Clone, Debug)]
pub struct BinaryImage {
    data: Vec<u8>,
    format: BinaryFormat,
    universal: bool,
    has_signature: bool,
}

impl BinaryImage {
    /// Parse raw bytes into an image.
    ///
    /// Fails with [ResignError::UnparsableBinary] if the data is not a
    /// recognized binary.
    pub fn parse(data: Vec<u8>) -> Result<Self, ResignError> {
        let (format, universal, has_signature) = match Object::parse(&data) {
            Ok(Object::Mach(mach)) => {
                let universal = matches!(mach, Mach::Fat(_));
                let has_signature = macho::has_code_signature(&data)
                    .map_err(|e| ResignError::UnparsableBinary(e.to_string()))?;

                (BinaryFormat::MachO, universal, has_signature)
            }
            Ok(Object::Elf(_)) => (BinaryFormat::Elf, false, false),
            Ok(Object::PE(_)) => (BinaryFormat::Pe, false, false),
            Ok(Object::Archive(_)) => (BinaryFormat::Unknown, false, false),
            Ok(Object::Unknown(magic)) => {
                return Err(ResignError::UnparsableBinary(format!(
                    "unknown magic {:#x}",
                    magic
                )))
            }
            Err(e) => return Err(ResignError::UnparsableBinary(e.to_string())),
        };

        debug!(
            "parsed {} byte {} image (universal: {}, signed: {})",
            data.len(),
            format,
            universal,
            has_signature
        );

        Ok(Self {
            data,
            format,
            universal,
            has_signature,
        })
    }

    pub fn format(&self) -> BinaryFormat {
        self.format
    }

    /// Whether this is a universal (fat) Mach-O binary.
    pub fn is_universal(&self) -> bool {
        self.universal
    }

    /// Whether the image carries an embedded code signature.
    pub fn has_signature(&self) -> bool {
        self.has_signature
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Remove any embedded code signature.
    ///
    /// Only Mach-O images are affected. Returns whether a signature was removed.
    pub fn strip_signature(&mut self) -> Result<bool, ResignError> {
        if self.format != BinaryFormat::MachO || !self.has_signature {
            return Ok(false);
        }

        let stripped = macho::strip_code_signature(&self.data)?;
        info!(
            "removed code signature ({} -> {} bytes)",
            self.data.len(),
            stripped.len()
        );

        self.data = stripped;
        self.has_signature = false;

        Ok(true)
    }

    /// Write the image to a path, replacing any existing file.
    pub fn write_to_path(self, path: &Path) -> Result<(), ResignError> {
        std::fs::write(path, &self.data).map_err(|e| ResignError::PathIo(path.to_path_buf(), e))?;
        debug!("wrote {} bytes to {}", self.data.len(), path.display());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::testutil::{fat_macho, thin_macho, CPU_TYPE_ARM64, CPU_TYPE_X86_64},
    };

    #[test]
    fn classify_macho() -> Result<(), ResignError> {
        let image = BinaryImage::parse(thin_macho(CPU_TYPE_ARM64, Some(b"signature")))?;
        assert_eq!(image.format(), BinaryFormat::MachO);
        assert!(image.format().requires_signing());
        assert!(!image.is_universal());
        assert!(image.has_signature());

        let image = BinaryImage::parse(fat_macho(&[
            thin_macho(CPU_TYPE_X86_64, None),
            thin_macho(CPU_TYPE_ARM64, None),
        ]))?;
        assert_eq!(image.format(), BinaryFormat::MachO);
        assert!(image.is_universal());
        assert!(!image.has_signature());

        Ok(())
    }

    #[test]
    fn unparsable_input() {
        for data in [
            b"hello, world! this is not a binary".to_vec(),
            vec![],
            vec![0x7f],
        ] {
            assert!(matches!(
                BinaryImage::parse(data),
                Err(ResignError::UnparsableBinary(_))
            ));
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn elf_roundtrip() -> Result<(), ResignError> {
        let data = std::fs::read(std::env::current_exe()?)?;

        let mut image = BinaryImage::parse(data.clone())?;
        assert_eq!(image.format(), BinaryFormat::Elf);
        assert!(!image.format().requires_signing());

        assert!(!image.strip_signature()?);

        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("binary");
        image.write_to_path(&path)?;
        assert_eq!(std::fs::read(&path)?, data);

        Ok(())
    }

    #[test]
    fn strip_and_write_macho() -> Result<(), ResignError> {
        let mut image = BinaryImage::parse(thin_macho(CPU_TYPE_ARM64, Some(&[0xfa; 0x20])))?;

        assert!(image.strip_signature()?);
        assert!(!image.has_signature());
        assert!(!image.strip_signature()?);

        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("binary");
        std::fs::write(&path, b"existing content")?;

        image.write_to_path(&path)?;
        assert_eq!(std::fs::read(&path)?, thin_macho(CPU_TYPE_ARM64, None));

        Ok(())
    }

    #[test]
    fn unsigned_macho_roundtrip() -> Result<(), ResignError> {
        let data = thin_macho(CPU_TYPE_X86_64, None);

        let mut image = BinaryImage::parse(data.clone())?;
        assert!(!image.strip_signature()?);
        assert_eq!(image.as_bytes(), data.as_slice());

        Ok(())
    }
}
