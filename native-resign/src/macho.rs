// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Mach-O code signature removal.

An `LC_CODE_SIGNATURE` load command in the Mach-O header points at signature
data at the end of the `__LINKEDIT` segment. Removing the signature means
dropping that load command, shrinking `__LINKEDIT` and truncating the file
where the signature data began.

Universal (fat) binaries are handled by stripping each architecture slice
and reassembling the fat container.
*/

use {
    crate::error::ResignError,
    goblin::mach::{
        constants::SEG_LINKEDIT,
        fat::{FatArch, FAT_MAGIC, SIZEOF_FAT_ARCH, SIZEOF_FAT_HEADER},
        load_command::{CommandVariant, LinkeditDataCommand, SegmentCommand32, SegmentCommand64},
        parse_magic_and_ctx, Mach, MachO,
    },
    log::debug,
    scroll::{ctx::SizeWith, IOwrite, Pwrite},
    std::io::Write,
};

/// Resolve the code signature load command and its file offset.
pub fn code_signature_load_command(macho: &MachO) -> Option<(usize, LinkeditDataCommand)> {
    macho.load_commands.iter().find_map(|lc| {
        if let CommandVariant::CodeSignature(command) = lc.command {
            Some((lc.offset, command))
        } else {
            None
        }
    })
}

fn arch_data<'a>(data: &'a [u8], arch: &FatArch) -> Result<&'a [u8], ResignError> {
    let start = arch.offset as usize;
    let end = start + arch.size as usize;

    data.get(start..end).ok_or_else(|| {
        ResignError::InvalidBinary(format!(
            "universal binary slice {:#x}..{:#x} exceeds file size",
            start, end
        ))
    })
}

/// Whether any Mach-O binary within `data` carries an embedded signature.
pub fn has_code_signature(data: &[u8]) -> Result<bool, ResignError> {
    match Mach::parse(data)? {
        Mach::Binary(macho) => Ok(code_signature_load_command(&macho).is_some()),
        Mach::Fat(multiarch) => {
            for arch in multiarch.iter_arches() {
                let macho = MachO::parse(arch_data(data, &arch?)?, 0)?;

                if code_signature_load_command(&macho).is_some() {
                    return Ok(true);
                }
            }

            Ok(false)
        }
    }
}

/// Derive a Mach-O binary without its code signature.
///
/// Returns a copy of the input if there is no signature.
pub fn macho_without_signature(macho_data: &[u8], macho: &MachO) -> Result<Vec<u8>, ResignError> {
    let (command_offset, signature) = match code_signature_load_command(macho) {
        Some(v) => v,
        None => return Ok(macho_data.to_vec()),
    };

    let linkedit = macho
        .segments
        .iter()
        .find(|segment| matches!(segment.name(), Ok(SEG_LINKEDIT)))
        .ok_or(ResignError::MissingLinkedit)?;

    let linkedit_start = linkedit.fileoff as usize;
    let linkedit_end = linkedit_start + linkedit.filesize as usize;
    let signature_start = signature.dataoff as usize;
    let signature_end = signature_start + signature.datasize as usize;

    if signature_start < linkedit_start || signature_end > macho_data.len() {
        return Err(ResignError::InvalidBinary(
            "code signature data is not within __LINKEDIT".into(),
        ));
    }

    // Nothing may follow the signature. Otherwise we would need to rewrite
    // offsets pointing at that data.
    if signature_end != linkedit_end || signature_end != macho_data.len() {
        return Err(ResignError::DataAfterSignature);
    }

    debug!(
        "removing {} byte code signature at {:#x} (load command at {:#x})",
        signature.datasize, signature_start, command_offset
    );

    // Mach-O data structures are variable endian. So use the endian defined
    // by the magic when writing.
    let ctx = parse_magic_and_ctx(macho_data, 0)?
        .1
        .ok_or_else(|| ResignError::InvalidBinary("unable to resolve Mach-O context".into()))?;

    let mut header = macho.header;
    header.ncmds -= 1;
    header.sizeofcmds = header
        .sizeofcmds
        .checked_sub(signature.cmdsize)
        .ok_or_else(|| ResignError::InvalidBinary("load command sizes are inconsistent".into()))?;

    let mut cursor = std::io::Cursor::new(Vec::<u8>::with_capacity(signature_start));
    cursor.iowrite_with(header, ctx)?;

    let load_commands_end = cursor.position() as usize + macho.header.sizeofcmds as usize;
    if load_commands_end > signature_start {
        return Err(ResignError::InvalidBinary(
            "load commands overlap signature data".into(),
        ));
    }

    let new_linkedit_size = signature_start - linkedit_start;

    for load_command in &macho.load_commands {
        let original_command_data = macho_data
            .get(load_command.offset..load_command.offset + load_command.command.cmdsize())
            .ok_or_else(|| ResignError::InvalidBinary("load command out of bounds".into()))?;

        let written_len = match &load_command.command {
            CommandVariant::CodeSignature(_) => continue,
            CommandVariant::Segment32(segment) if matches!(segment.name(), Ok(SEG_LINKEDIT)) => {
                let mut segment = *segment;
                segment.filesize = new_linkedit_size as _;
                cursor.iowrite_with(segment, ctx.le)?;

                SegmentCommand32::size_with(&ctx.le)
            }
            CommandVariant::Segment64(segment) if matches!(segment.name(), Ok(SEG_LINKEDIT)) => {
                let mut segment = *segment;
                segment.filesize = new_linkedit_size as _;
                cursor.iowrite_with(segment, ctx.le)?;

                SegmentCommand64::size_with(&ctx.le)
            }
            _ => 0,
        };

        // Section headers following segment commands are carried over unchanged.
        cursor.write_all(&original_command_data[written_len..])?;
    }

    // Zero the space the removed command occupied so nothing after the
    // load commands moves.
    cursor.write_all(&b"\0".repeat(signature.cmdsize as usize))?;

    if cursor.position() as usize != load_commands_end {
        return Err(ResignError::InvalidBinary(
            "load commands are not contiguous".into(),
        ));
    }

    cursor.write_all(&macho_data[load_commands_end..signature_start])?;

    Ok(cursor.into_inner())
}

/// Remove code signatures from a thin or universal Mach-O binary.
///
/// Input without any signature is returned unchanged.
pub fn strip_code_signature(data: &[u8]) -> Result<Vec<u8>, ResignError> {
    match Mach::parse(data)? {
        Mach::Binary(macho) => macho_without_signature(data, &macho),
        Mach::Fat(multiarch) => {
            let mut slices = vec![];
            let mut modified = false;

            for (index, arch) in multiarch.iter_arches().enumerate() {
                let arch = arch?;
                let slice = arch_data(data, &arch)?;
                let macho = MachO::parse(slice, 0)?;

                if code_signature_load_command(&macho).is_some() {
                    debug!("stripping signature of universal binary slice {}", index);
                    modified = true;
                    slices.push((arch, macho_without_signature(slice, &macho)?));
                } else {
                    slices.push((arch, slice.to_vec()));
                }
            }

            if !modified {
                return Ok(data.to_vec());
            }

            let mut writer = vec![];
            write_universal_macho(&mut writer, &slices)?;

            Ok(writer)
        }
    }
}

/// Write a universal Mach-O binary from architecture records and their data.
///
/// CPU type, subtype, and alignment of each record are preserved. Offsets and
/// sizes are recomputed.
pub fn write_universal_macho(
    writer: &mut impl Write,
    slices: &[(FatArch, Vec<u8>)],
) -> Result<(), ResignError> {
    let too_large = || ResignError::InvalidBinary("universal binary exceeds 4 GiB".into());

    let mut records = vec![];
    let mut offset = (SIZEOF_FAT_HEADER + slices.len() * SIZEOF_FAT_ARCH) as u64;

    for (arch, data) in slices {
        let align = 1u64
            .checked_shl(arch.align)
            .ok_or_else(|| ResignError::InvalidBinary(format!("bad alignment 2^{}", arch.align)))?;

        let pad_bytes = match offset % align {
            0 => 0,
            x => align - x,
        };
        offset += pad_bytes;

        let record = FatArch {
            cputype: arch.cputype,
            cpusubtype: arch.cpusubtype,
            offset: u32::try_from(offset).map_err(|_| too_large())?,
            size: u32::try_from(data.len()).map_err(|_| too_large())?,
            align: arch.align,
        };
        offset += data.len() as u64;

        records.push((record, pad_bytes as usize, data));
    }

    writer.iowrite_with(FAT_MAGIC, scroll::BE)?;
    writer.iowrite_with(records.len() as u32, scroll::BE)?;

    for (fat_arch, _, _) in &records {
        let mut buffer = [0u8; SIZEOF_FAT_ARCH];
        buffer.pwrite_with(fat_arch, 0, scroll::BE)?;
        writer.write_all(&buffer)?;
    }

    for (_, pad_bytes, macho_data) in records {
        writer.write_all(&b"\0".repeat(pad_bytes))?;
        writer.write_all(macho_data)?;
    }

    Ok(())
}
