// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Synthetic binaries for tests.

pub const CPU_TYPE_X86_64: u32 = 0x0100_0007;
pub const CPU_TYPE_ARM64: u32 = 0x0100_000c;

const MH_MAGIC_64: u32 = 0xfeed_facf;
const MH_EXECUTE: u32 = 0x2;
const LC_SEGMENT_64: u32 = 0x19;
const LC_CODE_SIGNATURE: u32 = 0x1d;
const SEGMENT_COMMAND_64_SIZE: u32 = 72;
const LINKEDIT_DATA_COMMAND_SIZE: u32 = 16;

/// File offset of `__LINKEDIT` in binaries from [thin_macho].
pub const LINKEDIT_OFFSET: u64 = 0x1000;
const LINKEDIT_PAYLOAD_SIZE: u64 = 0x80;

fn segment_command(
    out: &mut Vec<u8>,
    name: &str,
    vmaddr: u64,
    fileoff: u64,
    filesize: u64,
    prot: u32,
) {
    let mut segname = [0u8; 16];
    segname[..name.len()].copy_from_slice(name.as_bytes());

    out.extend_from_slice(&LC_SEGMENT_64.to_le_bytes());
    out.extend_from_slice(&SEGMENT_COMMAND_64_SIZE.to_le_bytes());
    out.extend_from_slice(&segname);
    out.extend_from_slice(&vmaddr.to_le_bytes());
    out.extend_from_slice(&0x4000u64.to_le_bytes());
    out.extend_from_slice(&fileoff.to_le_bytes());
    out.extend_from_slice(&filesize.to_le_bytes());
    out.extend_from_slice(&prot.to_le_bytes());
    out.extend_from_slice(&prot.to_le_bytes());
    // nsects, flags
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
}

/// Build a minimal 64-bit little-endian Mach-O executable.
///
/// It has a `__TEXT` segment at offset 0 and a `__LINKEDIT` segment at
/// [LINKEDIT_OFFSET]. If `signature` is given, it is appended to `__LINKEDIT`
/// and referenced by an `LC_CODE_SIGNATURE` load command.
pub fn thin_macho(cputype: u32, signature: Option<&[u8]>) -> Vec<u8> {
    let signature_len = signature.map(|s| s.len() as u64).unwrap_or(0);
    let (ncmds, sizeofcmds) = if signature.is_some() {
        (3u32, 2 * SEGMENT_COMMAND_64_SIZE + LINKEDIT_DATA_COMMAND_SIZE)
    } else {
        (2u32, 2 * SEGMENT_COMMAND_64_SIZE)
    };

    let mut out = vec![];
    out.extend_from_slice(&MH_MAGIC_64.to_le_bytes());
    out.extend_from_slice(&cputype.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&MH_EXECUTE.to_le_bytes());
    out.extend_from_slice(&ncmds.to_le_bytes());
    out.extend_from_slice(&sizeofcmds.to_le_bytes());
    // flags, reserved
    out.extend_from_slice(&0x0020_0085u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());

    segment_command(&mut out, "__TEXT", 0x1_0000_0000, 0, LINKEDIT_OFFSET, 5);
    segment_command(
        &mut out,
        "__LINKEDIT",
        0x1_0000_4000,
        LINKEDIT_OFFSET,
        LINKEDIT_PAYLOAD_SIZE + signature_len,
        1,
    );

    if signature.is_some() {
        out.extend_from_slice(&LC_CODE_SIGNATURE.to_le_bytes());
        out.extend_from_slice(&LINKEDIT_DATA_COMMAND_SIZE.to_le_bytes());
        out.extend_from_slice(&((LINKEDIT_OFFSET + LINKEDIT_PAYLOAD_SIZE) as u32).to_le_bytes());
        out.extend_from_slice(&(signature_len as u32).to_le_bytes());
    }

    // "Code" in the back half of __TEXT.
    out.resize(0x800, 0);
    out.resize(LINKEDIT_OFFSET as usize, 0xc3);
    out.resize((LINKEDIT_OFFSET + LINKEDIT_PAYLOAD_SIZE) as usize, 0xab);

    if let Some(signature) = signature {
        out.extend_from_slice(signature);
    }

    out
}

/// Build a universal Mach-O from thin binaries, aligning slices on 16k.
pub fn fat_macho(binaries: &[Vec<u8>]) -> Vec<u8> {
    const ALIGN: u32 = 14;

    let mut out = vec![];
    out.extend_from_slice(&0xcafe_babeu32.to_be_bytes());
    out.extend_from_slice(&(binaries.len() as u32).to_be_bytes());

    let mut offset = 8 + 20 * binaries.len();
    let mut placements = vec![];

    for binary in binaries {
        offset = (offset + (1 << ALIGN) - 1) & !((1 << ALIGN) - 1);
        placements.push(offset);

        let cputype = u32::from_le_bytes(binary[4..8].try_into().unwrap());
        let cpusubtype = u32::from_le_bytes(binary[8..12].try_into().unwrap());

        out.extend_from_slice(&cputype.to_be_bytes());
        out.extend_from_slice(&cpusubtype.to_be_bytes());
        out.extend_from_slice(&(offset as u32).to_be_bytes());
        out.extend_from_slice(&(binary.len() as u32).to_be_bytes());
        out.extend_from_slice(&ALIGN.to_be_bytes());

        offset += binary.len();
    }

    for (binary, offset) in binaries.iter().zip(placements) {
        out.resize(offset, 0);
        out.extend_from_slice(binary);
    }

    out
}
