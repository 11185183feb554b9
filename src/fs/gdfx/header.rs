use byteorder::{ByteOrder, LittleEndian};
use log::{error, info};

use super::SECTOR_SIZE;
use crate::error::MountError;
use crate::storage::StorageView;

pub const GDFX_MAGIC: &[u8; 20] = b"MICROSOFT*XBOX*MEDIA";

/// Sector holding the volume descriptor, relative to the game partition.
pub const HEADER_SECTOR: u64 = 32;

/// Known game partition bases, in probe order. Extracted images start at 0;
/// full redump images carry a video partition in front of the game data.
pub const CANDIDATE_OFFSETS: [u64; 5] = [
    0x0000_0000,
    0x0000_FB20,
    0x0002_0600,
    0x0208_0000,
    0x0FD9_0000,
];

/// Smallest root directory holding a single record.
pub const MIN_ROOT_SIZE: u32 = 13;
pub const MAX_ROOT_SIZE: u32 = 32 * 1024 * 1024;

const ROOT_SECTOR_FIELD: usize = 20;
const ROOT_SIZE_FIELD: usize = 24;

/// Volume descriptor fields needed to reach the root directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatHeader {
    /// Base of the game partition; every sector address is relative to it.
    pub game_offset: u64,
    pub root_sector: u32,
    pub root_size: u32,
    /// Absolute byte offset of the root directory.
    pub root_offset: u64,
}

impl FormatHeader {
    /// Absolute offset of the descriptor sector.
    pub fn magic_offset(&self) -> u64 {
        magic_offset(self.game_offset)
    }
}

fn magic_offset(base: u64) -> u64 {
    base + HEADER_SECTOR * SECTOR_SIZE
}

fn has_magic(view: &StorageView, offset: u64) -> bool {
    view.slice(offset, GDFX_MAGIC.len() as u64) == GDFX_MAGIC
}

/// Probe the candidate offsets for the GDFX magic and validate the root
/// directory location it describes.
pub fn locate_header(view: &StorageView) -> Result<FormatHeader, MountError> {
    info!(
        "Searching for GDFX magic at {} known offsets",
        CANDIDATE_OFFSETS.len()
    );
    let Some(game_offset) = CANDIDATE_OFFSETS
        .iter()
        .copied()
        .find(|&base| has_magic(view, magic_offset(base)))
    else {
        error!("GDFX magic not found - this is not a valid Xbox 360 disc image");
        return Err(MountError::FormatMismatch);
    };

    let fs_offset = magic_offset(game_offset);
    info!("Found GDFX magic at game_offset 0x{game_offset:X} (sector 32 at 0x{fs_offset:X})");

    let descriptor = view.slice(fs_offset, (ROOT_SIZE_FIELD + 4) as u64);
    if descriptor.len() < ROOT_SIZE_FIELD + 4 {
        error!("File too small for GDFX header");
        return Err(MountError::DamagedHeader(
            "volume descriptor is truncated".into(),
        ));
    }

    let root_sector = LittleEndian::read_u32(&descriptor[ROOT_SECTOR_FIELD..]);
    let root_size = LittleEndian::read_u32(&descriptor[ROOT_SIZE_FIELD..]);
    let header = FormatHeader {
        game_offset,
        root_sector,
        root_size,
        root_offset: game_offset + root_sector as u64 * SECTOR_SIZE,
    };

    info!("Root directory info:");
    info!("  Root sector: {root_sector} (0x{root_sector:X})");
    info!("  Root size: {root_size} bytes (0x{root_size:X})");
    info!("  Root offset: 0x{:X}", header.root_offset);
    info!(
        "  File size: 0x{:X} ({} MiB)",
        view.size(),
        view.size() / (1024 * 1024)
    );

    validate(&header, view.size())?;

    info!("GDFX header validated");
    Ok(header)
}

fn validate(header: &FormatHeader, image_size: u64) -> Result<(), MountError> {
    if !(MIN_ROOT_SIZE..=MAX_ROOT_SIZE).contains(&header.root_size) {
        let msg = format!(
            "invalid root size: {} bytes (expected {MIN_ROOT_SIZE} to {MAX_ROOT_SIZE} bytes)",
            header.root_size
        );
        error!("{msg}");
        error!("Disc image appears to be corrupted; try re-copying it");
        return Err(MountError::DamagedHeader(msg));
    }

    if header.root_offset >= image_size {
        let msg = format!(
            "root offset 0x{:X} exceeds file size 0x{image_size:X}",
            header.root_offset
        );
        error!("{msg}");
        return Err(MountError::DamagedHeader(msg));
    }

    if header.root_offset + header.root_size as u64 > image_size {
        let msg = format!(
            "root directory (0x{:X} + 0x{:X}) exceeds file size 0x{image_size:X}",
            header.root_offset, header.root_size
        );
        error!("{msg}");
        return Err(MountError::DamagedHeader(msg));
    }

    Ok(())
}
