//! Builders for synthetic GDFX images used by the unit tests.

use super::header::{GDFX_MAGIC, HEADER_SECTOR};
use super::SECTOR_SIZE;
use crate::fs::entry::ATTR_DIRECTORY;

#[derive(Debug, Clone)]
pub(crate) struct RawRecord {
    pub left: u16,
    pub right: u16,
    pub sector: u32,
    pub length: u32,
    pub attributes: u8,
    pub name: Vec<u8>,
}

pub(crate) fn file(name: &str, sector: u32, length: u32) -> RawRecord {
    RawRecord {
        left: 0,
        right: 0,
        sector,
        length,
        attributes: 0x80,
        name: name.as_bytes().to_vec(),
    }
}

pub(crate) fn dir(name: &str, sector: u32, length: u32) -> RawRecord {
    RawRecord {
        attributes: ATTR_DIRECTORY,
        ..file(name, sector, length)
    }
}

/// On-disc size of a record with a `name_len` byte name.
pub(crate) fn record_len(name_len: usize) -> usize {
    (14 + name_len).div_ceil(4) * 4
}

/// Encode records back to back in the given order. Left/right fields are
/// written as given.
pub(crate) fn encode(records: &[RawRecord]) -> Vec<u8> {
    let mut buf = Vec::new();
    for r in records {
        let start = buf.len();
        buf.extend_from_slice(&r.left.to_le_bytes());
        buf.extend_from_slice(&r.right.to_le_bytes());
        buf.extend_from_slice(&r.sector.to_le_bytes());
        buf.extend_from_slice(&r.length.to_le_bytes());
        buf.push(r.attributes);
        buf.push(r.name.len() as u8);
        buf.extend_from_slice(&r.name);
        // GDFX pads with 0xFF.
        buf.resize(start + record_len(r.name.len()), 0xFF);
    }
    buf
}

/// Ordinal of each record when encoded back to back.
pub(crate) fn ordinals(records: &[RawRecord]) -> Vec<u16> {
    let mut out = Vec::with_capacity(records.len());
    let mut offset = 0usize;
    for r in records {
        out.push((offset / 4) as u16);
        offset += record_len(r.name.len());
    }
    out
}

/// Encode `records` (any order) as a balanced search tree by name, root at
/// ordinal 0.
pub(crate) fn encode_tree(mut records: Vec<RawRecord>) -> Vec<u8> {
    records.sort_by(|a, b| a.name.to_ascii_uppercase().cmp(&b.name.to_ascii_uppercase()));

    // Preorder of a balanced tree over the sorted slice, with child links as
    // indices into `records`.
    fn build(lo: usize, hi: usize, order: &mut Vec<(usize, Option<usize>, Option<usize>)>) -> Option<usize> {
        if lo >= hi {
            return None;
        }
        let mid = lo + (hi - lo) / 2;
        let slot = order.len();
        order.push((mid, None, None));
        let left = build(lo, mid, order);
        let right = build(mid + 1, hi, order);
        order[slot].1 = left;
        order[slot].2 = right;
        Some(mid)
    }

    let mut order = Vec::new();
    build(0, records.len(), &mut order);

    let mut laid_out: Vec<RawRecord> = order.iter().map(|(i, _, _)| records[*i].clone()).collect();
    let ords = ordinals(&laid_out);
    let position_of = |record_idx: usize| order.iter().position(|(i, _, _)| *i == record_idx);
    for (slot, (_, left, right)) in order.iter().enumerate() {
        if let Some(l) = left.and_then(position_of) {
            laid_out[slot].left = ords[l];
        }
        if let Some(r) = right.and_then(position_of) {
            laid_out[slot].right = ords[r];
        }
    }
    encode(&laid_out)
}

/// Byte image with a GDFX volume descriptor at `game_offset`.
pub(crate) struct ImageBuilder {
    pub game_offset: u64,
    pub data: Vec<u8>,
}

impl ImageBuilder {
    pub fn new(game_offset: u64, root_sector: u32, root_size: u32) -> Self {
        let mut b = Self {
            game_offset,
            data: Vec::new(),
        };
        let mut descriptor = vec![0u8; SECTOR_SIZE as usize];
        descriptor[..20].copy_from_slice(GDFX_MAGIC);
        descriptor[20..24].copy_from_slice(&root_sector.to_le_bytes());
        descriptor[24..28].copy_from_slice(&root_size.to_le_bytes());
        b.write_sector(HEADER_SECTOR as u32, &descriptor);
        b
    }

    /// Write `bytes` at `sector` of the game partition, growing the image.
    pub fn write_sector(&mut self, sector: u32, bytes: &[u8]) {
        let start = (self.game_offset + sector as u64 * SECTOR_SIZE) as usize;
        let end = start + bytes.len();
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(bytes);
    }

    /// Pad the image with zeros to cover `sectors` sectors of the partition.
    pub fn pad_to_sector(&mut self, sectors: u32) {
        let end = (self.game_offset + sectors as u64 * SECTOR_SIZE) as usize;
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
    }

    pub fn build(self) -> Vec<u8> {
        self.data
    }
}
