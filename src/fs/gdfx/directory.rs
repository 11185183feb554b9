//! GDFX directory decoding.
//!
//! A directory is one buffer of variable-length records. Each record carries
//! the ordinals (offset / 4) of its left and right siblings, so the buffer is
//! a binary search tree by name rooted at ordinal 0. Subdirectory records
//! point at a separate buffer holding that directory's own tree.
//!
//! Images in the wild are often truncated or damaged, so a bad record only
//! discards the subtree it roots: the failure is logged and every sibling
//! that can still be reached is kept.

use std::collections::HashSet;

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, error, trace, warn};
use thiserror::Error;

use super::header::FormatHeader;
use super::SECTOR_SIZE;
use crate::fs::entry::{
    DataLocation, EntryId, EntryTree, EntryType, FileEntry, ATTR_DIRECTORY, ATTR_READ_ONLY,
    EPOCH_FILETIME,
};
use crate::storage::StorageView;

/// Fixed part of a record: two ordinals, sector, length, attributes, name length.
pub const RECORD_HEADER_SIZE: usize = 14;

/// Smallest buffer span an ordinal must leave before it is dereferenced.
pub const MIN_ENTRY_SIZE: usize = 4 + RECORD_HEADER_SIZE;

/// One decoded directory record. The name is decoded separately once its
/// length has been checked against the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryRecord {
    pub left: u16,
    pub right: u16,
    pub sector: u32,
    pub length: u32,
    pub attributes: u8,
    pub name_length: u8,
}

impl DirectoryRecord {
    /// Decode the fixed fields. `data` must hold at least
    /// [`RECORD_HEADER_SIZE`] bytes.
    pub fn parse(data: &[u8]) -> Self {
        DirectoryRecord {
            left: LittleEndian::read_u16(&data[0..2]),
            right: LittleEndian::read_u16(&data[2..4]),
            sector: LittleEndian::read_u32(&data[4..8]),
            length: LittleEndian::read_u32(&data[8..12]),
            attributes: data[12],
            name_length: data[13],
        }
    }

    pub fn is_directory(&self) -> bool {
        self.attributes & ATTR_DIRECTORY != 0
    }

    /// Bytes the record occupies including padding to 4-byte alignment.
    pub fn encoded_len(&self) -> usize {
        (RECORD_HEADER_SIZE + self.name_length as usize).div_ceil(4) * 4
    }
}

/// Why one subtree of a directory buffer was abandoned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubtreeAbort {
    #[error(
        "entry ordinal {ordinal} out of bounds (offset {offset} + {needed} > {buffer_size})"
    )]
    OrdinalOutOfBounds {
        ordinal: u16,
        offset: usize,
        needed: usize,
        buffer_size: usize,
    },

    #[error("circular entry reference at ordinal {ordinal} (offset {offset})")]
    CycleDetected { ordinal: u16, offset: usize },

    #[error("directory buffer at 0x{offset:X} was already parsed")]
    BufferRevisited { offset: u64 },

    #[error("recursion depth limit ({limit}) exceeded at ordinal {ordinal} (depth {depth})")]
    DepthExceeded { ordinal: u16, depth: u32, limit: u32 },

    #[error(
        "entry ordinal {ordinal} name length {name_length} exceeds buffer bounds \
         (offset {offset} + {RECORD_HEADER_SIZE} + {name_length} > {buffer_size})"
    )]
    NameOutOfBounds {
        ordinal: u16,
        offset: usize,
        name_length: u8,
        buffer_size: usize,
    },
}

/// Counters describing how much damage the parse ran into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    /// Subtrees discarded because of bounds, cycle, revisit or depth violations.
    pub aborted_subtrees: usize,
    /// Files and directories whose payload lies past the end of the image.
    pub inaccessible_entries: usize,
    /// Directory buffers whose declared length ran past the end of the image.
    pub truncated_buffers: usize,
}

/// Decodes the directory hierarchy of one image into an [`EntryTree`].
pub struct DirectoryParser<'a> {
    view: &'a StorageView,
    game_offset: u64,
    max_depth: u32,
    /// Start offsets of every directory buffer parsed so far. A buffer is
    /// decoded at most once per image, whichever directory points at it.
    parsed_buffers: HashSet<u64>,
    tree: EntryTree,
    stats: ParseStats,
}

impl<'a> DirectoryParser<'a> {
    pub fn new(view: &'a StorageView, game_offset: u64, max_depth: u32) -> Self {
        Self {
            view,
            game_offset,
            max_depth,
            parsed_buffers: HashSet::new(),
            tree: EntryTree::new(),
            stats: ParseStats::default(),
        }
    }

    /// Parse the root directory described by `header` and everything below it.
    pub fn parse(
        view: &'a StorageView,
        header: &FormatHeader,
        max_depth: u32,
    ) -> (EntryTree, ParseStats) {
        let mut parser = Self::new(view, header.game_offset, max_depth);
        parser.read_directory(header.root_offset, header.root_size as u64, EntryId::ROOT, 0);
        parser.finish()
    }

    pub fn finish(self) -> (EntryTree, ParseStats) {
        (self.tree, self.stats)
    }

    /// Decode the buffer at `offset` into children of `parent`. Failures are
    /// contained: the directory simply ends up with fewer children.
    ///
    /// A buffer that was already decoded, by an ancestor or by another
    /// directory, is refused and `parent` stays empty.
    pub fn read_directory(
        &mut self,
        offset: u64,
        declared_size: u64,
        parent: EntryId,
        depth: u32,
    ) {
        if !self.parsed_buffers.insert(offset) {
            warn!(
                "Directory '{}' points at buffer 0x{offset:X}, which was already read; leaving it empty",
                self.tree.path(parent)
            );
            self.note_abort(&SubtreeAbort::BufferRevisited { offset }, offset, depth);
            return;
        }

        let buffer: &'a [u8] = self.view.slice(offset, declared_size);
        if (buffer.len() as u64) < declared_size {
            warn!(
                "Directory buffer at 0x{offset:X} declares {declared_size} bytes but only {} are present",
                buffer.len()
            );
            self.stats.truncated_buffers += 1;
        }

        let mut visited = HashSet::new();
        if let Err(abort) = self.read_entry(buffer, 0, parent, depth, &mut visited) {
            self.note_abort(&abort, offset, depth);
        }
    }

    /// Visit the node at `ordinal`: left siblings, the node itself, then
    /// right siblings.
    fn read_entry(
        &mut self,
        buffer: &'a [u8],
        ordinal: u16,
        parent: EntryId,
        depth: u32,
        visited: &mut HashSet<u16>,
    ) -> Result<(), SubtreeAbort> {
        let buffer_size = buffer.len();
        let offset = ordinal as usize * 4;

        if offset + MIN_ENTRY_SIZE > buffer_size {
            return Err(SubtreeAbort::OrdinalOutOfBounds {
                ordinal,
                offset,
                needed: MIN_ENTRY_SIZE,
                buffer_size,
            });
        }

        if !visited.insert(ordinal) {
            return Err(SubtreeAbort::CycleDetected { ordinal, offset });
        }

        if depth > self.max_depth {
            return Err(SubtreeAbort::DepthExceeded {
                ordinal,
                depth,
                limit: self.max_depth,
            });
        }

        let record = DirectoryRecord::parse(&buffer[offset..]);
        if depth == 0 {
            debug!(
                "Entry {ordinal} at offset {offset}: node_l={}, node_r={}, sector={}, length={}, attr=0x{:02X}, name_len={}",
                record.left, record.right, record.sector, record.length, record.attributes, record.name_length
            );
        } else if depth <= 2 {
            debug!("Reading entry {ordinal} at offset {offset} (depth {depth})");
        } else {
            trace!("Reading entry {ordinal} at offset {offset} (depth {depth})");
        }

        if record.left != 0 {
            let next = depth.saturating_add(1);
            if let Err(abort) = self.read_entry(buffer, record.left, parent, next, visited) {
                warn!(
                    "Failed to read left child (node_l={}) of entry {ordinal} at depth {depth}; skipping that subtree",
                    record.left
                );
                self.note_abort(&abort, offset as u64, depth);
            }
        }

        let name_end = offset + RECORD_HEADER_SIZE + record.name_length as usize;
        if name_end > buffer_size {
            error!(
                "  Entry details: node_l={}, node_r={}, sector={}, length={}, attr=0x{:02X}",
                record.left, record.right, record.sector, record.length, record.attributes
            );
            return Err(SubtreeAbort::NameOutOfBounds {
                ordinal,
                offset,
                name_length: record.name_length,
                buffer_size,
            });
        }
        let name = decode_name(&buffer[offset + RECORD_HEADER_SIZE..name_end]);

        self.materialize(&record, name, parent, depth);

        if record.right != 0 {
            let next = depth.saturating_add(1);
            if let Err(abort) = self.read_entry(buffer, record.right, parent, next, visited) {
                warn!(
                    "Failed to read right child (node_r={}) of entry {ordinal} at depth {depth}; skipping that subtree",
                    record.right
                );
                self.note_abort(&abort, offset as u64, depth);
            }
        }

        Ok(())
    }

    /// Turn a decoded record into an entry under `parent`, descending into
    /// its child buffer if it is a non-empty directory.
    fn materialize(
        &mut self,
        record: &DirectoryRecord,
        name: String,
        parent: EntryId,
        depth: u32,
    ) -> EntryId {
        let data_offset = self.game_offset + record.sector as u64 * SECTOR_SIZE;
        let image_size = self.view.size();
        let length = record.length as u64;

        let mut entry = FileEntry {
            id: EntryId::ROOT,
            name,
            entry_type: if record.is_directory() {
                EntryType::Directory
            } else {
                EntryType::File
            },
            attributes: record.attributes | ATTR_READ_ONLY,
            size: length,
            allocation_size: length.div_ceil(SECTOR_SIZE) * SECTOR_SIZE,
            sector: record.sector,
            location: DataLocation::None,
            create_timestamp: EPOCH_FILETIME,
            access_timestamp: EPOCH_FILETIME,
            write_timestamp: EPOCH_FILETIME,
            parent: None,
            children: Vec::new(),
        };

        if !record.is_directory() {
            if data_offset >= image_size {
                warn!(
                    "File '{}' sector {} at offset 0x{data_offset:X} exceeds file size 0x{image_size:X}; it is INACCESSIBLE (truncated/corrupt image)",
                    entry.name, record.sector
                );
                entry.size = 0;
                entry.allocation_size = 0;
                entry.location = DataLocation::Inaccessible;
                self.stats.inaccessible_entries += 1;
            } else {
                entry.location = DataLocation::Extent {
                    offset: data_offset,
                    size: length,
                };
            }
            return self.tree.push_child(parent, entry);
        }

        if length == 0 {
            return self.tree.push_child(parent, entry);
        }

        if data_offset >= image_size {
            warn!(
                "Directory '{}' sector {} at offset 0x{data_offset:X} exceeds file size 0x{image_size:X}; it is INACCESSIBLE (truncated/corrupt image)",
                entry.name, record.sector
            );
            entry.size = 0;
            entry.allocation_size = 0;
            entry.location = DataLocation::Inaccessible;
            self.stats.inaccessible_entries += 1;
            return self.tree.push_child(parent, entry);
        }

        if depth <= 2 {
            debug!(
                "Directory '{}': reading children from sector {} (offset 0x{data_offset:X}, length {length})",
                entry.name, record.sector
            );
        }
        let id = self.tree.push_child(parent, entry);
        self.read_directory(data_offset, length, id, depth.saturating_add(1));
        id
    }

    fn note_abort(&mut self, abort: &SubtreeAbort, buffer_offset: u64, depth: u32) {
        error!(
            "Disc image: {abort} in buffer at 0x{buffer_offset:X}, depth {depth}; possible corrupted or malicious file"
        );
        self.stats.aborted_subtrees += 1;
    }
}

/// Record names are ASCII; anything else is replaced rather than trusted.
fn decode_name(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { char::REPLACEMENT_CHARACTER })
        .collect()
}
