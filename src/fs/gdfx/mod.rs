//! GDFX (Xbox 360 game disc) filesystem.
//!
//! Mounting runs four stages: the image is mapped ([`crate::storage`]), the
//! volume descriptor is located ([`header`]), the directory tree is decoded
//! ([`directory`]) and the result is summarized ([`summary`]). The mounted
//! tree is immutable; file payloads are read from the mapped image on demand.

pub mod directory;
pub mod header;
pub mod summary;

#[cfg(test)]
pub(crate) mod test_image;

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use log::{info, warn};

use super::entry::{DataLocation, EntryId, EntryTree, FileEntry};
use super::filesystem::{Filesystem, FilesystemError};
use crate::config::MountConfig;
use crate::error::MountError;
use crate::storage::{self, InterferenceMonitor, StorageView};
use directory::{DirectoryParser, ParseStats};
use header::FormatHeader;
use summary::LoadSummary;

/// Size of one disc sector; every sector number in the format is in these units.
pub const SECTOR_SIZE: u64 = 2048;

/// A mounted GDFX disc image.
pub struct GdfxFilesystem {
    view: Arc<StorageView>,
    header: FormatHeader,
    tree: EntryTree,
    stats: ParseStats,
    summary: LoadSummary,
}

impl GdfxFilesystem {
    /// Map the image at `path` and mount it.
    ///
    /// `cancel_check` is polled while the image is being opened; returning
    /// `true` abandons the mount with [`MountError::Cancelled`].
    pub fn mount(
        path: &Path,
        config: &MountConfig,
        monitor: &InterferenceMonitor,
        cancel_check: &dyn Fn() -> bool,
    ) -> Result<Self, MountError> {
        let view = storage::open_image(path, config, monitor, cancel_check)?;
        Self::from_view(view, config)
    }

    /// Mount an image that is already open.
    pub fn from_view(view: Arc<StorageView>, config: &MountConfig) -> Result<Self, MountError> {
        let header = header::locate_header(&view)?;

        info!("Reading root directory");
        let (tree, stats) = DirectoryParser::parse(&view, &header, config.max_depth);
        if stats.aborted_subtrees > 0 {
            warn!(
                "{} directory subtrees were skipped because of corrupt records",
                stats.aborted_subtrees
            );
        }

        let summary = summary::summarize(&tree)?;
        Ok(Self {
            view,
            header,
            tree,
            stats,
            summary,
        })
    }

    pub fn tree(&self) -> &EntryTree {
        &self.tree
    }

    pub fn header(&self) -> &FormatHeader {
        &self.header
    }

    pub fn summary(&self) -> &LoadSummary {
        &self.summary
    }

    pub fn parse_stats(&self) -> &ParseStats {
        &self.stats
    }

    /// Look up `entry` in this mount's tree, rejecting entries from another.
    fn own_entry(&self, entry: &FileEntry) -> Result<&FileEntry, FilesystemError> {
        self.tree
            .get(entry.id)
            .filter(|own| own.name == entry.name && own.parent == entry.parent)
            .ok_or_else(|| FilesystemError::NotFound(entry.name.clone()))
    }
}

impl Filesystem for GdfxFilesystem {
    fn root(&self) -> &FileEntry {
        self.tree.root()
    }

    fn list_directory(&self, entry: &FileEntry) -> Result<Vec<&FileEntry>, FilesystemError> {
        let entry = self.own_entry(entry)?;
        if !entry.is_directory() {
            return Err(FilesystemError::NotADirectory(self.tree.path(entry.id)));
        }
        Ok(self.tree.children(entry.id).collect())
    }

    fn resolve_path(&self, path: &str) -> Option<&FileEntry> {
        self.tree.resolve(path)
    }

    fn entry_path(&self, entry: &FileEntry) -> String {
        self.tree.path(entry.id)
    }

    fn read_at(
        &self,
        entry: &FileEntry,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize, FilesystemError> {
        let entry = self.own_entry(entry)?;
        if entry.is_directory() {
            return Err(FilesystemError::NotAFile(self.tree.path(entry.id)));
        }
        let (start, size) = match entry.location {
            DataLocation::Extent { offset, size } => (offset, size),
            DataLocation::Inaccessible => {
                return Err(FilesystemError::Inaccessible(self.tree.path(entry.id)))
            }
            DataLocation::None => return Ok(0),
        };
        if offset >= size {
            return Ok(0);
        }
        let want = (size - offset).min(buf.len() as u64);
        let data = self.view.slice(start + offset, want);
        buf[..data.len()].copy_from_slice(data);
        Ok(data.len())
    }

    fn volume_label(&self) -> Option<&str> {
        None
    }

    fn fs_type(&self) -> &str {
        "GDFX"
    }

    fn total_size(&self) -> u64 {
        self.view.size()
    }

    fn used_size(&self) -> u64 {
        let image_size = self.view.size();
        self.tree
            .descendants(EntryId::ROOT)
            .into_iter()
            .filter_map(|(_, e)| match e.location {
                DataLocation::Extent { offset, size } => {
                    Some(size.min(image_size.saturating_sub(offset)))
                }
                _ => None,
            })
            .sum()
    }

    fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "GDFX image: {} entries ({} files, {} directories), game offset 0x{:X}",
            self.summary.total_entries,
            self.summary.files,
            self.summary.directories,
            self.header.game_offset
        );
        for (depth, entry) in self.tree.descendants(EntryId::ROOT) {
            let indent = "  ".repeat(depth);
            match (entry.is_directory(), entry.location) {
                (_, DataLocation::Inaccessible) => {
                    let suffix = if entry.is_directory() { "/" } else { "" };
                    let _ = writeln!(out, "{indent}{}{suffix} [INACCESSIBLE]", entry.name);
                }
                (true, _) => {
                    let _ = writeln!(out, "{indent}{}/", entry.name);
                }
                (false, DataLocation::Extent { offset, .. }) => {
                    let _ = writeln!(
                        out,
                        "{indent}{} ({}, offset 0x{offset:X})",
                        entry.name,
                        entry.size_string()
                    );
                }
                (false, DataLocation::None) => {
                    let _ = writeln!(out, "{indent}{}", entry.name);
                }
            }
        }
        out
    }
}
