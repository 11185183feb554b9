use log::{debug, error, info};

use crate::error::MountError;
use crate::fs::entry::{EntryId, EntryTree};

/// What a finished parse recovered from the image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Entries below the root.
    pub total_entries: usize,
    pub files: usize,
    pub directories: usize,
    pub inaccessible: usize,
    /// Full paths of files whose payload lies inside the image.
    pub accessible_files: Vec<String>,
}

impl LoadSummary {
    /// Count everything below the root of `tree`.
    pub fn collect(tree: &EntryTree) -> Self {
        let mut summary = LoadSummary::default();
        for (_, entry) in tree.descendants(EntryId::ROOT) {
            summary.total_entries += 1;
            if entry.is_directory() {
                summary.directories += 1;
            } else {
                summary.files += 1;
            }
            if !entry.is_accessible() {
                summary.inaccessible += 1;
            } else if entry.is_file() {
                summary.accessible_files.push(tree.path(entry.id));
            }
        }
        summary
    }
}

/// Summarize the tree and decide whether the mount succeeded: at least one
/// entry must have been recovered.
pub fn summarize(tree: &EntryTree) -> Result<LoadSummary, MountError> {
    let summary = LoadSummary::collect(tree);

    if summary.total_entries == 0 {
        error!("No entries loaded from disc image; the image is too damaged to mount");
        return Err(MountError::NothingRecovered);
    }

    info!(
        "Disc image loaded: {} entries ({} files, {} directories)",
        summary.total_entries, summary.files, summary.directories
    );
    if summary.inaccessible > 0 {
        info!(
            "{} entries point past the end of the image and are inaccessible",
            summary.inaccessible
        );
    }
    if log::log_enabled!(log::Level::Debug) {
        debug!("Accessible files:");
        for path in &summary.accessible_files {
            debug!("  {path}");
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::entry::{DataLocation, EntryType, FileEntry};

    fn entry(name: &str, entry_type: EntryType, location: DataLocation) -> FileEntry {
        FileEntry {
            name: name.into(),
            entry_type,
            location,
            ..FileEntry::root()
        }
    }

    #[test]
    fn test_empty_tree_is_nothing_recovered() {
        let tree = EntryTree::new();
        assert!(matches!(
            summarize(&tree),
            Err(MountError::NothingRecovered)
        ));
    }

    #[test]
    fn test_counts_and_paths() {
        let mut tree = EntryTree::new();
        let media = tree.push_child(
            EntryId::ROOT,
            entry("media", EntryType::Directory, DataLocation::None),
        );
        tree.push_child(
            media,
            entry(
                "intro.wmv",
                EntryType::File,
                DataLocation::Extent {
                    offset: 4096,
                    size: 10,
                },
            ),
        );
        tree.push_child(
            EntryId::ROOT,
            entry(
                "default.xex",
                EntryType::File,
                DataLocation::Extent {
                    offset: 2048,
                    size: 10,
                },
            ),
        );
        tree.push_child(
            EntryId::ROOT,
            entry("lost.bin", EntryType::File, DataLocation::Inaccessible),
        );
        tree.push_child(
            EntryId::ROOT,
            entry("gone", EntryType::Directory, DataLocation::Inaccessible),
        );

        let summary = summarize(&tree).unwrap();
        assert_eq!(summary.total_entries, 5);
        assert_eq!(summary.files, 3);
        assert_eq!(summary.directories, 2);
        assert_eq!(summary.inaccessible, 2);
        assert_eq!(
            summary.accessible_files,
            vec!["/media/intro.wmv".to_string(), "/default.xex".to_string()]
        );
    }

    #[test]
    fn test_only_inaccessible_entries_still_succeeds() {
        let mut tree = EntryTree::new();
        tree.push_child(
            EntryId::ROOT,
            entry("lost.bin", EntryType::File, DataLocation::Inaccessible),
        );
        let summary = summarize(&tree).unwrap();
        assert_eq!(summary.total_entries, 1);
        assert!(summary.accessible_files.is_empty());
    }
}
