use chrono::{DateTime, Utc};

/// Attribute bit marking a record as a directory.
pub const ATTR_DIRECTORY: u8 = 0x10;
/// Attribute bit forced onto every entry of a mounted image.
pub const ATTR_READ_ONLY: u8 = 0x01;

/// Windows FILETIME (100 ns ticks since 1601-01-01) of the Unix epoch.
/// GDFX carries no timestamps, so every entry is stamped with this value.
pub const EPOCH_FILETIME: u64 = 116_444_736_000_000_000;

/// Index of an entry inside its [`EntryTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub usize);

impl EntryId {
    pub const ROOT: EntryId = EntryId(0);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntryType {
    File,
    Directory,
}

/// Where an entry's payload lives in the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataLocation {
    /// Absolute byte range within the storage view.
    Extent { offset: u64, size: u64 },
    /// The record points past the end of the image (truncated or corrupt).
    Inaccessible,
    /// Directories and the root have no payload of their own.
    None,
}

/// A file or directory entry within a mounted disc image.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub id: EntryId,
    pub name: String,
    pub entry_type: EntryType,
    /// Attribute byte as stored on disc, with [`ATTR_READ_ONLY`] forced on.
    pub attributes: u8,
    /// Logical size in bytes.
    pub size: u64,
    /// Size rounded up to whole sectors.
    pub allocation_size: u64,
    /// Raw sector number from the directory record.
    pub sector: u32,
    pub location: DataLocation,
    pub create_timestamp: u64,
    pub access_timestamp: u64,
    pub write_timestamp: u64,
    /// Non-owning link used only to rebuild paths.
    pub parent: Option<EntryId>,
    pub children: Vec<EntryId>,
}

impl FileEntry {
    pub fn root() -> Self {
        Self {
            id: EntryId::ROOT,
            name: String::new(),
            entry_type: EntryType::Directory,
            attributes: ATTR_DIRECTORY | ATTR_READ_ONLY,
            size: 0,
            allocation_size: 0,
            sector: 0,
            location: DataLocation::None,
            create_timestamp: EPOCH_FILETIME,
            access_timestamp: EPOCH_FILETIME,
            write_timestamp: EPOCH_FILETIME,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn is_directory(&self) -> bool {
        self.entry_type == EntryType::Directory
    }

    pub fn is_file(&self) -> bool {
        self.entry_type == EntryType::File
    }

    pub fn is_accessible(&self) -> bool {
        self.location != DataLocation::Inaccessible
    }

    /// Absolute offset of the payload, if it is reachable.
    pub fn data_offset(&self) -> Option<u64> {
        match self.location {
            DataLocation::Extent { offset, .. } => Some(offset),
            _ => None,
        }
    }

    pub fn size_string(&self) -> String {
        if self.is_directory() {
            return String::new();
        }
        super::format_size(self.size)
    }

    /// Human-readable modification time.
    pub fn modified(&self) -> String {
        filetime_to_string(self.write_timestamp)
    }
}

fn filetime_to_string(filetime: u64) -> String {
    let ticks_since_unix = filetime as i64 - EPOCH_FILETIME as i64;
    let secs = ticks_since_unix.div_euclid(10_000_000);
    let nanos = (ticks_since_unix.rem_euclid(10_000_000) * 100) as u32;
    DateTime::<Utc>::from_timestamp(secs, nanos)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

/// Owns every entry of one mounted image.
///
/// The root is always [`EntryId::ROOT`]. A parent refers to its children by
/// id and each child keeps its parent's id for upward navigation; ids are
/// plain indices, so the tree has a single owner and no reference cycles.
#[derive(Debug, Clone)]
pub struct EntryTree {
    entries: Vec<FileEntry>,
}

impl Default for EntryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl EntryTree {
    pub fn new() -> Self {
        Self {
            entries: vec![FileEntry::root()],
        }
    }

    pub fn root(&self) -> &FileEntry {
        &self.entries[0]
    }

    pub fn get(&self, id: EntryId) -> Option<&FileEntry> {
        self.entries.get(id.0)
    }

    /// Number of entries including the root.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Append `entry` as the last child of `parent` and return its id.
    pub(crate) fn push_child(&mut self, parent: EntryId, mut entry: FileEntry) -> EntryId {
        let id = EntryId(self.entries.len());
        entry.id = id;
        entry.parent = Some(parent);
        self.entries.push(entry);
        self.entries[parent.0].children.push(id);
        id
    }

    pub fn children(&self, id: EntryId) -> impl Iterator<Item = &FileEntry> + '_ {
        self.get(id)
            .map(|e| e.children.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter_map(move |c| self.get(*c))
    }

    /// Full path of an entry, e.g. `/media/default.xex`. The root is `/`.
    pub fn path(&self, id: EntryId) -> String {
        let mut parts = Vec::new();
        let mut cur = self.get(id);
        while let Some(entry) = cur {
            if entry.parent.is_none() {
                break;
            }
            parts.push(entry.name.as_str());
            cur = entry.parent.and_then(|p| self.get(p));
        }
        if parts.is_empty() {
            return "/".into();
        }
        parts.reverse();
        format!("/{}", parts.join("/"))
    }

    /// Resolve a path name by name from the root. Both `/` and `\` separate
    /// components; names compare ASCII case-insensitively and the first match
    /// in directory order wins.
    pub fn resolve(&self, path: &str) -> Option<&FileEntry> {
        let mut cur = self.root();
        for component in path.split(['/', '\\']).filter(|c| !c.is_empty()) {
            if !cur.is_directory() {
                return None;
            }
            cur = self
                .children(cur.id)
                .find(|c| c.name.eq_ignore_ascii_case(component))?;
        }
        Some(cur)
    }

    /// All entries below `id` in depth-first order, paired with their depth
    /// relative to it.
    pub fn descendants(&self, id: EntryId) -> Vec<(usize, &FileEntry)> {
        let mut out = Vec::new();
        let mut stack: Vec<(usize, EntryId)> = self
            .get(id)
            .map(|e| e.children.iter().rev().map(|c| (0, *c)).collect())
            .unwrap_or_default();
        while let Some((depth, cur)) = stack.pop() {
            if let Some(entry) = self.get(cur) {
                out.push((depth, entry));
                stack.extend(entry.children.iter().rev().map(|c| (depth + 1, *c)));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, size: u64) -> FileEntry {
        FileEntry {
            name: name.into(),
            entry_type: EntryType::File,
            size,
            location: DataLocation::Extent {
                offset: 0x1000,
                size,
            },
            ..FileEntry::root()
        }
    }

    fn dir(name: &str) -> FileEntry {
        FileEntry {
            name: name.into(),
            ..FileEntry::root()
        }
    }

    #[test]
    fn test_paths_and_resolution() {
        let mut tree = EntryTree::new();
        let media = tree.push_child(EntryId::ROOT, dir("media"));
        let xex = tree.push_child(media, file("default.xex", 10));
        tree.push_child(EntryId::ROOT, file("nxeart", 4));

        assert_eq!(tree.path(EntryId::ROOT), "/");
        assert_eq!(tree.path(xex), "/media/default.xex");
        assert_eq!(tree.resolve("media\\DEFAULT.XEX").unwrap().id, xex);
        assert_eq!(tree.resolve("/media/").unwrap().id, media);
        assert!(tree.resolve("nxeart/child").is_none());
        assert!(tree.resolve("missing").is_none());
        assert_eq!(tree.resolve("").unwrap().id, EntryId::ROOT);
    }

    #[test]
    fn test_descendants_order() {
        let mut tree = EntryTree::new();
        let a = tree.push_child(EntryId::ROOT, dir("a"));
        tree.push_child(a, file("a1", 1));
        tree.push_child(EntryId::ROOT, file("b", 1));

        let names: Vec<(usize, &str)> = tree
            .descendants(EntryId::ROOT)
            .into_iter()
            .map(|(d, e)| (d, e.name.as_str()))
            .collect();
        assert_eq!(names, vec![(0, "a"), (1, "a1"), (0, "b")]);
    }

    #[test]
    fn test_epoch_timestamp_formatting() {
        let root = FileEntry::root();
        assert_eq!(root.modified(), "1970-01-01 00:00:00");
        assert!(root.size_string().is_empty());
        assert_eq!(file("x", 2048).size_string(), "2.0 KiB");
    }
}
