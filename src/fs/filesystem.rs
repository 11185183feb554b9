use std::fmt;
use std::io::Write;

use super::entry::FileEntry;

/// Bytes requested per `read_at` call when streaming a whole file.
const READ_CHUNK: usize = 64 * 1024;

/// Trait for browsing a mounted, read-only disc filesystem.
///
/// The entry tree is fully built at mount time and never changes afterwards,
/// so every method takes `&self` and implementations are safe to share
/// between threads.
pub trait Filesystem: Send + Sync {
    /// Get the root directory entry.
    fn root(&self) -> &FileEntry;

    /// List the contents of a directory.
    fn list_directory(&self, entry: &FileEntry) -> Result<Vec<&FileEntry>, FilesystemError>;

    /// Look up an entry by path (`/` or `\` separated, case-insensitive).
    fn resolve_path(&self, path: &str) -> Option<&FileEntry>;

    /// Full path of an entry, rebuilt from its parent links.
    fn entry_path(&self, entry: &FileEntry) -> String;

    /// Read up to `buf.len()` bytes of a file starting at `offset` within the
    /// file. Returns the number of bytes read; 0 at end of file.
    fn read_at(&self, entry: &FileEntry, offset: u64, buf: &mut [u8])
        -> Result<usize, FilesystemError>;

    /// Read file contents (up to `max_bytes`).
    ///
    /// The declared size is not trusted for allocation: data is read in
    /// chunks and the result only grows by what the image actually holds.
    fn read_file(&self, entry: &FileEntry, max_bytes: usize) -> Result<Vec<u8>, FilesystemError> {
        let limit = entry.size.min(max_bytes as u64);
        let mut data = Vec::new();
        let mut chunk = vec![0u8; limit.min(READ_CHUNK as u64) as usize];
        // Called at least once so inaccessible entries surface their error.
        loop {
            let n = self.read_at(entry, data.len() as u64, &mut chunk)?;
            data.extend_from_slice(&chunk[..n]);
            let remaining = limit - data.len() as u64;
            if n == 0 || remaining == 0 {
                break;
            }
            chunk.truncate(remaining.min(READ_CHUNK as u64) as usize);
        }
        Ok(data)
    }

    /// Volume label, if available.
    fn volume_label(&self) -> Option<&str>;

    /// Filesystem type name (e.g., "GDFX").
    fn fs_type(&self) -> &str;

    /// Total size of the backing image in bytes.
    fn total_size(&self) -> u64;

    /// Bytes covered by reachable file payloads.
    fn used_size(&self) -> u64;

    /// Human-readable listing of the whole tree, for diagnostics.
    fn dump(&self) -> String;

    /// Stream file data to a writer. Returns the number of bytes written.
    fn write_file_to(&self, entry: &FileEntry, writer: &mut dyn Write) -> Result<u64, FilesystemError> {
        let mut buf = vec![0u8; READ_CHUNK];
        let mut offset = 0u64;
        loop {
            let n = self.read_at(entry, offset, &mut buf)?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n])?;
            offset += n as u64;
        }
        Ok(offset)
    }
}

/// Errors from filesystem operations.
#[derive(Debug)]
pub enum FilesystemError {
    Io(std::io::Error),
    NotADirectory(String),
    NotAFile(String),
    NotFound(String),
    /// The entry's payload lies outside the image.
    Inaccessible(String),
}

impl fmt::Display for FilesystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilesystemError::Io(e) => write!(f, "I/O error: {e}"),
            FilesystemError::NotADirectory(p) => write!(f, "not a directory: {p}"),
            FilesystemError::NotAFile(p) => write!(f, "not a file: {p}"),
            FilesystemError::NotFound(p) => write!(f, "not found: {p}"),
            FilesystemError::Inaccessible(p) => {
                write!(f, "inaccessible (truncated or corrupt image): {p}")
            }
        }
    }
}

impl std::error::Error for FilesystemError {}

impl From<std::io::Error> for FilesystemError {
    fn from(e: std::io::Error) -> Self {
        FilesystemError::Io(e)
    }
}
