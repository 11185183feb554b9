pub mod entry;
pub mod filesystem;
pub mod gdfx;

use std::path::Path;

use crate::config::MountConfig;
use crate::error::MountError;
use crate::storage::InterferenceMonitor;
use filesystem::Filesystem;

/// Mount a disc image for browsing.
///
/// GDFX is the only layout recognized; anything else fails with
/// [`MountError::FormatMismatch`].
pub fn open_filesystem(
    path: &Path,
    config: &MountConfig,
    monitor: &InterferenceMonitor,
    cancel_check: &dyn Fn() -> bool,
) -> Result<Box<dyn Filesystem>, MountError> {
    Ok(Box::new(gdfx::GdfxFilesystem::mount(
        path,
        config,
        monitor,
        cancel_check,
    )?))
}

/// Format a byte count as a human-readable size string using binary (base-1024) units.
pub fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    const GIB: u64 = 1024 * MIB;

    if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}
