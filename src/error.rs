use std::path::PathBuf;

use thiserror::Error;

/// Fatal outcomes of mounting a disc image.
///
/// Local corruption inside one directory subtree is not part of this
/// taxonomy: it is logged and the rest of the tree is kept (see
/// [`crate::fs::gdfx::directory::SubtreeAbort`]).
#[derive(Error, Debug)]
pub enum MountError {
    #[error("Disc image not found: {}", .0.display())]
    ImageNotFound(PathBuf),

    #[error("Disc image could not be mapped after {attempts} attempts: {source}")]
    Io {
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Mount cancelled")]
    Cancelled,

    #[error("GDFX magic not found; this is not a valid Xbox 360 disc image")]
    FormatMismatch,

    #[error("Damaged disc image header: {0}")]
    DamagedHeader(String),

    #[error("No entries could be loaded from this disc image")]
    NothingRecovered,
}

impl MountError {
    /// True for failures that may go away if the mount is attempted again
    /// later (device busy, interference). Format and header problems are
    /// properties of the image, and cancellation is the caller's own choice.
    pub fn is_transient(&self) -> bool {
        matches!(self, MountError::Io { .. })
    }

    /// Short machine-friendly classification, used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            MountError::ImageNotFound(_) => "not-found",
            MountError::Io { .. } => "io-failure",
            MountError::Cancelled => "cancelled",
            MountError::FormatMismatch => "format-mismatch",
            MountError::DamagedHeader(_) => "damaged-header",
            MountError::NothingRecovered => "nothing-recovered",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_io_failures_are_transient() {
        let io = MountError::Io {
            attempts: 6,
            source: std::io::Error::other("device not ready"),
        };
        assert!(io.is_transient());
        assert!(!MountError::Cancelled.is_transient());
        assert!(!MountError::FormatMismatch.is_transient());
        assert!(!MountError::NothingRecovered.is_transient());
        assert_eq!(MountError::Cancelled.kind(), "cancelled");
        assert_eq!(
            io.to_string(),
            "Disc image could not be mapped after 6 attempts: device not ready"
        );
    }
}
