//! Read-only mounting of Xbox 360 GDFX disc images.
//!
//! ```no_run
//! use std::path::Path;
//! use rusty_gdfx::{GdfxFilesystem, InterferenceMonitor, MountConfig};
//! use rusty_gdfx::fs::filesystem::Filesystem;
//!
//! let monitor = InterferenceMonitor::new();
//! let fs = GdfxFilesystem::mount(
//!     Path::new("game.iso"),
//!     &MountConfig::load(),
//!     &monitor,
//!     &|| false,
//! )?;
//! print!("{}", fs.dump());
//! # Ok::<(), rusty_gdfx::MountError>(())
//! ```

pub mod config;
pub mod error;
pub mod fs;
pub mod storage;

pub use config::MountConfig;
pub use error::MountError;
pub use fs::gdfx::GdfxFilesystem;
pub use storage::{InterferenceLevel, InterferenceMonitor, StorageView};
