//! Read-only access to the backing disc image.
//!
//! [`open_image`] maps the image into memory, retrying transient failures
//! with capped exponential backoff. Every successful open is timed and fed to
//! the shared [`InterferenceMonitor`].

pub mod interference;

use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{error, info, warn};
use memmap2::Mmap;

use crate::config::MountConfig;
use crate::error::MountError;
pub use interference::{InterferenceLevel, InterferenceMonitor};

enum Backing {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

/// Immutable byte view of one open disc image.
pub struct StorageView {
    backing: Backing,
}

impl StorageView {
    /// Map `file` read-only. Zero-length files cannot be mapped and are
    /// represented as an empty view.
    pub fn map(file: &File) -> io::Result<Self> {
        if file.metadata()?.len() == 0 {
            return Ok(Self::from_bytes(Vec::new()));
        }
        // Safety: the mapping is read-only and the view never hands out
        // mutable access; the image is not expected to change while mounted.
        let mmap = unsafe { Mmap::map(file)? };
        Ok(Self {
            backing: Backing::Mapped(mmap),
        })
    }

    /// Wrap an in-memory image.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            backing: Backing::Owned(data),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match &self.backing {
            Backing::Mapped(m) => m,
            Backing::Owned(v) => v,
        }
    }

    /// Total size of the image in bytes.
    pub fn size(&self) -> u64 {
        self.as_bytes().len() as u64
    }

    /// Bytes in `offset..offset + len`, clamped to the end of the view.
    pub fn slice(&self, offset: u64, len: u64) -> &[u8] {
        let data = self.as_bytes();
        let start = offset.min(data.len() as u64) as usize;
        let end = offset.saturating_add(len).min(data.len() as u64) as usize;
        &data[start..end]
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self.backing, Backing::Mapped(_))
    }
}

impl std::fmt::Debug for StorageView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageView")
            .field("size", &self.size())
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

/// Produces a [`StorageView`] for a path. Swapped out in tests to simulate
/// flaky devices.
pub trait ImageOpener {
    fn open(&self, path: &Path) -> io::Result<StorageView>;
}

/// Default opener: read-only memory map of the host file.
pub struct MmapOpener;

impl ImageOpener for MmapOpener {
    fn open(&self, path: &Path) -> io::Result<StorageView> {
        let file = File::open(path)?;
        StorageView::map(&file)
    }
}

/// Waits between retry attempts.
pub trait Sleeper {
    /// Sleep for `delay`, returning early with `false` if `cancel_check`
    /// reports cancellation.
    fn sleep(&self, delay: Duration, cancel_check: &dyn Fn() -> bool) -> bool;
}

/// Sleeps on the calling thread in short slices so a cancelled mount is
/// noticed promptly.
pub struct ThreadSleeper;

const SLEEP_SLICE: Duration = Duration::from_millis(25);

impl Sleeper for ThreadSleeper {
    fn sleep(&self, delay: Duration, cancel_check: &dyn Fn() -> bool) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            if cancel_check() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

/// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`, capped.
pub fn backoff_delay(config: &MountConfig, retry: u32) -> Duration {
    let base = config.base_retry_delay_ms;
    let factor = 1u64.checked_shl(retry.saturating_sub(1)).unwrap_or(u64::MAX);
    Duration::from_millis(base.saturating_mul(factor).min(config.max_retry_delay_ms))
}

/// Open and map a disc image with the default opener and sleeper.
pub fn open_image(
    path: &Path,
    config: &MountConfig,
    monitor: &InterferenceMonitor,
    cancel_check: &dyn Fn() -> bool,
) -> Result<Arc<StorageView>, MountError> {
    open_image_with(path, config, monitor, cancel_check, &MmapOpener, &ThreadSleeper)
}

/// Open a disc image through `opener`, retrying up to
/// `config.max_retries` additional times.
pub fn open_image_with(
    path: &Path,
    config: &MountConfig,
    monitor: &InterferenceMonitor,
    cancel_check: &dyn Fn() -> bool,
    opener: &dyn ImageOpener,
    sleeper: &dyn Sleeper,
) -> Result<Arc<StorageView>, MountError> {
    info!("Opening disc image: {}", path.display());

    if !path.exists() {
        error!("Disc image does not exist: {}", path.display());
        return Err(MountError::ImageNotFound(path.to_path_buf()));
    }

    if monitor.is_active() {
        warn!("Interference detected before loading: {}", monitor.advice());
        warn!("Continuing with retry logic enabled");
    }

    let max_retries = config.max_retries;
    let mut last_error = None;

    for retry in 0..=max_retries {
        if cancel_check() {
            info!("Mount of {} cancelled", path.display());
            return Err(MountError::Cancelled);
        }

        if retry > 0 {
            let delay = backoff_delay(config, retry);
            warn!("Retry attempt {retry} of {max_retries} for disc image");
            info!("Waiting {}ms before retry", delay.as_millis());
            if !sleeper.sleep(delay, cancel_check) {
                info!("Mount of {} cancelled during backoff", path.display());
                return Err(MountError::Cancelled);
            }
            if monitor.is_active() {
                warn!("Interference still detected: {}", monitor.advice());
            }
        }

        let start = Instant::now();
        match opener.open(path) {
            Ok(view) => {
                let elapsed = start.elapsed();
                monitor.record(elapsed, view.size());

                if retry > 0 {
                    info!("Mapped disc image after {retry} retries");
                }
                let size_mib = view.size() / (1024 * 1024);
                info!(
                    "Image size: {} MiB, load time: {}ms",
                    size_mib,
                    elapsed.as_millis()
                );
                if size_mib > 0
                    && elapsed.as_millis()
                        > size_mib.saturating_mul(config.slow_load_ms_per_mib) as u128
                {
                    warn!("Load was slower than expected - possible interference");
                    warn!("Consider moving phone away or disabling wireless devices");
                }
                return Ok(Arc::new(view));
            }
            Err(e) => {
                error!(
                    "Disc image could not be mapped (attempt {}): {e}",
                    retry + 1
                );
                // The file may have disappeared between attempts.
                if !path.exists() {
                    error!("Disc image no longer exists: {}", path.display());
                    return Err(MountError::ImageNotFound(path.to_path_buf()));
                }
                last_error = Some(e);
            }
        }
    }

    error!("All retry attempts exhausted for {}", path.display());
    error!("Try:");
    error!("  1. Moving phone away from PC");
    error!("  2. Disabling Bluetooth/WiFi temporarily");
    error!("  3. Using a different USB port or drive");

    Err(MountError::Io {
        attempts: max_retries.saturating_add(1),
        source: last_error.unwrap_or_else(|| io::Error::other("disc image could not be mapped")),
    })
}
