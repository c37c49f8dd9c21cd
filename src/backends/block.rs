// Direct-attach block device operations
//
// Signature erase goes through wipefs; the zero fill is written natively in
// fixed-size chunks and synced before returning.

use super::command::{CommandRunner, SystemRunner};
use crate::DriveResult;
use std::fs::OpenOptions;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub const SECTOR_SIZE: u64 = 512;
/// A quick wipe zeroes the first 50 sectors after the signature erase.
pub const QUICK_WIPE_SECTORS: u64 = 50;
const ZERO_CHUNK: u64 = 4 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeroExtent {
    /// Zero at most this many bytes from the start of the device
    Leading(u64),
    WholeDevice,
}

impl ZeroExtent {
    pub fn quick() -> Self {
        ZeroExtent::Leading(QUICK_WIPE_SECTORS * SECTOR_SIZE)
    }
}

pub trait BlockDevices: Send + Sync {
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;

    /// Remove filesystem, RAID and partition-table signatures.
    fn erase_signatures(&self, device: &Path) -> DriveResult<()>;

    /// Returns the number of bytes zeroed.
    fn zero_fill(&self, device: &Path, extent: ZeroExtent) -> DriveResult<u64>;
}

pub struct BlockTools<R = SystemRunner> {
    runner: R,
    wipefs: String,
}

impl BlockTools<SystemRunner> {
    pub fn system(wipefs: &str) -> Self {
        Self::new(SystemRunner, wipefs)
    }
}

impl<R: CommandRunner> BlockTools<R> {
    pub fn new(runner: R, wipefs: &str) -> Self {
        Self {
            runner,
            wipefs: wipefs.to_string(),
        }
    }
}

impl<R: CommandRunner> BlockDevices for BlockTools<R> {
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        std::fs::canonicalize(path)
    }

    fn erase_signatures(&self, device: &Path) -> DriveResult<()> {
        let device = device.to_string_lossy();
        self.runner
            .run(&self.wipefs, &["-a", &device])?
            .checked(&self.wipefs)?;
        Ok(())
    }

    fn zero_fill(&self, device: &Path, extent: ZeroExtent) -> DriveResult<u64> {
        zero_fill_file(device, extent)
    }
}

/// Overwrite the start of `path` (or all of it) with zeros.
///
/// The write never extends past the current end of the file, so a leading
/// extent larger than the device is clamped to the device size.
pub fn zero_fill_file(path: &Path, extent: ZeroExtent) -> DriveResult<u64> {
    let mut file = OpenOptions::new().write(true).open(path)?;

    let device_size = file.seek(SeekFrom::End(0))?;
    let size = match extent {
        ZeroExtent::Leading(bytes) => bytes.min(device_size),
        ZeroExtent::WholeDevice => device_size,
    };

    file.seek(SeekFrom::Start(0))?;

    let zeros = vec![0u8; ZERO_CHUNK.min(size.max(1)) as usize];
    let mut written = 0u64;

    while written < size {
        let to_write = std::cmp::min(zeros.len() as u64, size - written);
        file.write_all(&zeros[..to_write as usize])?;
        written += to_write;
    }

    file.sync_all()?;
    tracing::debug!(device = %path.display(), bytes = written, "Zero fill complete");

    Ok(written)
}
