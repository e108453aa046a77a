//! Block device interface.
//!
//! The filesystem talks to storage exclusively through [`BlockDevice`]:
//! whole-sector reads and writes addressed by sector number. The driver
//! behind the trait may suspend the caller while the transfer is in
//! flight; it must not fail. A device that cannot complete a transfer
//! panics, taking the kernel down with it.

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use spin::Mutex;

use crate::param::BSIZE;

/// Index of a 512-byte sector on the device.
pub type Sector = u32;

/// Fixed-size random-access storage in sector units.
pub trait BlockDevice: Send + Sync {
    /// Reads sector `sector` into `buf`. `buf` must be exactly one
    /// sector long.
    fn read(&self, sector: Sector, buf: &mut [u8]);

    /// Writes `buf` to sector `sector`. `buf` must be exactly one
    /// sector long.
    fn write(&self, sector: Sector, buf: &[u8]);

    /// Total number of sectors on the device.
    fn nsectors(&self) -> u32;
}

/// Memory-backed block device.
///
/// Cloning yields a second handle onto the same storage, which lets a
/// caller reopen a "disk" after unmounting the filesystem that owned it.
#[derive(Clone)]
pub struct MemDisk {
    sectors: Arc<Mutex<Vec<u8>>>,
    nsectors: u32,
}

impl MemDisk {
    /// Creates a zero-filled device of `nsectors` sectors.
    pub fn new(nsectors: u32) -> Self {
        Self {
            sectors: Arc::new(Mutex::new(vec![0; nsectors as usize * BSIZE])),
            nsectors,
        }
    }
}

impl BlockDevice for MemDisk {
    fn read(&self, sector: Sector, buf: &mut [u8]) {
        assert!(sector < self.nsectors, "MemDisk::read: sector out of range");
        assert_eq!(buf.len(), BSIZE, "MemDisk::read: not a whole sector");
        let base = sector as usize * BSIZE;
        buf.copy_from_slice(&self.sectors.lock()[base..base + BSIZE]);
    }

    fn write(&self, sector: Sector, buf: &[u8]) {
        assert!(sector < self.nsectors, "MemDisk::write: sector out of range");
        assert_eq!(buf.len(), BSIZE, "MemDisk::write: not a whole sector");
        let base = sector as usize * BSIZE;
        self.sectors.lock()[base..base + BSIZE].copy_from_slice(buf);
    }

    fn nsectors(&self) -> u32 {
        self.nsectors
    }
}
