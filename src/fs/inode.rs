//! Inodes.
//!
//! An inode describes a single file or directory. The on-disk record
//! ([`DiskInode`]) occupies exactly one sector and carries the index
//! tree that maps file bytes to data sectors: twelve direct pointers,
//! one single-indirect block of 128 pointers, and one double-indirect
//! block of 128 blocks of 128 pointers.
//!
//! The index tree grows in place. The `*_cnt` fields count allocated
//! index blocks per level and the `*_curr_usage` fields count filled
//! slots in the block currently being filled, so a later extension (or
//! a partial one that ran the disk dry) resumes exactly where the
//! previous one stopped, and `free` walks the same structure in
//! reverse. The counters always form a prefix of the tree: a level is
//! only started once every earlier level is full.
//!
//! In memory, the kernel keeps one [`Inode`] per open on-disk record in
//! a table keyed by the record's sector, so every holder of a given
//! sector sees the same `open_cnt`, `deny_write_cnt` and `removed`
//! state. [`RcInode`] is the counted handle: cloning it reopens the
//! inode, dropping it closes, and the last close of a removed inode
//! returns the record's sector and its whole index tree to the
//! free-map. The syscall layer's filesystem lock serializes all of
//! this; the spinlocks below only keep the table and each inode
//! internally consistent.

use core::mem;

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use spin::Mutex;
use static_assertions::const_assert_eq;
use zerocopy::{AsBytes, FromBytes};

use crate::block::{BlockDevice, Sector};
use crate::fs::freemap::FreeMap;
use crate::fs::FileSystem;
use crate::param::{BSIZE, MAXFILE_BYTES, NDIRECT, NDINDIRECT, NINDIRECT};
use crate::{FsError, Result};

/// Identifies an inode record.
pub(crate) const INODE_MAGIC: u32 = 0x494e4f44;

const NPTR: u32 = NINDIRECT as u32;

/// Sectors needed to hold `length` bytes of data.
fn bytes_to_sectors(length: u32) -> u32 {
    (length + BSIZE as u32 - 1) / BSIZE as u32
}

/// On-disk inode. Exactly one sector.
#[repr(C)]
#[derive(Clone, Copy, AsBytes, FromBytes)]
pub(crate) struct DiskInode {
    /// File size in bytes.
    pub length: u32,
    pub magic: u32,
    /// Sector this record lives in.
    pub sector: Sector,
    pub is_dir: u32,

    pub dir_cnt: u32,
    pub direct: [Sector; NDIRECT],
    pub indir_cnt: u32,
    pub indir_curr_usage: u32,
    pub indirect: [Sector; 1],
    pub dindir_cnt: u32,
    pub dindir_curr_usage: u32,
    pub dindir_lv2_curr_usage: u32,
    pub dindirect: [Sector; 1],

    unused: [[u32; 13]; 8],
}

const_assert_eq!(mem::size_of::<DiskInode>(), BSIZE);

/// A sector full of sector pointers.
#[repr(C)]
#[derive(AsBytes, FromBytes)]
struct IndirBlock {
    ptr: [Sector; NINDIRECT],
}

const_assert_eq!(mem::size_of::<IndirBlock>(), BSIZE);

impl IndirBlock {
    fn zeroed() -> Self {
        Self { ptr: [0; NINDIRECT] }
    }

    fn load<D: BlockDevice>(dev: &D, sector: Sector) -> Self {
        let mut blk = Self::zeroed();
        dev.read(sector, blk.as_bytes_mut());
        blk
    }

    fn store<D: BlockDevice>(&self, dev: &D, sector: Sector) {
        dev.write(sector, self.as_bytes());
    }
}

/// Allocates a sector and zero-fills it on disk.
fn alloc_zeroed<D: BlockDevice>(dev: &D, fm: &mut FreeMap) -> Result<Sector> {
    let sector = fm.allocate(dev, 1)?;
    dev.write(sector, &[0; BSIZE]);
    Ok(sector)
}

impl DiskInode {
    pub fn new(sector: Sector, is_dir: bool) -> Self {
        Self {
            length: 0,
            magic: INODE_MAGIC,
            sector,
            is_dir: is_dir as u32,
            dir_cnt: 0,
            direct: [0; NDIRECT],
            indir_cnt: 0,
            indir_curr_usage: 0,
            indirect: [0; 1],
            dindir_cnt: 0,
            dindir_curr_usage: 0,
            dindir_lv2_curr_usage: 0,
            dindirect: [0; 1],
            unused: [[0; 13]; 8],
        }
    }

    pub fn load<D: BlockDevice>(dev: &D, sector: Sector) -> Self {
        let mut disk = Self::new(0, false);
        dev.read(sector, disk.as_bytes_mut());
        debug_assert_eq!(disk.magic, INODE_MAGIC, "inode {}: bad magic", sector);
        debug_assert_eq!(disk.sector, sector, "inode {}: wrong self sector", sector);
        disk
    }

    pub fn store<D: BlockDevice>(&self, dev: &D) {
        dev.write(self.sector, self.as_bytes());
    }

    /// Returns the sector holding byte `pos`, or `None` if the inode
    /// does not contain a byte at `pos`.
    pub fn byte_to_sector<D: BlockDevice>(&self, dev: &D, pos: u32) -> Option<Sector> {
        if pos >= self.length {
            return None;
        }
        let mut pos = pos as usize;

        if pos < NDIRECT * BSIZE {
            return Some(self.direct[pos / BSIZE]);
        }
        pos -= NDIRECT * BSIZE;

        if pos < NINDIRECT * BSIZE {
            let blk = IndirBlock::load(dev, self.indirect[0]);
            return Some(blk.ptr[pos / BSIZE]);
        }
        pos -= NINDIRECT * BSIZE;

        if pos < NDINDIRECT * BSIZE {
            let lv1 = IndirBlock::load(dev, self.dindirect[0]);
            let lv2 = IndirBlock::load(dev, lv1.ptr[pos / (NINDIRECT * BSIZE)]);
            return Some(lv2.ptr[pos % (NINDIRECT * BSIZE) / BSIZE]);
        }

        None
    }

    /// Grows the index tree to cover `new_length` bytes, zero-filling
    /// every new data sector, and writes the record back. Returns the
    /// committed length: `new_length` on success, or, if the free-map
    /// runs dry partway, the length covered by the sectors that were
    /// allocated before it did. Contraction is forbidden.
    pub fn extend<D: BlockDevice>(&mut self, dev: &D, fm: &mut FreeMap, new_length: u32) -> u32 {
        debug_assert!(new_length >= self.length, "inode {}: contraction", self.sector);
        let mut needed = bytes_to_sectors(new_length) - bytes_to_sectors(self.length);
        let mut full = false;

        // Direct slots.
        while needed > 0 && !full && self.dir_cnt < NDIRECT as u32 {
            match alloc_zeroed(dev, fm) {
                Ok(sector) => {
                    self.direct[self.dir_cnt as usize] = sector;
                    self.dir_cnt += 1;
                    needed -= 1;
                }
                Err(_) => full = true,
            }
        }

        // Single-indirect range.
        if needed > 0 && !full && (self.indir_cnt == 0 || self.indir_curr_usage < NPTR) {
            let mut blk = if self.indir_cnt == 0 {
                match fm.allocate(dev, 1) {
                    Ok(sector) => {
                        self.indirect[0] = sector;
                        self.indir_cnt = 1;
                        self.indir_curr_usage = 0;
                        IndirBlock::zeroed()
                    }
                    Err(_) => {
                        full = true;
                        IndirBlock::zeroed()
                    }
                }
            } else {
                IndirBlock::load(dev, self.indirect[0])
            };
            if !full {
                while needed > 0 && self.indir_curr_usage < NPTR {
                    match alloc_zeroed(dev, fm) {
                        Ok(sector) => {
                            blk.ptr[self.indir_curr_usage as usize] = sector;
                            self.indir_curr_usage += 1;
                            needed -= 1;
                        }
                        Err(_) => {
                            full = true;
                            break;
                        }
                    }
                }
                blk.store(dev, self.indirect[0]);
            }
        }

        // Double-indirect range.
        if needed > 0
            && !full
            && (self.dindir_cnt == 0
                || self.dindir_curr_usage < NPTR
                || self.dindir_lv2_curr_usage < NPTR)
        {
            let mut lv1 = if self.dindir_cnt == 0 {
                match fm.allocate(dev, 1) {
                    Ok(sector) => {
                        self.dindirect[0] = sector;
                        self.dindir_cnt = 1;
                        self.dindir_curr_usage = 0;
                        IndirBlock::zeroed()
                    }
                    Err(_) => {
                        full = true;
                        IndirBlock::zeroed()
                    }
                }
            } else {
                IndirBlock::load(dev, self.dindirect[0])
            };
            if !full {
                while needed > 0
                    && !full
                    && (self.dindir_curr_usage < NPTR || self.dindir_lv2_curr_usage < NPTR)
                {
                    // Level-2 block to fill: the one the usage cursor
                    // points into, or a fresh one once it is full.
                    let lv2_sector;
                    let mut lv2;
                    if self.dindir_curr_usage == 0 || self.dindir_lv2_curr_usage == NPTR {
                        match fm.allocate(dev, 1) {
                            Ok(sector) => {
                                lv1.ptr[self.dindir_curr_usage as usize] = sector;
                                self.dindir_curr_usage += 1;
                                self.dindir_lv2_curr_usage = 0;
                                lv2_sector = sector;
                                lv2 = IndirBlock::zeroed();
                            }
                            Err(_) => {
                                full = true;
                                break;
                            }
                        }
                    } else {
                        lv2_sector = lv1.ptr[(self.dindir_curr_usage - 1) as usize];
                        lv2 = IndirBlock::load(dev, lv2_sector);
                    }
                    while needed > 0 && self.dindir_lv2_curr_usage < NPTR {
                        match alloc_zeroed(dev, fm) {
                            Ok(sector) => {
                                lv2.ptr[self.dindir_lv2_curr_usage as usize] = sector;
                                self.dindir_lv2_curr_usage += 1;
                                needed -= 1;
                            }
                            Err(_) => {
                                full = true;
                                break;
                            }
                        }
                    }
                    lv2.store(dev, lv2_sector);
                }
                lv1.store(dev, self.dindirect[0]);
            }
        }

        self.length = new_length - needed * BSIZE as u32;
        self.store(dev);
        self.length
    }

    /// Releases every data and index sector of the tree, deepest level
    /// first, so the counters stay consistent with the remaining tree
    /// at every step. Does not release the record's own sector.
    pub fn free<D: BlockDevice>(&mut self, dev: &D, fm: &mut FreeMap) {
        while self.dindir_cnt != 0 {
            let lv1 = IndirBlock::load(dev, self.dindirect[0]);
            while self.dindir_curr_usage != 0 {
                let lv2_sector = lv1.ptr[(self.dindir_curr_usage - 1) as usize];
                let lv2 = IndirBlock::load(dev, lv2_sector);
                while self.dindir_lv2_curr_usage != 0 {
                    fm.release(dev, lv2.ptr[(self.dindir_lv2_curr_usage - 1) as usize], 1);
                    self.dindir_lv2_curr_usage -= 1;
                }
                fm.release(dev, lv2_sector, 1);
                self.dindir_curr_usage -= 1;
                if self.dindir_curr_usage != 0 {
                    self.dindir_lv2_curr_usage = NPTR;
                }
            }
            fm.release(dev, self.dindirect[0], 1);
            self.dindir_cnt -= 1;
        }

        while self.indir_cnt != 0 {
            let blk = IndirBlock::load(dev, self.indirect[0]);
            while self.indir_curr_usage != 0 {
                fm.release(dev, blk.ptr[(self.indir_curr_usage - 1) as usize], 1);
                self.indir_curr_usage -= 1;
            }
            fm.release(dev, self.indirect[0], 1);
            self.indir_cnt -= 1;
        }

        while self.dir_cnt != 0 {
            fm.release(dev, self.direct[(self.dir_cnt - 1) as usize], 1);
            self.dir_cnt -= 1;
        }

        self.length = 0;
    }
}

/// Copies inode content at `offset` into `buf`. Returns the number of
/// bytes read, short when the request runs past end of file.
/// Sector-aligned whole-sector chunks go straight to the caller's
/// buffer; everything else stages through a bounce sector.
pub(crate) fn read_at<D: BlockDevice>(
    disk: &DiskInode,
    dev: &D,
    buf: &mut [u8],
    offset: u32,
) -> usize {
    let length = disk.length as usize;
    let mut off = offset as usize;
    let mut done = 0;
    let mut bounce = [0u8; BSIZE];

    while done < buf.len() {
        let sector_ofs = off % BSIZE;
        let inode_left = length.saturating_sub(off);
        let sector_left = BSIZE - sector_ofs;
        let chunk = (buf.len() - done).min(inode_left).min(sector_left);
        if chunk == 0 {
            break;
        }
        let sector = match disk.byte_to_sector(dev, off as u32) {
            Some(sector) => sector,
            None => break,
        };

        if sector_ofs == 0 && chunk == BSIZE {
            dev.read(sector, &mut buf[done..done + BSIZE]);
        } else {
            dev.read(sector, &mut bounce);
            buf[done..done + chunk].copy_from_slice(&bounce[sector_ofs..sector_ofs + chunk]);
        }

        done += chunk;
        off += chunk;
    }
    done
}

/// Copies `buf` into inode content at `offset`. The tree must already
/// cover the written range; returns the number of bytes written, short
/// only when it does not. Partial sectors are read-modify-written
/// through a bounce sector.
pub(crate) fn write_at<D: BlockDevice>(
    disk: &DiskInode,
    dev: &D,
    buf: &[u8],
    offset: u32,
) -> usize {
    let length = disk.length as usize;
    let mut off = offset as usize;
    let mut done = 0;
    let mut bounce = [0u8; BSIZE];

    while done < buf.len() {
        let sector_ofs = off % BSIZE;
        let inode_left = length.saturating_sub(off);
        let sector_left = BSIZE - sector_ofs;
        let chunk = (buf.len() - done).min(inode_left).min(sector_left);
        if chunk == 0 {
            break;
        }
        let sector = match disk.byte_to_sector(dev, off as u32) {
            Some(sector) => sector,
            None => break,
        };

        if sector_ofs == 0 && chunk == BSIZE {
            dev.write(sector, &buf[done..done + BSIZE]);
        } else {
            // Keep the bytes around the chunk if the sector holds any.
            if sector_ofs > 0 || chunk < sector_left {
                dev.read(sector, &mut bounce);
            } else {
                bounce = [0; BSIZE];
            }
            bounce[sector_ofs..sector_ofs + chunk].copy_from_slice(&buf[done..done + chunk]);
            dev.write(sector, &bounce);
        }

        done += chunk;
        off += chunk;
    }
    done
}

pub(crate) struct InodeInner {
    pub open_cnt: u32,
    pub deny_write_cnt: u32,
    pub removed: bool,
    /// Cached copy of the on-disk record.
    pub disk: DiskInode,
}

/// In-memory inode, shared by every opener of one on-disk record.
pub(crate) struct Inode {
    pub sector: Sector,
    pub inner: Mutex<InodeInner>,
}

/// Open-inode table: at most one `Inode` per on-disk sector.
pub(crate) type ITable = BTreeMap<Sector, Arc<Inode>>;

/// Counted handle to an open inode.
///
/// `Clone` reopens, `Drop` closes. The last close of a removed inode
/// releases its sectors. Holding one pins the filesystem borrow, so no
/// handle can outlive an unmount.
pub struct RcInode<'s, D: BlockDevice> {
    pub(crate) fs: &'s FileSystem<D>,
    pub(crate) ip: Arc<Inode>,
}

impl<'s, D: BlockDevice> RcInode<'s, D> {
    pub(crate) fn fs(&self) -> &'s FileSystem<D> {
        self.fs
    }

    /// The sector number of the on-disk record, which doubles as the
    /// inode number.
    pub fn inumber(&self) -> u32 {
        self.ip.sector
    }

    pub fn is_dir(&self) -> bool {
        self.ip.inner.lock().disk.is_dir != 0
    }

    pub fn is_removed(&self) -> bool {
        self.ip.inner.lock().removed
    }

    pub fn len(&self) -> u32 {
        self.ip.inner.lock().disk.length
    }

    /// Marks the inode for deletion once the last handle closes.
    pub(crate) fn remove(&self) {
        self.ip.inner.lock().removed = true;
    }

    pub(crate) fn open_count(&self) -> u32 {
        self.ip.inner.lock().open_cnt
    }

    pub(crate) fn deny_write(&self) {
        let mut inner = self.ip.inner.lock();
        inner.deny_write_cnt += 1;
        assert!(inner.deny_write_cnt <= inner.open_cnt);
    }

    pub(crate) fn allow_write(&self) {
        let mut inner = self.ip.inner.lock();
        assert!(inner.deny_write_cnt > 0);
        assert!(inner.deny_write_cnt <= inner.open_cnt);
        inner.deny_write_cnt -= 1;
    }

    pub fn read_at(&self, buf: &mut [u8], offset: u32) -> usize {
        let inner = self.ip.inner.lock();
        read_at(&inner.disk, &self.fs.dev, buf, offset)
    }

    /// Writes `buf` at `offset`, extending the file first when the
    /// write ends past the current length. Returns 0 while writes are
    /// denied, and `NoSpace` when the device fills up or the write
    /// would end past the maximum file size (any partial extension
    /// stays committed).
    pub fn write_at(&self, buf: &[u8], offset: u32) -> Result<usize> {
        let mut inner = self.ip.inner.lock();
        if inner.deny_write_cnt > 0 {
            return Ok(0);
        }
        let end = offset as u64 + buf.len() as u64;
        if end > MAXFILE_BYTES as u64 {
            return Err(FsError::NoSpace);
        }
        let end = end as u32;
        if end > inner.disk.length {
            let mut fm = self.fs.freemap.lock();
            if inner.disk.extend(&self.fs.dev, &mut fm, end) != end {
                return Err(FsError::NoSpace);
            }
        }
        Ok(write_at(&inner.disk, &self.fs.dev, buf, offset))
    }
}

impl<D: BlockDevice> Clone for RcInode<'_, D> {
    fn clone(&self) -> Self {
        self.ip.inner.lock().open_cnt += 1;
        Self {
            fs: self.fs,
            ip: Arc::clone(&self.ip),
        }
    }
}

impl<D: BlockDevice> Drop for RcInode<'_, D> {
    fn drop(&mut self) {
        self.fs.close_inode(&self.ip);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MemDisk;
    use crate::param::MAXFILE;

    fn setup(nsectors: u32) -> (MemDisk, FreeMap, DiskInode) {
        let dev = MemDisk::new(nsectors);
        let mut fm = FreeMap::new(nsectors);
        let sector = fm.allocate(&dev, 1).unwrap();
        let disk = DiskInode::new(sector, false);
        (dev, fm, disk)
    }

    #[test]
    fn max_file_size() {
        assert_eq!(MAXFILE_BYTES, 8_459_264);
        assert_eq!(MAXFILE, 12 + 128 + 128 * 128);
    }

    #[test]
    fn extend_fills_direct_then_indirect() {
        let (dev, mut fm, mut disk) = setup(1024);

        assert_eq!(disk.extend(&dev, &mut fm, 5 * 512), 5 * 512);
        assert_eq!(disk.dir_cnt, 5);
        assert_eq!(disk.indir_cnt, 0);

        assert_eq!(disk.extend(&dev, &mut fm, 12 * 512), 12 * 512);
        assert_eq!(disk.dir_cnt, 12);
        assert_eq!(disk.indir_cnt, 0);

        assert_eq!(disk.extend(&dev, &mut fm, 15 * 512), 15 * 512);
        assert_eq!(disk.indir_cnt, 1);
        assert_eq!(disk.indir_curr_usage, 3);
        assert_eq!(disk.dindir_cnt, 0);
    }

    #[test]
    fn extend_reaches_double_indirect() {
        let (dev, mut fm, mut disk) = setup(512);
        let len = (12 + 128) as u32 * 512;
        assert_eq!(disk.extend(&dev, &mut fm, len), len);
        assert_eq!(disk.indir_curr_usage, 128);
        assert_eq!(disk.dindir_cnt, 0);

        let len = (12 + 128 + 1) as u32 * 512;
        assert_eq!(disk.extend(&dev, &mut fm, len), len);
        assert_eq!(disk.dindir_cnt, 1);
        assert_eq!(disk.dindir_curr_usage, 1);
        assert_eq!(disk.dindir_lv2_curr_usage, 1);

        let len = (12 + 128 + 129) as u32 * 512;
        assert_eq!(disk.extend(&dev, &mut fm, len), len);
        assert_eq!(disk.dindir_curr_usage, 2);
        assert_eq!(disk.dindir_lv2_curr_usage, 1);
    }

    #[test]
    fn byte_to_sector_covers_every_range() {
        let (dev, mut fm, mut disk) = setup(512);
        let len = (12 + 128 + 129) as u32 * 512;
        disk.extend(&dev, &mut fm, len);

        assert_eq!(disk.byte_to_sector(&dev, 0), Some(disk.direct[0]));
        assert_eq!(disk.byte_to_sector(&dev, 11 * 512), Some(disk.direct[11]));
        assert!(disk.byte_to_sector(&dev, 12 * 512).is_some());
        assert!(disk.byte_to_sector(&dev, (12 + 127) as u32 * 512).is_some());
        assert!(disk.byte_to_sector(&dev, (12 + 128) as u32 * 512).is_some());
        assert!(disk.byte_to_sector(&dev, (12 + 128 + 128) as u32 * 512).is_some());

        // All mapped sectors are distinct.
        let mut seen = alloc::vec::Vec::new();
        for n in 0..(12 + 128 + 129) as u32 {
            let s = disk.byte_to_sector(&dev, n * 512).unwrap();
            assert!(!seen.contains(&s));
            seen.push(s);
        }

        assert_eq!(disk.byte_to_sector(&dev, len), None);
        assert_eq!(disk.byte_to_sector(&dev, u32::MAX), None);
    }

    #[test]
    fn new_sectors_are_zero_filled() {
        let dev = MemDisk::new(64);
        for s in 0..64 {
            dev.write(s, &[0xff; BSIZE]);
        }
        let mut fm = FreeMap::new(64);
        let sector = fm.allocate(&dev, 1).unwrap();
        let mut disk = DiskInode::new(sector, false);
        disk.extend(&dev, &mut fm, 3 * 512);

        let mut buf = [0xaau8; BSIZE];
        for n in 0..3 {
            dev.read(disk.byte_to_sector(&dev, n * 512).unwrap(), &mut buf);
            assert!(buf.iter().all(|b| *b == 0));
        }
    }

    #[test]
    fn partial_extend_commits_prefix_and_resumes() {
        let (dev, mut fm, mut disk) = setup(32);
        // Park 16 sectors so only 13 stay usable: 12 direct fit, the
        // indirect block eats the 13th, leaving nothing for its data
        // pointers.
        let filler = fm.allocate(&dev, 16).unwrap();
        let committed = disk.extend(&dev, &mut fm, 20 * 512);
        assert_eq!(committed, 12 * 512);
        assert_eq!(disk.length, 12 * 512);
        assert_eq!(disk.dir_cnt, 12);
        assert_eq!(disk.indir_cnt, 1);
        assert_eq!(disk.indir_curr_usage, 0);
        assert_eq!(fm.free_count(), 0);

        // The record on disk matches the committed state.
        let reloaded = DiskInode::load(&dev, disk.sector);
        assert_eq!(reloaded.length, 12 * 512);
        assert_eq!(reloaded.indir_cnt, 1);

        // With space back, the same request resumes at the cursor.
        fm.release(&dev, filler, 16);
        assert_eq!(disk.extend(&dev, &mut fm, 20 * 512), 20 * 512);
        assert_eq!(disk.dir_cnt, 12);
        assert_eq!(disk.indir_cnt, 1);
        assert_eq!(disk.indir_curr_usage, 8);
        assert!(disk.byte_to_sector(&dev, 19 * 512).is_some());

        // Freeing walks the tree and returns every sector.
        disk.free(&dev, &mut fm);
        fm.release(&dev, disk.sector, 1);
        assert_eq!(fm.free_count(), 30);
    }

    #[test]
    fn free_returns_every_sector() {
        let (dev, mut fm, mut disk) = setup(512);
        let before = fm.free_count();
        let len = (12 + 128 + 129) as u32 * 512;
        disk.extend(&dev, &mut fm, len);
        // 269 data + 1 indirect + 1 level-1 + 2 level-2.
        assert_eq!(fm.free_count(), before - 273);

        disk.free(&dev, &mut fm);
        assert_eq!(fm.free_count(), before);
        assert_eq!(disk.dir_cnt, 0);
        assert_eq!(disk.indir_cnt, 0);
        assert_eq!(disk.dindir_cnt, 0);
        assert_eq!(disk.length, 0);
    }

    #[test]
    fn read_write_bounce_paths() {
        let (dev, mut fm, mut disk) = setup(64);
        disk.extend(&dev, &mut fm, 3 * 512);

        // Unaligned write straddling two sectors.
        let data: alloc::vec::Vec<u8> = (0..600u32).map(|b| b as u8).collect();
        assert_eq!(write_at(&disk, &dev, &data, 300), 600);
        let mut back = alloc::vec![0u8; 600];
        assert_eq!(read_at(&disk, &dev, &mut back, 300), 600);
        assert_eq!(back, data);

        // Reads stop at end of file.
        let mut tail = [0u8; 100];
        assert_eq!(read_at(&disk, &dev, &mut tail, 3 * 512 - 50), 50);
        assert_eq!(read_at(&disk, &dev, &mut tail, 3 * 512), 0);
        assert_eq!(read_at(&disk, &dev, &mut tail, 4 * 512), 0);
    }
}
