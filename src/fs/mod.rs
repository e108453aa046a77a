//! Filesystem implementation. Four layers:
//!   + Free-map: persistent allocator for raw disk sectors.
//!   + Inodes: index trees mapping file bytes to sectors, with a
//!     shared open-inode table and deferred removal.
//!   + Directories: inodes whose payload is a table of named entries.
//!   + Paths: `/`-separated names walked from the root or the cwd.
//!
//! This module holds the top level: format/mount/unmount, the path
//! resolver, and the path-based operations the syscall layer calls
//! while holding its filesystem lock. The layout on disk is fixed:
//! sector 0 holds the free-map's inode, sector 1 the root directory's,
//! and everything else belongs to the free-map.

mod dir;
mod freemap;
mod inode;
mod path;

pub use dir::Dir;
pub use inode::RcInode;
pub use path::{FileName, Path};

use alloc::sync::Arc;

use log::debug;
use scopeguard::ScopeGuard;
use spin::Mutex;

use crate::block::{BlockDevice, Sector};
use crate::file::File;
use crate::fs::dir::DIRENT_SIZE;
use crate::fs::freemap::FreeMap;
use crate::fs::inode::{DiskInode, ITable, Inode, InodeInner, INODE_MAGIC};
use crate::param::{DIR_ENTRIES, FREE_MAP_SECTOR, ROOT_SECTOR};
use crate::{FsError, Result};

/// A mounted filesystem over one block device.
///
/// Methods that resolve a path take the calling thread's current
/// working directory; `None` (or an absolute path) walks from the
/// root. All handles borrow the filesystem, so every one of them is
/// closed before it can be unmounted or dropped.
pub struct FileSystem<D: BlockDevice> {
    pub(crate) dev: D,
    pub(crate) freemap: Mutex<FreeMap>,
    pub(crate) itable: Mutex<ITable>,
}

impl<D: BlockDevice> FileSystem<D> {
    /// Writes a fresh filesystem onto `dev` and mounts it: the
    /// free-map over its backing file at sector 0, then an empty root
    /// directory at sector 1.
    pub fn format(dev: D) -> Result<Self> {
        debug!("fs: formatting {} sectors", dev.nsectors());
        let fs = Self {
            freemap: Mutex::new(FreeMap::new(dev.nsectors())),
            itable: Mutex::new(ITable::new()),
            dev,
        };
        {
            let mut fm = fs.freemap.lock();
            let mut disk = DiskInode::new(FREE_MAP_SECTOR, false);
            let len = fm.size_bytes();
            if disk.extend(&fs.dev, &mut fm, len) != len {
                return Err(FsError::NoSpace);
            }
            fm.attach(disk);
            fm.flush(&fs.dev);
        }
        fs.dir_create(ROOT_SECTOR, DIR_ENTRIES as u32, ROOT_SECTOR)?;
        Ok(fs)
    }

    /// Mounts the filesystem already on `dev`.
    /// Panics if the device does not carry a formatted one.
    pub fn mount(dev: D) -> Self {
        let fm = FreeMap::open(&dev);
        let fs = Self {
            freemap: Mutex::new(fm),
            itable: Mutex::new(ITable::new()),
            dev,
        };
        let root = DiskInode::load(&fs.dev, ROOT_SECTOR);
        assert_eq!(root.magic, INODE_MAGIC, "root inode: bad magic");
        assert_ne!(root.is_dir, 0, "root inode: not a directory");
        debug!("fs: mounted, {} sectors free", fs.free_sector_count());
        fs
    }

    /// Flushes the free-map and hands the device back.
    pub fn unmount(self) -> D {
        self.freemap.lock().flush(&self.dev);
        debug!("fs: unmounted");
        self.dev
    }

    /// Opens the root directory.
    pub fn root(&self) -> Result<Dir<'_, D>> {
        Dir::open(self.open_inode(ROOT_SECTOR))
    }

    /// Sectors currently free on the device.
    pub fn free_sector_count(&self) -> u32 {
        self.freemap.lock().free_count()
    }

    /// Creates a file of `size` bytes at `path`.
    pub fn create<'s>(&'s self, path: &Path, size: u32, cwd: Option<&Dir<'s, D>>) -> Result<()> {
        let dir = self.walk(path, false, cwd)?;
        let name = FileName::new(path.file_name())?;

        let sector = self.freemap.lock().allocate(&self.dev, 1)?;
        let sector = scopeguard::guard(sector, |sector| {
            self.freemap.lock().release(&self.dev, sector, 1);
        });
        self.inode_create(*sector, size, false)?;
        if let Err(err) = dir.add(name, *sector) {
            self.discard_inode(ScopeGuard::into_inner(sector));
            return Err(err);
        }
        ScopeGuard::into_inner(sector);
        Ok(())
    }

    /// Creates a directory at `path`, populated with `.` and `..`.
    pub fn mkdir<'s>(&'s self, path: &Path, cwd: Option<&Dir<'s, D>>) -> Result<()> {
        let dir = self.walk(path, false, cwd)?;
        let name = FileName::new(path.file_name())?;

        let sector = self.freemap.lock().allocate(&self.dev, 1)?;
        let sector = scopeguard::guard(sector, |sector| {
            self.freemap.lock().release(&self.dev, sector, 1);
        });
        self.dir_create(*sector, DIR_ENTRIES as u32, dir.inumber())?;
        if let Err(err) = dir.add(name, *sector) {
            self.discard_inode(ScopeGuard::into_inner(sector));
            return Err(err);
        }
        ScopeGuard::into_inner(sector);
        Ok(())
    }

    /// Opens the file (or, for a path with an empty final component,
    /// the directory itself) at `path`.
    pub fn open<'s>(&'s self, path: &Path, cwd: Option<&Dir<'s, D>>) -> Result<File<'s, D>> {
        let dir = self.walk(path, false, cwd)?;
        let name = path.file_name();
        let ip = if name.is_empty() {
            dir.inode().clone()
        } else {
            dir.lookup(name)?
        };
        if ip.is_removed() {
            return Err(FsError::Removed);
        }
        Ok(File::new(ip))
    }

    /// Removes the entry at `path`. The inode's sectors are released
    /// once the last open handle closes.
    pub fn remove<'s>(&'s self, path: &Path, cwd: Option<&Dir<'s, D>>) -> Result<()> {
        let dir = self.walk(path, false, cwd)?;
        let name = path.file_name();
        if name.is_empty() {
            return Err(FsError::InvalidName);
        }
        dir.remove(name)
    }

    /// Resolves `path` to a directory handle for use as a thread's
    /// cwd. The caller installs it; dropping the old one closes it.
    pub fn chdir<'s>(&'s self, path: &Path, cwd: Option<&Dir<'s, D>>) -> Result<Dir<'s, D>> {
        self.open_dir(path, cwd)
    }

    /// Opens the directory at `path` with a fresh readdir cursor.
    pub fn open_dir<'s>(&'s self, path: &Path, cwd: Option<&Dir<'s, D>>) -> Result<Dir<'s, D>> {
        self.walk(path, true, cwd)
    }

    /// Iterative path walk. Resolves every component but the last, and
    /// the last one too when `include_last` is set; returns the
    /// directory it lands in. Swapping `cur` closes the previous
    /// handle, and any failure closes the current one on the way out.
    fn walk<'s>(
        &'s self,
        path: &Path,
        include_last: bool,
        cwd: Option<&Dir<'s, D>>,
    ) -> Result<Dir<'s, D>> {
        if path.is_empty_string() {
            return Err(FsError::InvalidName);
        }
        let mut cur = match cwd {
            Some(dir) if !path.is_absolute() => dir.reopen(),
            _ => self.root()?,
        };
        let mut rest = path;
        while let Some((name, next)) = rest.split_first() {
            rest = next;
            if rest.is_empty_string() && !include_last {
                break;
            }
            match name {
                b"." => {}
                b".." => cur = cur.parent()?,
                _ => cur = Dir::open(cur.lookup(name)?)?,
            }
        }
        if cur.inode().is_removed() {
            return Err(FsError::Removed);
        }
        Ok(cur)
    }

    /// Allocates the index tree for a new inode of `length` bytes and
    /// writes its record to `sector`. A partial allocation is rolled
    /// back; the caller owns `sector` itself either way.
    fn inode_create(&self, sector: Sector, length: u32, is_dir: bool) -> Result<()> {
        let mut fm = self.freemap.lock();
        let mut disk = DiskInode::new(sector, is_dir);
        if disk.extend(&self.dev, &mut fm, length) != length {
            disk.free(&self.dev, &mut fm);
            return Err(FsError::NoSpace);
        }
        Ok(())
    }

    fn dir_create(&self, sector: Sector, entries: u32, parent: Sector) -> Result<()> {
        self.inode_create(sector, entries * DIRENT_SIZE as u32, true)?;
        let dir = Dir::open(self.open_inode(sector))?;
        dir.add(FileName::new(b".")?, sector)?;
        dir.add(FileName::new(b"..")?, parent)?;
        Ok(())
    }

    /// Releases an inode's index tree and its record sector. Only for
    /// records never published in a directory.
    fn discard_inode(&self, sector: Sector) {
        let mut fm = self.freemap.lock();
        let mut disk = DiskInode::load(&self.dev, sector);
        disk.free(&self.dev, &mut fm);
        fm.release(&self.dev, sector, 1);
    }

    /// Opens the inode at `sector`, sharing the in-memory state with
    /// every other opener of the same sector.
    pub(crate) fn open_inode(&self, sector: Sector) -> RcInode<'_, D> {
        let mut itable = self.itable.lock();
        if let Some(ip) = itable.get(&sector) {
            ip.inner.lock().open_cnt += 1;
            return RcInode {
                fs: self,
                ip: Arc::clone(ip),
            };
        }
        let disk = DiskInode::load(&self.dev, sector);
        let ip = Arc::new(Inode {
            sector,
            inner: Mutex::new(InodeInner {
                open_cnt: 1,
                deny_write_cnt: 0,
                removed: false,
                disk,
            }),
        });
        itable.insert(sector, Arc::clone(&ip));
        RcInode { fs: self, ip }
    }

    /// One opener fewer; the last close evicts the table entry and, if
    /// the inode was removed, releases its record and index tree.
    pub(crate) fn close_inode(&self, ip: &Arc<Inode>) {
        let mut itable = self.itable.lock();
        let mut inner = ip.inner.lock();
        inner.open_cnt -= 1;
        if inner.open_cnt > 0 {
            return;
        }
        itable.remove(&ip.sector);
        if inner.removed {
            debug!("fs: inode {} closed after removal, releasing", ip.sector);
            let mut fm = self.freemap.lock();
            fm.release(&self.dev, ip.sector, 1);
            inner.disk.free(&self.dev, &mut fm);
        }
    }
}
