//! Directories.
//!
//! A directory is an inode whose payload is a dense array of fixed
//! 24-byte entries. Every directory carries `.` and `..` as ordinary
//! entries (the root's `..` names the root itself), so the path walk
//! resolves them with plain lookups.

use core::mem;

use arrayvec::ArrayVec;
use log::debug;
use static_assertions::const_assert_eq;
use zerocopy::{AsBytes, FromBytes};

use crate::block::{BlockDevice, Sector};
use crate::fs::inode::RcInode;
use crate::fs::path::FileName;
use crate::param::DIRSIZ;
use crate::{FsError, Result};

pub(crate) const DIRENT_SIZE: usize = mem::size_of::<Dirent>();

/// On-disk directory entry.
#[repr(C)]
#[derive(Clone, Copy, AsBytes, FromBytes)]
struct Dirent {
    in_use: u32,
    sector: Sector,
    /// NUL-terminated unless exactly `DIRSIZ` bytes long; the slot
    /// after a full-length name keeps the terminator.
    name: [u8; DIRSIZ + 1],
    _pad: [u8; 1],
}

const_assert_eq!(DIRENT_SIZE, 24);

impl Dirent {
    fn empty() -> Self {
        Self {
            in_use: 0,
            sector: 0,
            name: [0; DIRSIZ + 1],
            _pad: [0; 1],
        }
    }

    fn new(name: &FileName, sector: Sector) -> Self {
        let mut entry = Self::empty();
        entry.in_use = 1;
        entry.sector = sector;
        entry.name[..name.as_bytes().len()].copy_from_slice(name.as_bytes());
        entry
    }

    fn name(&self) -> &[u8] {
        let len = self.name.iter().position(|ch| *ch == 0).unwrap_or(DIRSIZ);
        &self.name[..len]
    }
}

/// Handle on an open directory: the inode plus an iteration cursor.
pub struct Dir<'s, D: BlockDevice> {
    ip: RcInode<'s, D>,
    pos: u32,
}

impl<'s, D: BlockDevice> core::fmt::Debug for Dir<'s, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dir")
            .field("inumber", &self.ip.inumber())
            .field("pos", &self.pos)
            .finish()
    }
}

impl<'s, D: BlockDevice> Dir<'s, D> {
    pub(crate) fn open(ip: RcInode<'s, D>) -> Result<Self> {
        if !ip.is_dir() {
            return Err(FsError::NotADirectory);
        }
        Ok(Self { ip, pos: 0 })
    }

    /// A second handle on the same directory with a fresh cursor.
    pub fn reopen(&self) -> Self {
        Self {
            ip: self.ip.clone(),
            pos: 0,
        }
    }

    pub fn inumber(&self) -> u32 {
        self.ip.inumber()
    }

    pub(crate) fn inode(&self) -> &RcInode<'s, D> {
        &self.ip
    }

    fn entry_at(&self, off: u32) -> Option<Dirent> {
        let mut entry = Dirent::empty();
        if self.ip.read_at(entry.as_bytes_mut(), off) != DIRENT_SIZE {
            return None;
        }
        Some(entry)
    }

    fn find(&self, name: &[u8]) -> Option<(u32, Dirent)> {
        let mut off = 0;
        while let Some(entry) = self.entry_at(off) {
            if entry.in_use != 0 && entry.name() == name {
                return Some((off, entry));
            }
            off += DIRENT_SIZE as u32;
        }
        None
    }

    /// Opens the inode the entry `name` points at.
    pub fn lookup(&self, name: &[u8]) -> Result<RcInode<'s, D>> {
        let (_, entry) = self.find(name).ok_or(FsError::NoSuchEntry)?;
        Ok(self.ip.fs().open_inode(entry.sector))
    }

    /// Opens this directory's parent. The root is its own parent.
    pub fn parent(&self) -> Result<Dir<'s, D>> {
        Dir::open(self.lookup(b"..")?)
    }

    /// Writes the entry `name` → `sector` into the first unused slot,
    /// growing the payload when every slot is taken.
    pub(crate) fn add(&self, name: &FileName, sector: Sector) -> Result<()> {
        if self.find(name.as_bytes()).is_some() {
            return Err(FsError::AlreadyExists);
        }
        let mut off = 0;
        loop {
            match self.entry_at(off) {
                Some(entry) if entry.in_use != 0 => off += DIRENT_SIZE as u32,
                _ => break,
            }
        }
        let entry = Dirent::new(name, sector);
        if self.ip.write_at(entry.as_bytes(), off)? != DIRENT_SIZE {
            return Err(FsError::NoSpace);
        }
        Ok(())
    }

    /// Removes the entry `name` and marks its inode for deletion at
    /// last close. A directory must be empty and otherwise unopened.
    pub(crate) fn remove(&self, name: &[u8]) -> Result<()> {
        let (off, entry) = self.find(name).ok_or(FsError::NoSuchEntry)?;
        let ip = self.ip.fs().open_inode(entry.sector);
        if ip.is_dir() {
            if !is_empty(&ip) {
                return Err(FsError::DirNotEmpty);
            }
            // Our lookup above accounts for one opener; anything beyond
            // that is an open handle or a thread's cwd.
            if ip.open_count() > 1 {
                debug!("dir: inode {} busy, removal refused", ip.inumber());
                return Err(FsError::Busy);
            }
        }
        self.ip.write_at(Dirent::empty().as_bytes(), off)?;
        ip.remove();
        Ok(())
    }

    /// Next entry name after the cursor, skipping unused slots and the
    /// `.`/`..` entries.
    pub fn readdir(&mut self) -> Option<ArrayVec<u8, DIRSIZ>> {
        loop {
            let entry = self.entry_at(self.pos)?;
            self.pos += DIRENT_SIZE as u32;
            if entry.in_use == 0 || entry.name() == b"." || entry.name() == b".." {
                continue;
            }
            return Some(entry.name().iter().copied().collect());
        }
    }
}

/// No in-use entry besides `.` and `..`?
fn is_empty<D: BlockDevice>(ip: &RcInode<'_, D>) -> bool {
    let mut off = 0;
    let mut entry = Dirent::empty();
    while ip.read_at(entry.as_bytes_mut(), off) == DIRENT_SIZE {
        if entry.in_use != 0 && entry.name() != b"." && entry.name() != b".." {
            return false;
        }
        off += DIRENT_SIZE as u32;
    }
    true
}
