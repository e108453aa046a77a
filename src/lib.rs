//! sectorfs: the filesystem core of a teaching kernel.
//!
//! A small hierarchical filesystem over a fixed-size block device with
//! 512-byte sectors. Files grow on demand through direct,
//! single-indirect and double-indirect index trees; directories are
//! files holding fixed-size entry tables; paths are resolved
//! iteratively from the root or a caller-supplied working directory.
//! Everything is written through immediately: there is no cache, no
//! journal, and no internal fine-grained locking. The syscall layer is
//! expected to serialize operations with one filesystem-wide lock and
//! to hold per-process descriptor tables; this crate only deals in
//! handles.
//!
//! Removal is deferred: a removed inode's sectors return to the
//! free-map when its last handle closes. Handles borrow the
//! [`FileSystem`], so the compiler makes sure all of them are gone
//! before an unmount.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod block;
pub mod file;
pub mod fs;
pub mod param;

pub use block::{BlockDevice, MemDisk, Sector};
pub use file::File;
pub use fs::{Dir, FileName, FileSystem, Path, RcInode};

use core::fmt;

/// Why a filesystem operation failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FsError {
    /// Lookup missed.
    NoSuchEntry,
    /// Directory add hit an entry with the same name.
    AlreadyExists,
    /// A path component that must be a directory is not.
    NotADirectory,
    /// The inode has been removed and awaits its last close.
    Removed,
    /// Free-map exhausted, or the maximum file size exceeded.
    NoSpace,
    /// Entry name empty, overlong, or containing `/` or NUL.
    InvalidName,
    /// Refusing to remove a directory that still has entries.
    DirNotEmpty,
    /// Refusing to remove a directory somebody still has open.
    Busy,
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            FsError::NoSuchEntry => "no such file or directory",
            FsError::AlreadyExists => "entry already exists",
            FsError::NotADirectory => "not a directory",
            FsError::Removed => "inode has been removed",
            FsError::NoSpace => "no space left on device",
            FsError::InvalidName => "invalid entry name",
            FsError::DirNotEmpty => "directory not empty",
            FsError::Busy => "directory in use",
        };
        f.write_str(msg)
    }
}

pub type Result<T> = core::result::Result<T, FsError>;
