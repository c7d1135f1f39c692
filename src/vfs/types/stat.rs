/*!
 * UVFS Stat Block
 * POSIX attributes carried by every node
 */

use super::file_type::FileType;
use crate::core::serde::{is_zero_u64, system_time_secs};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

pub const S_IFMT: u32 = 0o170000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFLNK: u32 = 0o120000;

pub const S_IRUSR: u32 = 0o400;
pub const S_IWUSR: u32 = 0o200;
pub const S_IXUSR: u32 = 0o100;
pub const S_IRWXU: u32 = 0o700;

/// POSIX stat block
///
/// Only the owner bits are ever meaningful: the mount is private to the
/// user who made it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Stat {
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    #[serde(skip_serializing_if = "is_zero_u64", default)]
    pub size: u64,
    #[serde(with = "system_time_secs")]
    pub atime: SystemTime,
    #[serde(with = "system_time_secs")]
    pub mtime: SystemTime,
    #[serde(with = "system_time_secs")]
    pub ctime: SystemTime,
}

impl Stat {
    /// Read-only stat of the given type, all times set to now
    #[must_use]
    pub fn new(file_type: FileType, uid: u32, gid: u32) -> Self {
        let now = SystemTime::now();
        let type_bits = match file_type {
            FileType::Directory => S_IFDIR | S_IXUSR,
            FileType::Symlink => S_IFLNK,
            FileType::File => S_IFREG,
        };
        Self {
            mode: S_IRUSR | type_bits,
            nlink: 1,
            uid,
            gid,
            size: 0,
            atime: now,
            mtime: now,
            ctime: now,
        }
    }

    #[inline]
    #[must_use]
    pub const fn file_type(&self) -> FileType {
        match self.mode & S_IFMT {
            S_IFDIR => FileType::Directory,
            S_IFLNK => FileType::Symlink,
            _ => FileType::File,
        }
    }

    /// Owner write bit
    #[inline(always)]
    #[must_use]
    pub const fn is_writable(&self) -> bool {
        self.mode & S_IWUSR != 0
    }

    #[inline]
    pub fn set_writable(&mut self, writable: bool) {
        if writable {
            self.mode |= S_IWUSR;
        } else {
            self.mode &= !S_IWUSR;
        }
    }

    /// Replace the owner permission bits, keeping the type bits
    #[inline]
    pub fn set_owner_bits(&mut self, mode: u32) {
        self.mode = (self.mode & !S_IRWXU) | (mode & S_IRWXU);
    }

    /// Set both creation and modification time
    #[inline]
    pub fn set_times(&mut self, time: SystemTime) {
        self.ctime = time;
        self.mtime = time;
    }

    #[inline]
    pub fn touch(&mut self) {
        self.mtime = SystemTime::now();
    }
}

/// Host filesystem statistics with the mount's own file count
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatVfs {
    pub block_size: u64,
    pub fragment_size: u64,
    pub blocks: u64,
    pub blocks_free: u64,
    pub blocks_available: u64,
    /// Nodes currently tracked for expiry
    pub files: u64,
    pub files_free: u64,
    pub files_available: u64,
    pub flags: u64,
    pub name_max: u64,
}
