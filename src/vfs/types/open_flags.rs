/*!
 * UVFS Open Flags
 * Access flags for file opening operations
 */

use crate::core::serde::is_default;
use serde::{Deserialize, Serialize};

const O_ACCMODE: u32 = 0o3;
const O_WRONLY: u32 = 0o1;
const O_RDWR: u32 = 0o2;
const O_CREAT: u32 = 0o100;
const O_TRUNC: u32 = 0o1000;
const O_APPEND: u32 = 0o2000;

/// File open flags with compact serialization (skips false values)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", default, deny_unknown_fields)]
pub struct OpenFlags {
    #[serde(skip_serializing_if = "is_default")]
    pub write: bool,
    #[serde(skip_serializing_if = "is_default")]
    pub read: bool,
    #[serde(skip_serializing_if = "is_default")]
    pub append: bool,
    #[serde(skip_serializing_if = "is_default")]
    pub truncate: bool,
    #[serde(skip_serializing_if = "is_default")]
    pub create: bool,
}

impl OpenFlags {
    /// Create read-only flags
    #[inline]
    #[must_use]
    pub fn read_only() -> Self {
        Self {
            read: true,
            ..Default::default()
        }
    }

    /// Create write-only flags
    #[inline]
    #[must_use]
    pub fn write_only() -> Self {
        Self {
            write: true,
            ..Default::default()
        }
    }

    /// Create read-write flags
    #[inline]
    #[must_use]
    pub fn read_write() -> Self {
        Self {
            read: true,
            write: true,
            ..Default::default()
        }
    }

    /// Whether opening starts a write session
    #[inline]
    #[must_use]
    pub const fn is_writable(&self) -> bool {
        self.write || self.append || self.truncate
    }

    /// Convert from the host's `open(2)` flags
    pub fn from_posix(flags: u32) -> Self {
        let access = flags & O_ACCMODE;
        Self {
            read: access != O_WRONLY,
            write: access == O_WRONLY || access == O_RDWR,
            append: flags & O_APPEND != 0,
            truncate: flags & O_TRUNC != 0,
            create: flags & O_CREAT != 0,
        }
    }
}
