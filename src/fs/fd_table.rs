/*!
 * Open File Table
 * Descriptor allocation with lowest-free reuse
 */

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::vfs::{FileNode, Pathname, Stat, UvfsError, UvfsResult};

/// One open descriptor
#[derive(Debug, Clone)]
pub struct OpenFile {
    pub path: Pathname,
    pub file: Arc<FileNode>,
    /// Opened with write access, so it owns the file's write session
    pub writable: bool,
    /// Attributes as seen at open time
    pub stat: Stat,
}

#[derive(Debug, Default)]
pub struct FdTable {
    files: Mutex<BTreeMap<u64, OpenFile>>,
}

impl FdTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `open` under the smallest unused descriptor
    pub fn insert(&self, open: OpenFile) -> u64 {
        let mut files = self.files.lock();
        let mut fd = 0;
        for &used in files.keys() {
            if used != fd {
                break;
            }
            fd += 1;
        }
        files.insert(fd, open);
        fd
    }

    pub fn get(&self, fd: u64) -> UvfsResult<OpenFile> {
        self.files
            .lock()
            .get(&fd)
            .cloned()
            .ok_or(UvfsError::BadDescriptor(fd))
    }

    pub fn remove(&self, fd: u64) -> UvfsResult<OpenFile> {
        self.files
            .lock()
            .remove(&fd)
            .ok_or(UvfsError::BadDescriptor(fd))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.lock().is_empty()
    }
}
