/*!
 * Metadata Operations
 * Attributes, ownership, times and filesystem statistics
 */

use std::time::SystemTime;

use nix::sys::statvfs::statvfs;

use super::Uvfs;
use crate::vfs::paths::doc_id_of;
use crate::vfs::{Stat, StatVfs, UvfsError, UvfsResult};

/// Zero means "now" for `utimens`
fn or_now(time: SystemTime) -> SystemTime {
    if time == SystemTime::UNIX_EPOCH {
        SystemTime::now()
    } else {
        time
    }
}

impl Uvfs {
    /// Stat of `path`, or of the open descriptor's file when `fd` is known
    ///
    /// Regular files are fetched if still deferred, except inside
    /// web-page-complete documents, whose originals are already concrete.
    pub fn getattr(&self, path: &str, fd: Option<u64>) -> UvfsResult<Stat> {
        self.traced("getattr", path, |path| {
            if let Some(open) = fd.and_then(|fd| self.fds.get(fd).ok()) {
                let mut stat = open.stat;
                (stat.size, stat.mtime) = open.file.lock().apparent();
                return Ok(stat);
            }
            let is_wpc = doc_id_of(path.as_str())
                .and_then(|id| self.store.ctx().cached_metadata(id))
                .is_some_and(|md| md.is_wpc);
            if is_wpc {
                self.store.with_node(path, |node| node.stat())
            } else {
                self.store.with_file_node(path, |node| node.stat())
            }
        })
    }

    /// Replace the owner permission bits
    pub fn chmod(&self, path: &str, mode: u32) -> UvfsResult<()> {
        self.traced("chmod", path, |path| {
            self.store
                .update(path, |node| node.attrs.stat.set_owner_bits(mode))
        })
    }

    pub fn chown(&self, path: &str, uid: u32, gid: u32) -> UvfsResult<()> {
        self.traced("chown", path, |path| {
            self.store.update(path, |node| {
                node.attrs.stat.uid = uid;
                node.attrs.stat.gid = gid;
            })
        })
    }

    /// Set access and modification times; the epoch stands for "now"
    pub fn utimens(&self, path: &str, atime: SystemTime, mtime: SystemTime) -> UvfsResult<()> {
        let (atime, mtime) = (or_now(atime), or_now(mtime));
        self.traced("utimens", path, |path| {
            self.store.update(path, |node| {
                node.attrs.stat.atime = atime;
                node.attrs.stat.set_times(mtime);
                if let Some(file) = node.as_file() {
                    file.lock().mtime = mtime;
                }
            })
        })
    }

    /// Host filesystem space, with the file count taken from the nodes
    /// currently tracked for expiry
    pub fn statvfs(&self, path: &str) -> UvfsResult<StatVfs> {
        self.traced("statvfs", path, |_| {
            let host = statvfs(self.store.ctx().state_dir())
                .map_err(|e| UvfsError::Io(format!("statvfs: {}", e)))?;
            Ok(StatVfs {
                block_size: host.block_size() as u64,
                fragment_size: host.fragment_size() as u64,
                blocks: host.blocks() as u64,
                blocks_free: host.blocks_free() as u64,
                blocks_available: host.blocks_available() as u64,
                files: self.store.expiry_len() as u64,
                files_free: host.files_free() as u64,
                files_available: host.files_available() as u64,
                flags: host.flags().bits() as u64,
                name_max: host.name_max() as u64,
            })
        })
    }
}
