/*!
 * Extended Attributes
 * Per-node attribute map plus attributes synthesized from document metadata
 */

use super::Uvfs;
use crate::vfs::paths::{doc_id_of, top_level, SEARCH};
use crate::vfs::{FileType, Pathname, UvfsError, UvfsResult};

pub const DOC_ID_ATTR: &str = "com.parc.ubidocs.DocID";
pub const FINDER_INFO_ATTR: &str = "com.apple.FinderInfo";
pub const RESOURCE_FORK_ATTR: &str = "com.apple.ResourceFork";
pub const TEXT_ENCODING_ATTR: &str = "com.apple.TextEncoding";

const FINDER_INFO_LEN: usize = 32;

// Finder flags
const HAS_CUSTOM_ICON: u16 = 0x0400;
const NAME_LOCKED: u16 = 0x1000;

/// Resolved node facts the attribute operations work from
struct Target {
    path: Pathname,
    file_type: FileType,
    doc_id: Option<String>,
    stored: std::collections::BTreeMap<String, Vec<u8>>,
}

/// Finder's 32-byte info block: type, creator, flags, then zeros
fn finder_info(os_type: [u8; 4], flags: u16) -> Vec<u8> {
    let mut info = Vec::with_capacity(FINDER_INFO_LEN);
    info.extend_from_slice(&os_type);
    info.extend_from_slice(&0u32.to_be_bytes());
    info.extend_from_slice(&flags.to_be_bytes());
    info.resize(FINDER_INFO_LEN, 0);
    info
}

impl Uvfs {
    fn xattr_target(&self, path: &Pathname) -> UvfsResult<Target> {
        let path = self.store.chase_symlinks(path)?;
        let (file_type, doc_id, stored) = self.store.with_file_node(&path, |node| {
            (node.file_type(), node.attrs.doc_id.clone(), node.attrs.xattrs.clone())
        })?;
        let doc_id = doc_id.or_else(|| doc_id_of(path.as_str()).map(str::to_string));
        Ok(Target {
            path,
            file_type,
            doc_id,
            stored,
        })
    }

    /// Stored attribute names plus the synthesized ones
    pub fn listxattr(&self, path: &str) -> UvfsResult<Vec<String>> {
        self.traced("listxattr", path, |path| {
            let target = self.xattr_target(path)?;
            let mut names: Vec<String> = target.stored.keys().cloned().collect();
            let mut synthesized = vec![FINDER_INFO_ATTR, RESOURCE_FORK_ATTR];
            if target.path.as_str().ends_with(".txt") {
                synthesized.push(TEXT_ENCODING_ATTR);
            }
            if target.doc_id.is_some() {
                synthesized.push(DOC_ID_ATTR);
            }
            for name in synthesized {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
            Ok(names)
        })
    }

    /// Value of `name`; unknown attributes read as empty
    pub fn getxattr(&self, path: &str, name: &str) -> UvfsResult<Vec<u8>> {
        self.traced("getxattr", path, |path| {
            let target = self.xattr_target(path)?;
            Ok(self.attribute(&target, name))
        })
    }

    fn attribute(&self, target: &Target, name: &str) -> Vec<u8> {
        if let Some(value) = target.stored.get(name) {
            return value.clone();
        }
        if name == TEXT_ENCODING_ATTR {
            return b"UTF-8;".to_vec();
        }
        let ctx = self.store.ctx();
        match (&target.doc_id, name) {
            (Some(id), DOC_ID_ATTR) => id.as_bytes().to_vec(),
            (Some(id), FINDER_INFO_ATTR) => {
                let flags = if ctx.icon_for(id).is_empty() {
                    0
                } else {
                    HAS_CUSTOM_ICON
                };
                let os_type = ctx
                    .cached_metadata(id)
                    .and_then(|md| md.os_type)
                    .unwrap_or([0; 4]);
                finder_info(os_type, flags)
            }
            (Some(id), RESOURCE_FORK_ATTR) => ctx.icon_for(id),
            (None, FINDER_INFO_ATTR) if target.file_type == FileType::Directory => {
                if target.path.starts_with(&top_level(SEARCH)) {
                    vec![0; FINDER_INFO_LEN]
                } else {
                    finder_info([0; 4], NAME_LOCKED)
                }
            }
            _ => Vec::new(),
        }
    }

    /// Store `value` under `name`, splicing it in at `position` if non-zero
    pub fn setxattr(&self, path: &str, name: &str, value: &[u8], position: usize) -> UvfsResult<()> {
        self.traced("setxattr", path, |path| {
            let target = self.xattr_target(path)?;
            let value = if position > 0 {
                let mut existing = self.attribute(&target, name);
                if existing.is_empty() {
                    return Err(UvfsError::denied(format!(
                        "no {} to write into at offset {}",
                        name, position
                    )));
                }
                if position > existing.len() {
                    return Err(UvfsError::InvalidArgument(format!(
                        "offset {} is past the end of {}",
                        position, name
                    )));
                }
                let end = position.checked_add(value.len()).ok_or_else(|| {
                    UvfsError::InvalidArgument(format!("offset {} overflows {}", position, name))
                })?;
                if existing.len() < end {
                    existing.resize(end, 0);
                }
                existing[position..end].copy_from_slice(value);
                existing
            } else {
                value.to_vec()
            };
            self.store.update(&target.path, |node| {
                node.attrs.xattrs.insert(name.to_string(), value);
            })
        })
    }

    pub fn removexattr(&self, path: &str, name: &str) -> UvfsResult<()> {
        self.traced("removexattr", path, |path| {
            let target = self.xattr_target(path)?;
            self.store.update(&target.path, |node| {
                node.attrs.xattrs.remove(name);
            })
        })
    }
}
