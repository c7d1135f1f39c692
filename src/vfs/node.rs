/*!
 * Filesystem Node Types
 * Directories, files, symlinks and their deferred placeholders
 *
 * Lock order: the tree lock is always taken before a file's state lock,
 * never while one is held.
 */

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use ahash::RandomState;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use super::content::Content;
use super::paths::UploadTarget;
use super::types::{FileType, Filename, Pathname, Stat, UvfsError, UvfsResult, S_IWUSR};

/// Population hook: builds the concrete node for the path it is handed
pub type Hook = Arc<dyn Fn(&Pathname) -> UvfsResult<Node> + Send + Sync>;

/// Directory entries keyed by case-folded filename
pub type Entries = HashMap<Filename, Node, RandomState>;

/// Owner stamped on every node of a mount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub uid: u32,
    pub gid: u32,
}

/// When a cached node stops being trustworthy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    Never,
    At(SystemTime),
}

impl Expiry {
    #[inline]
    #[must_use]
    pub fn after(interval: Duration) -> Self {
        Expiry::At(SystemTime::now() + interval)
    }

    #[inline]
    #[must_use]
    pub fn is_stale_at(&self, now: SystemTime) -> bool {
        match self {
            Expiry::Never => false,
            Expiry::At(at) => now >= *at,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.is_stale_at(SystemTime::now())
    }

    #[inline]
    #[must_use]
    pub const fn deadline(&self) -> Option<SystemTime> {
        match self {
            Expiry::Never => None,
            Expiry::At(at) => Some(*at),
        }
    }
}

/// Attributes shared by every node variant
#[derive(Debug, Clone)]
pub struct Attrs {
    pub stat: Stat,
    pub expires: Expiry,
    pub doc_id: Option<String>,
    /// Identifying back-link; the parent owns the node, never the reverse
    pub parent: Option<Pathname>,
    pub xattrs: BTreeMap<String, Vec<u8>>,
}

/// A placeholder's hook plus the guard that keeps it to a single run
#[derive(Clone)]
pub struct Deferred {
    hook: Hook,
    slot: Arc<Mutex<bool>>,
}

impl Deferred {
    #[must_use]
    pub fn new(hook: Hook) -> Self {
        Self {
            hook,
            slot: Arc::new(Mutex::new(false)),
        }
    }

    #[inline]
    #[must_use]
    pub fn hook(&self) -> &Hook {
        &self.hook
    }

    /// Held for the duration of an expansion; `true` once it has run
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, bool> {
        self.slot.lock()
    }

    /// Whether both handles refer to the same placeholder instance
    #[inline]
    #[must_use]
    pub fn same(&self, other: &Deferred) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("expanded", &*self.slot.lock())
            .finish()
    }
}

/// Concrete directory
#[derive(Default)]
pub struct Directory {
    pub entries: Entries,
    /// Hook that produced this listing, kept so a stale listing can be
    /// deferred again and re-fetched
    pub refresh: Option<Hook>,
}

impl fmt::Debug for Directory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.entries.keys().map(Filename::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Directory")
            .field("entries", &names)
            .field("refreshable", &self.refresh.is_some())
            .finish()
    }
}

#[derive(Debug)]
pub enum NodeKind {
    Directory(Directory),
    File(Arc<FileNode>),
    Symlink(String),
    DeferredDirectory(Deferred),
    DeferredFile(Deferred),
}

/// A node of the virtual tree
#[derive(Debug)]
pub struct Node {
    /// Debugging hint; the parent's key is the real name
    pub name: String,
    pub attrs: Attrs,
    pub kind: NodeKind,
}

impl Node {
    fn with_kind(name: impl Into<String>, owner: Owner, file_type: FileType, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            attrs: Attrs {
                stat: Stat::new(file_type, owner.uid, owner.gid),
                expires: Expiry::Never,
                doc_id: None,
                parent: None,
                xattrs: BTreeMap::new(),
            },
            kind,
        }
    }

    #[must_use]
    pub fn directory(name: impl Into<String>, owner: Owner) -> Self {
        Self::with_kind(name, owner, FileType::Directory, NodeKind::Directory(Directory::default()))
    }

    #[must_use]
    pub fn file(name: impl Into<String>, owner: Owner, content: Content) -> Self {
        Self::from_file_node(name, owner, FileNode::new(content))
    }

    #[must_use]
    pub fn from_file_node(name: impl Into<String>, owner: Owner, file: FileNode) -> Self {
        Self::with_kind(name, owner, FileType::File, NodeKind::File(Arc::new(file)))
    }

    /// Empty file already inside its first write session
    #[must_use]
    pub fn created_file(name: impl Into<String>, owner: Owner) -> Self {
        Self::from_file_node(name, owner, FileNode::created())
    }

    #[must_use]
    pub fn symlink(name: impl Into<String>, owner: Owner, target: impl Into<String>) -> Self {
        let target = target.into();
        let mut node = Self::with_kind(name, owner, FileType::Symlink, NodeKind::Symlink(String::new()));
        node.attrs.stat.size = target.len() as u64;
        node.kind = NodeKind::Symlink(target);
        node
    }

    #[must_use]
    pub fn deferred_directory(name: impl Into<String>, owner: Owner, hook: Hook) -> Self {
        Self::with_kind(
            name,
            owner,
            FileType::Directory,
            NodeKind::DeferredDirectory(Deferred::new(hook)),
        )
    }

    #[must_use]
    pub fn deferred_file(name: impl Into<String>, owner: Owner, hook: Hook) -> Self {
        Self::with_kind(name, owner, FileType::File, NodeKind::DeferredFile(Deferred::new(hook)))
    }

    #[must_use]
    pub fn writable(mut self) -> Self {
        self.attrs.stat.mode |= S_IWUSR;
        self
    }

    #[must_use]
    pub fn expires(mut self, expiry: Expiry) -> Self {
        self.attrs.expires = expiry;
        self
    }

    #[must_use]
    pub fn with_doc_id(mut self, doc_id: impl Into<String>) -> Self {
        self.attrs.doc_id = Some(doc_id.into());
        self
    }

    /// Set ctime and mtime, keeping a file's own mtime in step
    #[must_use]
    pub fn with_times(mut self, time: SystemTime) -> Self {
        self.attrs.stat.set_times(time);
        if let NodeKind::File(file) = &self.kind {
            file.lock().mtime = time;
        }
        self
    }

    #[must_use]
    pub fn refreshed_by(mut self, hook: Hook) -> Self {
        if let NodeKind::Directory(dir) = &mut self.kind {
            dir.refresh = Some(hook);
        }
        self
    }

    #[inline]
    #[must_use]
    pub fn owner(&self) -> Owner {
        Owner {
            uid: self.attrs.stat.uid,
            gid: self.attrs.stat.gid,
        }
    }

    /// Fresh placeholder for a stale listing, carrying over its identity
    #[must_use]
    pub fn deferred_again(&self) -> Option<Node> {
        let hook = self.as_dir()?.refresh.clone()?;
        let mut node = Node::deferred_directory(self.name.clone(), self.owner(), hook);
        node.attrs.stat.set_writable(self.attrs.stat.is_writable());
        node.attrs.doc_id = self.attrs.doc_id.clone();
        node.attrs.parent = self.attrs.parent.clone();
        Some(node)
    }

    #[inline]
    #[must_use]
    pub fn file_type(&self) -> FileType {
        match &self.kind {
            NodeKind::Directory(_) | NodeKind::DeferredDirectory(_) => FileType::Directory,
            NodeKind::File(_) | NodeKind::DeferredFile(_) => FileType::File,
            NodeKind::Symlink(_) => FileType::Symlink,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_deferred(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::DeferredDirectory(_) | NodeKind::DeferredFile(_)
        )
    }

    #[inline]
    #[must_use]
    pub fn as_dir(&self) -> Option<&Directory> {
        match &self.kind {
            NodeKind::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    #[inline]
    pub fn as_dir_mut(&mut self) -> Option<&mut Directory> {
        match &mut self.kind {
            NodeKind::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_file(&self) -> Option<&Arc<FileNode>> {
        match &self.kind {
            NodeKind::File(file) => Some(file),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn symlink_target(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Symlink(target) => Some(target),
            _ => None,
        }
    }

    /// Stat block with live size and mtime for files
    #[must_use]
    pub fn stat(&self) -> Stat {
        let mut stat = self.attrs.stat;
        if let NodeKind::File(file) = &self.kind {
            (stat.size, stat.mtime) = file.lock().apparent();
        }
        stat
    }

    /// Whether any file in this subtree is mid-write or mid-upload
    #[must_use]
    pub fn is_busy(&self) -> bool {
        match &self.kind {
            NodeKind::File(file) => file.lock().phase.kind() != WritePhaseKind::Idle,
            NodeKind::Directory(dir) => dir.entries.values().any(Node::is_busy),
            _ => false,
        }
    }

    /// Rewrite the parent back-links of this node's subtree after a move
    pub fn reparent(&mut self, parent: Option<Pathname>, own_path: &Pathname) {
        self.attrs.parent = parent;
        if let NodeKind::Directory(dir) = &mut self.kind {
            for (name, child) in dir.entries.iter_mut() {
                let child_path = own_path.join(name);
                child.reparent(Some(own_path.clone()), &child_path);
            }
        }
    }
}

/// Staged copy of a file opened for writing
#[derive(Debug)]
pub struct Shadow {
    pub content: Content,
    pub mtime: SystemTime,
}

/// Per-file write-back state machine
///
/// `Idle -> Shadowed -> Committing -> Idle`; a file may be shadowed again
/// while its uploader is still committing an earlier release.
#[derive(Debug, Default)]
pub enum WritePhase {
    #[default]
    Idle,
    Shadowed {
        shadow: Shadow,
        uploader: Option<flume::Sender<UploadTarget>>,
    },
    Committing {
        uploader: flume::Sender<UploadTarget>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePhaseKind {
    Idle,
    Shadowed,
    Committing,
}

impl WritePhase {
    #[must_use]
    pub const fn kind(&self) -> WritePhaseKind {
        match self {
            WritePhase::Idle => WritePhaseKind::Idle,
            WritePhase::Shadowed { .. } => WritePhaseKind::Shadowed,
            WritePhase::Committing { .. } => WritePhaseKind::Committing,
        }
    }

    /// Live uploader channel, if one is running
    #[must_use]
    pub fn uploader(&self) -> Option<&flume::Sender<UploadTarget>> {
        match self {
            WritePhase::Idle => None,
            WritePhase::Shadowed { uploader, .. } => uploader.as_ref(),
            WritePhase::Committing { uploader } => Some(uploader),
        }
    }
}

/// Mutable state of a regular file
#[derive(Debug)]
pub struct FileState {
    pub content: Content,
    /// SHA-1 of the last content known to be in the repository
    pub digest: Option<String>,
    pub mtime: SystemTime,
    pub phase: WritePhase,
}

impl FileState {
    /// Open a write session over a copy of the current content
    pub fn begin_shadow(&mut self, truncate: bool) -> UvfsResult<()> {
        let content = if truncate {
            Content::empty()
        } else {
            Content::from_bytes(self.content.snapshot()?)
        };
        let shadow = Shadow {
            content,
            mtime: SystemTime::now(),
        };
        let uploader = match std::mem::take(&mut self.phase) {
            WritePhase::Idle => None,
            WritePhase::Committing { uploader } => Some(uploader),
            busy @ WritePhase::Shadowed { .. } => {
                self.phase = busy;
                return Err(UvfsError::denied("file is already open for writing"));
            }
        };
        self.phase = WritePhase::Shadowed { shadow, uploader };
        Ok(())
    }

    /// Close the write session, returning the staged content
    ///
    /// The phase falls back to `Committing` when an uploader is still
    /// running, otherwise to `Idle`.
    pub fn take_shadow(&mut self) -> Option<Shadow> {
        match std::mem::take(&mut self.phase) {
            WritePhase::Shadowed { shadow, uploader } => {
                self.phase = match uploader {
                    Some(uploader) => WritePhase::Committing { uploader },
                    None => WritePhase::Idle,
                };
                Some(shadow)
            }
            other => {
                self.phase = other;
                None
            }
        }
    }

    /// Replace the content with a released shadow's content
    pub fn merge(&mut self, shadow: Shadow) -> UvfsResult<()> {
        let old = std::mem::replace(&mut self.content, shadow.content);
        self.mtime = shadow.mtime;
        old.close()?;
        Ok(())
    }

    /// Drop the uploader channel once its queue has drained
    pub fn finish_upload(&mut self) {
        self.phase = match std::mem::take(&mut self.phase) {
            WritePhase::Committing { .. } => WritePhase::Idle,
            WritePhase::Shadowed { shadow, .. } => WritePhase::Shadowed {
                shadow,
                uploader: None,
            },
            WritePhase::Idle => WritePhase::Idle,
        };
    }

    /// Shadow content if a write session is open
    pub fn shadow_mut(&mut self) -> Option<&mut Shadow> {
        match &mut self.phase {
            WritePhase::Shadowed { shadow, .. } => Some(shadow),
            _ => None,
        }
    }

    /// Content as seen through a descriptor: the writer sees its shadow
    pub fn visible_content(&mut self, writer: bool) -> &mut Content {
        match &mut self.phase {
            WritePhase::Shadowed { shadow, .. } if writer => &mut shadow.content,
            _ => &mut self.content,
        }
    }

    /// Size and mtime for stat, taken from an open shadow if there is one
    #[must_use]
    pub fn apparent(&self) -> (u64, SystemTime) {
        match &self.phase {
            WritePhase::Shadowed { shadow, .. } => {
                (shadow.content.len().unwrap_or(0), shadow.mtime)
            }
            _ => (self.content.len().unwrap_or(0), self.mtime),
        }
    }
}

/// Shared handle to a regular file
#[derive(Debug)]
pub struct FileNode {
    state: Mutex<FileState>,
}

impl FileNode {
    #[must_use]
    pub fn new(content: Content) -> Self {
        Self {
            state: Mutex::new(FileState {
                content,
                digest: None,
                mtime: SystemTime::now(),
                phase: WritePhase::Idle,
            }),
        }
    }

    /// A freshly created file: empty, already inside its first write session
    #[must_use]
    pub fn created() -> Self {
        let node = Self::new(Content::empty());
        node.lock().phase = WritePhase::Shadowed {
            shadow: Shadow {
                content: Content::empty(),
                mtime: SystemTime::now(),
            },
            uploader: None,
        };
        node
    }

    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, FileState> {
        self.state.lock()
    }

    #[must_use]
    pub fn with_digest(self, digest: impl Into<String>) -> Self {
        self.lock().digest = Some(digest.into());
        self
    }
}
