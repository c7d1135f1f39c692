/*!
 * Virtual File System Module
 * Node model, tree, content handles and staleness bookkeeping
 */

pub mod content;
pub mod expiry;
pub mod node;
pub mod paths;
pub mod tree;
pub mod types;

// Re-exports
pub use content::Content;
pub use expiry::{ExpiryKey, ExpiryQueue};
pub use node::{
    Deferred, Directory, Expiry, FileNode, FileState, Hook, Node, NodeKind, Owner, Shadow,
    WritePhase, WritePhaseKind,
};
pub use paths::{UploadSource, UploadTarget};
pub use tree::{Tree, Walk, WalkPolicy};
pub use types::{FileType, Filename, OpenFlags, Pathname, Stat, StatVfs, UvfsError, UvfsResult};
