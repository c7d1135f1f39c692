/*!
 * UVFS File Type Enum
 * Defines the type of filesystem objects visible to callers
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// File type as reported by stat; deferred nodes report the type of the
/// node they will expand into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    File,
    Directory,
    Symlink,
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FileType::File => write!(f, "file"),
            FileType::Directory => write!(f, "directory"),
            FileType::Symlink => write!(f, "symlink"),
        }
    }
}
