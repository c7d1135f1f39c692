/*!
 * VFS Types
 * Shared types for filesystem operations with modern serde patterns
 */

mod errors;
mod file_type;
mod name;
mod open_flags;
mod stat;

pub use errors::{UvfsError, UvfsResult};
pub use file_type::FileType;
pub use name::{Filename, Pathname};
pub use open_flags::OpenFlags;
pub use stat::{Stat, StatVfs, S_IFDIR, S_IFLNK, S_IFMT, S_IFREG, S_IRUSR, S_IRWXU, S_IWUSR, S_IXUSR};
