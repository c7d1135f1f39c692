/*!
 * UVFS Library
 * A remote document repository projected onto a lazily populated filesystem
 */

pub mod config;
pub mod core;
pub mod fs;
pub mod monitoring;
pub mod repo;
pub mod store;
pub mod vfs;

// Re-exports
pub use config::Config;
pub use fs::Uvfs;
pub use monitoring::init_tracing;
pub use repo::{DocMetadata, HttpRepository, NewDocument, Repository};
pub use store::{StatsSnapshot, Store};
pub use vfs::{FileType, Filename, OpenFlags, Pathname, Stat, StatVfs, UvfsError, UvfsResult};
