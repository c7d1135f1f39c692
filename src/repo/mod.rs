/*!
 * Repository Module
 * Contract with the remote document repository and its HTTP client
 */

pub mod content_type;
pub mod http;
pub mod metadata;
pub mod parse;

use std::time::Duration;

pub use http::HttpRepository;
pub use metadata::DocMetadata;

use crate::vfs::types::UvfsResult;

/// A document (or new version of one) ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDocument {
    pub content: Vec<u8>,
    pub content_type: String,
    pub title: String,
    /// Comma-separated category list
    pub categories: String,
    /// Digest of the content this upload replaces
    pub version_of: Option<String>,
}

/// Remote repository operations the store depends on
///
/// Every call blocks the calling thread until the repository answers or
/// the transport gives up.
#[cfg_attr(test, mockall::automock)]
pub trait Repository: Send + Sync {
    /// Repository root directory and the most recently added document
    fn root_and_most_recent(&self) -> UvfsResult<(String, Option<String>)>;

    /// Metadata for a batch of documents; unknown ids are simply absent
    fn metadata_for_docs(&self, ids: &[String]) -> UvfsResult<Vec<DocMetadata>>;

    fn categories(&self) -> UvfsResult<Vec<String>>;

    /// `(id, content hash)` for every document in a category
    fn docs_for_category(&self, category: &str) -> UvfsResult<Vec<(String, String)>>;

    /// `(id, filename)` search hits, one per filename
    fn matching_ids_and_filenames(&self, query: &str) -> UvfsResult<Vec<(String, String)>>;

    /// Long-poll for a modification time newer than `last`; `None` once the
    /// repository has shut down
    fn patient_mod_time(&self, max_delay: Duration, last: f64) -> UvfsResult<Option<f64>>;

    fn fetch_original(&self, doc_id: &str) -> UvfsResult<Vec<u8>>;

    /// A page image or thumbnail
    fn fetch_doc_file(&self, doc_id: &str, dir: &str, file: &str) -> UvfsResult<Vec<u8>>;

    /// Raw `key: value` metadata file of a document
    fn doc_metadata(&self, doc_id: &str) -> UvfsResult<String>;

    fn categories_for_doc(&self, doc_id: &str) -> UvfsResult<String>;

    /// Upload a document, returning its new id
    fn add_document(&self, doc: &NewDocument) -> UvfsResult<String>;

    fn delete_document(&self, doc_id: &str) -> UvfsResult<()>;
}
