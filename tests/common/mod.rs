/*!
 * Shared Test Fixtures
 * In-memory repository and mount helpers
 */

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::TempDir;

use uvfs::store::docs::sha1_hex;
use uvfs::{Config, DocMetadata, NewDocument, Repository, Uvfs, UvfsError, UvfsResult};

pub const MTIME: f64 = 1_700_000_000.0;

/// A document held by [`FakeRepository`]
#[derive(Debug, Clone)]
pub struct FakeDoc {
    pub id: String,
    pub filename: String,
    pub content: Vec<u8>,
    pub categories: Vec<String>,
    pub is_wpc: bool,
    pub pagecount: u32,
    /// Apparent MIME type reported instead of the default for its kind
    pub mime: Option<String>,
}

impl FakeDoc {
    fn metadata_line(&self) -> String {
        let mime = match &self.mime {
            Some(mime) => mime.as_str(),
            None if self.is_wpc => "text/html",
            None => "text/plain",
        };
        format!(
            "id {}, mtime {}, pagecount {}, sha-hash {}, is_wpc {}, apparent-mime-type {}, filename {}",
            self.id,
            MTIME,
            self.pagecount,
            sha1_hex(&self.content),
            if self.is_wpc { "True" } else { "False" },
            mime,
            self.filename
        )
    }
}

/// Repository double that keeps everything in memory
#[derive(Default)]
pub struct FakeRepository {
    docs: Mutex<BTreeMap<String, FakeDoc>>,
    uploads: Mutex<Vec<NewDocument>>,
    most_recent: Mutex<Option<String>>,
    mod_time: Mutex<f64>,
    /// Uploads wait here until every sender is dropped
    gate: Mutex<Option<flume::Receiver<()>>>,
    /// Told whenever an upload reaches the repository
    started: Mutex<Option<flume::Sender<()>>>,
    fetches: AtomicUsize,
    searches: AtomicUsize,
    next_id: AtomicUsize,
}

/// Document id in the repository's `NNNNN-NN-NNNN-NNN` shape
pub fn doc_id(n: usize) -> String {
    format!("01227-20-{:04}-{:03}", n % 10_000, n % 1_000)
}

impl FakeRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicUsize::new(100),
            ..Self::default()
        })
    }

    /// Add a plain document filed under `categories`
    pub fn add_doc(&self, filename: &str, content: &[u8], categories: &[&str]) -> String {
        self.insert(FakeDoc {
            id: String::new(),
            filename: filename.to_string(),
            content: content.to_vec(),
            categories: categories.iter().map(|c| c.to_string()).collect(),
            is_wpc: false,
            pagecount: 1,
            mime: None,
        })
    }

    /// Add a web-page-complete document whose original is `zip`
    pub fn add_wpc(&self, filename: &str, zip: Vec<u8>) -> String {
        self.insert(FakeDoc {
            id: String::new(),
            filename: filename.to_string(),
            content: zip,
            categories: Vec::new(),
            is_wpc: true,
            pagecount: 2,
            mime: None,
        })
    }

    fn insert(&self, mut doc: FakeDoc) -> String {
        let id = doc_id(self.next_id.fetch_add(1, Ordering::SeqCst));
        doc.id = id.clone();
        self.docs.lock().insert(id.clone(), doc);
        id
    }

    pub fn set_mime(&self, id: &str, mime: &str) {
        if let Some(doc) = self.docs.lock().get_mut(id) {
            doc.mime = Some(mime.to_string());
        }
    }

    pub fn set_most_recent(&self, id: &str) {
        *self.most_recent.lock() = Some(id.to_string());
    }

    pub fn set_mod_time(&self, t: f64) {
        *self.mod_time.lock() = t;
    }

    /// Block uploads until the returned sender is dropped; the receiver
    /// sees one message per upload that has started
    pub fn hold_uploads(&self) -> (flume::Sender<()>, flume::Receiver<()>) {
        let (gate_tx, gate_rx) = flume::unbounded();
        let (started_tx, started_rx) = flume::unbounded();
        *self.gate.lock() = Some(gate_rx);
        *self.started.lock() = Some(started_tx);
        (gate_tx, started_rx)
    }

    pub fn uploads(&self) -> Vec<NewDocument> {
        self.uploads.lock().clone()
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

impl Repository for FakeRepository {
    fn root_and_most_recent(&self) -> UvfsResult<(String, Option<String>)> {
        Ok(("/var/ubidocs".to_string(), self.most_recent.lock().clone()))
    }

    fn metadata_for_docs(&self, ids: &[String]) -> UvfsResult<Vec<DocMetadata>> {
        let docs = self.docs.lock();
        ids.iter()
            .filter_map(|id| docs.get(id))
            .map(|doc| DocMetadata::parse_line(&doc.metadata_line()))
            .collect()
    }

    fn categories(&self) -> UvfsResult<Vec<String>> {
        let mut cats: Vec<String> = self
            .docs
            .lock()
            .values()
            .flat_map(|doc| doc.categories.iter().cloned())
            .collect();
        cats.sort();
        cats.dedup();
        Ok(cats)
    }

    fn docs_for_category(&self, category: &str) -> UvfsResult<Vec<(String, String)>> {
        Ok(self
            .docs
            .lock()
            .values()
            .filter(|doc| doc.categories.iter().any(|c| c == category))
            .map(|doc| (doc.id.clone(), sha1_hex(&doc.content)))
            .collect())
    }

    fn matching_ids_and_filenames(&self, query: &str) -> UvfsResult<Vec<(String, String)>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        let query = query.to_lowercase();
        Ok(self
            .docs
            .lock()
            .values()
            .filter(|doc| {
                doc.filename.to_lowercase().contains(&query)
                    || String::from_utf8_lossy(&doc.content).to_lowercase().contains(&query)
            })
            .map(|doc| (doc.id.clone(), doc.filename.clone()))
            .collect())
    }

    fn patient_mod_time(&self, _max_delay: Duration, _last: f64) -> UvfsResult<Option<f64>> {
        std::thread::sleep(Duration::from_millis(5));
        Ok(Some(*self.mod_time.lock()))
    }

    fn fetch_original(&self, doc_id: &str) -> UvfsResult<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.docs
            .lock()
            .get(doc_id)
            .map(|doc| doc.content.clone())
            .ok_or_else(|| UvfsError::NotFound(doc_id.to_string()))
    }

    fn fetch_doc_file(&self, doc_id: &str, dir: &str, file: &str) -> UvfsResult<Vec<u8>> {
        Ok(format!("PNG {} {} {}", doc_id, dir, file).into_bytes())
    }

    fn doc_metadata(&self, doc_id: &str) -> UvfsResult<String> {
        let docs = self.docs.lock();
        let doc = docs
            .get(doc_id)
            .ok_or_else(|| UvfsError::NotFound(doc_id.to_string()))?;
        Ok(format!("title: {}\ncategories: {}\n", doc.filename, doc.categories.join(",")))
    }

    fn categories_for_doc(&self, doc_id: &str) -> UvfsResult<String> {
        Ok(self
            .docs
            .lock()
            .get(doc_id)
            .map(|doc| doc.categories.join(","))
            .unwrap_or_default())
    }

    fn add_document(&self, doc: &NewDocument) -> UvfsResult<String> {
        if let Some(started) = self.started.lock().clone() {
            let _ = started.send(());
        }
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            while gate.recv().is_ok() {}
        }
        self.uploads.lock().push(doc.clone());
        Ok(self.insert(FakeDoc {
            id: String::new(),
            filename: doc.title.clone(),
            content: doc.content.clone(),
            categories: doc.categories.split(',').map(str::to_string).collect(),
            is_wpc: false,
            pagecount: 1,
            mime: Some(doc.content_type.clone()),
        }))
    }

    fn delete_document(&self, doc_id: &str) -> UvfsResult<()> {
        self.docs
            .lock()
            .remove(doc_id)
            .map(|_| ())
            .ok_or_else(|| UvfsError::NotFound(doc_id.to_string()))
    }
}

/// A mount over a [`FakeRepository`] with its own state directory
pub struct Mounted {
    pub fs: Uvfs,
    pub repo: Arc<FakeRepository>,
    pub state: TempDir,
}

impl Mounted {
    pub fn new(repo: Arc<FakeRepository>) -> Self {
        Self::with_config(repo, |config| config)
    }

    /// Mount with the default test configuration adjusted by `tweak`
    pub fn with_config(repo: Arc<FakeRepository>, tweak: impl FnOnce(Config) -> Config) -> Self {
        let state = tempfile::tempdir().unwrap();
        let config = Config::new("https://127.0.0.1:8090")
            .with_state_dir(state.path())
            .with_poll_pause(Duration::from_millis(10));
        let fs = Uvfs::mount(tweak(config), Arc::clone(&repo) as Arc<dyn Repository>).unwrap();
        Self { fs, repo, state }
    }

    /// Contents of the saved-searches file
    pub fn searches_file(&self) -> String {
        std::fs::read_to_string(self.fs.store().ctx().searches_file()).unwrap_or_default()
    }

    /// Whole content of `path` through a read-only descriptor
    pub fn read_all(&self, path: &str) -> Vec<u8> {
        let fd = self.fs.open(path, uvfs::OpenFlags::read_only()).unwrap();
        let data = self.fs.read(fd, 1 << 20, 0).unwrap();
        self.fs.release(fd).unwrap();
        data
    }

    /// Open for writing, replace the content, release
    pub fn write_all(&self, path: &str, data: &[u8]) {
        let flags = uvfs::OpenFlags {
            truncate: true,
            ..uvfs::OpenFlags::write_only()
        };
        let fd = self.fs.open(path, flags).unwrap();
        assert_eq!(self.fs.write(fd, data, 0).unwrap(), data.len());
        self.fs.release(fd).unwrap();
    }

    /// Wait for every uploader to exit
    pub fn settle(&self) {
        assert!(
            self.fs.store().ctx().wait_for_uploads(Duration::from_secs(10)),
            "uploads did not finish"
        );
    }
}

/// Zip archive with the given `(name, bytes)` entries
pub fn zip_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
    use std::io::Write;
    let mut buf = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buf);
        let options = zip::write::SimpleFileOptions::default();
        for (name, bytes) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap();
    }
    buf.into_inner()
}
