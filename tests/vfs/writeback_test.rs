/*!
 * Write-Back Tests
 * Shadow copies, release-time commits and the per-file uploader
 */

use std::time::Duration;

use pretty_assertions::assert_eq;

use uvfs::fs::DOC_ID_ATTR;
use uvfs::store::docs::sha1_hex;
use uvfs::{OpenFlags, UvfsError};

use crate::common::{FakeRepository, Mounted};

const STARTED: Duration = Duration::from_secs(5);

#[test]
fn test_released_content_visible_before_commit() {
    let repo = FakeRepository::new();
    let id = repo.add_doc("a.txt", b"original", &["email"]);
    let (gate, started) = repo.hold_uploads();
    let m = Mounted::new(repo);
    let path = format!("/docs/{}/originals/a.txt", id);

    m.write_all(&path, b"hello");
    started.recv_timeout(STARTED).unwrap();
    assert_eq!(m.read_all(&path), b"hello");
    assert!(m.repo.uploads().is_empty());

    drop(gate);
    m.settle();
    let uploads = m.repo.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].content, b"hello");
    assert_eq!(uploads[0].categories, "email");
    assert_eq!(uploads[0].version_of, Some(sha1_hex(b"original")));
    assert_eq!(m.fs.store().stats().commits, 1);
}

#[test]
fn test_rapid_releases_share_one_uploader() {
    let repo = FakeRepository::new();
    let id = repo.add_doc("a.txt", b"original", &["email"]);
    let (gate, started) = repo.hold_uploads();
    let m = Mounted::new(repo);
    let path = format!("/docs/{}/originals/a.txt", id);

    m.write_all(&path, b"v1");
    started.recv_timeout(STARTED).unwrap();
    m.write_all(&path, b"v2");
    m.write_all(&path, b"v2");

    drop(gate);
    m.settle();
    let uploads = m.repo.uploads();
    let contents: Vec<&[u8]> = uploads.iter().map(|u| u.content.as_slice()).collect();
    assert_eq!(contents, vec![b"v1".as_slice(), b"v2".as_slice()]);
    assert_eq!(uploads[0].version_of, Some(sha1_hex(b"original")));
    assert_eq!(uploads[1].version_of, Some(sha1_hex(b"v1")));

    let stats = m.fs.store().stats();
    assert_eq!(stats.uploaders_spawned, 1);
    assert_eq!(stats.commits, 2);
    assert_eq!(stats.active_uploaders, 0);
}

#[test]
fn test_unchanged_content_not_committed() {
    let repo = FakeRepository::new();
    let id = repo.add_doc("a.txt", b"original", &[]);
    let m = Mounted::new(repo);

    m.write_all(&format!("/docs/{}/originals/a.txt", id), b"original");
    m.settle();
    assert!(m.repo.uploads().is_empty());
    assert_eq!(m.fs.store().stats().skipped_commits, 1);
}

#[test]
fn test_uncategorized_version_gets_default_category() {
    let repo = FakeRepository::new();
    let id = repo.add_doc("plain.txt", b"one", &[]);
    let m = Mounted::new(repo);

    m.write_all(&format!("/docs/{}/originals/plain.txt", id), b"two");
    m.settle();
    let uploads = m.repo.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].categories, "added-via/UVFS");
}

#[test]
fn test_write_through_category_link() {
    let repo = FakeRepository::new();
    let id = repo.add_doc("a.txt", b"one", &["email"]);
    let m = Mounted::new(repo);

    m.write_all("/categories/email/a.txt", b"two");
    m.settle();
    assert_eq!(m.read_all(&format!("/docs/{}/originals/a.txt", id)), b"two");
    let uploads = m.repo.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].version_of, Some(sha1_hex(b"one")));
}

#[test]
fn test_category_drop_uploads_new_document() {
    let repo = FakeRepository::new();
    let seed = repo.add_doc("seed.txt", b"seed", &["email"]);
    let m = Mounted::new(repo);
    assert!(matches!(
        m.fs.create("/categories/missing/note.txt", 0o644),
        Err(UvfsError::NotFound(_))
    ));

    let fd = m.fs.create("/categories/email/note.txt", 0o644).unwrap();
    m.fs.write(fd, b"note body", 0).unwrap();
    m.fs.release(fd).unwrap();
    m.settle();

    let uploads = m.repo.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].content, b"note body");
    assert_eq!(uploads[0].categories, "email");
    assert_eq!(uploads[0].title, "note.txt");
    assert_eq!(uploads[0].version_of, None);

    let docs: Vec<String> = m
        .fs
        .readdir("/docs")
        .unwrap()
        .into_iter()
        .filter(|id| *id != seed)
        .collect();
    assert_eq!(docs.len(), 1);
    let new_id = &docs[0];
    assert_eq!(
        m.fs.getxattr("/categories/email/note.txt", DOC_ID_ATTR).unwrap(),
        new_id.as_bytes()
    );
    assert_eq!(
        m.read_all(&format!("/docs/{}/originals/note.txt", new_id)),
        b"note body"
    );
}

#[test]
fn test_version_keeps_apparent_type() {
    let repo = FakeRepository::new();
    let id = repo.add_doc("scan", b"%PDF-1.4 one", &["papers"]);
    repo.set_mime(&id, "application/pdf");
    let m = Mounted::new(repo);

    m.write_all(&format!("/docs/{}/originals/scan", id), b"%PDF-1.4 two");
    m.settle();
    let uploads = m.repo.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].content_type, "application/pdf");
    assert_eq!(uploads[0].title, "scan.pdf");
    assert_eq!(uploads[0].categories, "papers");
}

#[test]
fn test_empty_created_file_not_uploaded() {
    let repo = FakeRepository::new();
    repo.add_doc("seed.txt", b"seed", &["email"]);
    let m = Mounted::new(repo);

    let fd = m.fs.create("/categories/email/empty.txt", 0o644).unwrap();
    m.fs.release(fd).unwrap();
    m.settle();
    assert!(m.repo.uploads().is_empty());
    assert_eq!(m.fs.store().stats().skipped_commits, 1);
}

#[test]
fn test_dotfiles_and_scratch_files_stay_local() {
    let repo = FakeRepository::new();
    repo.add_doc("seed.txt", b"seed", &["email"]);
    let m = Mounted::new(repo);

    for name in [".DS_Store", "draft.tmp"] {
        let path = format!("/categories/email/{}", name);
        let fd = m.fs.create(&path, 0o644).unwrap();
        m.fs.write(fd, b"local only", 0).unwrap();
        m.fs.release(fd).unwrap();
        assert_eq!(m.read_all(&path), b"local only");
    }
    m.settle();
    assert_eq!(m.fs.store().stats().uploaders_spawned, 0);
    assert!(m.repo.uploads().is_empty());
}

#[test]
fn test_second_writer_denied() {
    let repo = FakeRepository::new();
    let id = repo.add_doc("a.txt", b"original", &[]);
    let m = Mounted::new(repo);
    let path = format!("/docs/{}/originals/a.txt", id);

    let writer = m.fs.open(&path, OpenFlags::write_only()).unwrap();
    assert!(matches!(
        m.fs.open(&path, OpenFlags::read_write()),
        Err(UvfsError::PermissionDenied(_))
    ));

    let reader = m.fs.open(&path, OpenFlags::read_only()).unwrap();
    m.fs.write(writer, b"CHANGED!", 0).unwrap();
    assert_eq!(m.fs.read(reader, 64, 0).unwrap(), b"original");
    assert_eq!(m.fs.read(writer, 64, 0).unwrap(), b"CHANGED!");
    m.fs.release(reader).unwrap();
    m.fs.release(writer).unwrap();
    m.settle();
    assert_eq!(m.repo.uploads().len(), 1);
}

#[test]
fn test_shutdown_reports_pending_uploads() {
    let repo = FakeRepository::new();
    let id = repo.add_doc("a.txt", b"original", &[]);
    let (gate, started) = repo.hold_uploads();
    let m = Mounted::new(repo);

    m.write_all(&format!("/docs/{}/originals/a.txt", id), b"late");
    started.recv_timeout(STARTED).unwrap();
    assert!(!m.fs.destroy(Duration::from_millis(50)));

    drop(gate);
    m.settle();
    assert_eq!(m.repo.uploads().len(), 1);
}
