/*!
 * Adapter Tests
 * POSIX-shaped operations as a filesystem bridge would issue them
 */

use std::time::{Duration, SystemTime};

use nix::errno::Errno;
use pretty_assertions::assert_eq;

use uvfs::fs::{DOC_ID_ATTR, FINDER_INFO_ATTR, TEXT_ENCODING_ATTR};
use uvfs::vfs::types::S_IRWXU;
use uvfs::{OpenFlags, UvfsError};

use crate::common::{zip_of, FakeRepository, Mounted};

#[test]
fn test_root_listing() {
    let m = Mounted::new(FakeRepository::new());
    assert_eq!(m.fs.readdir("/").unwrap(), vec!["categories", "docs", "search"]);
    assert!(matches!(m.fs.readdir("/nowhere"), Err(UvfsError::NotFound(_))));
}

#[test]
fn test_document_subtree() {
    let repo = FakeRepository::new();
    let id = repo.add_doc("notes.txt", b"some notes", &["work"]);
    let m = Mounted::new(repo);
    let doc = format!("/docs/{}", id);

    assert_eq!(m.fs.readdir(&format!("{}/originals", doc)).unwrap(), vec!["notes.txt"]);
    assert_eq!(m.read_all(&format!("{}/originals/notes.txt", doc)), b"some notes");
    assert_eq!(
        m.fs.readdir(&format!("{}/metadata", doc)).unwrap(),
        vec!["_metadata.txt", "categories.txt", "ctime.txt", "id.txt", "title.txt"]
    );
    assert_eq!(m.read_all(&format!("{}/metadata/id.txt", doc)), id.as_bytes());
    assert_eq!(m.read_all(&format!("{}/metadata/title.txt", doc)), b"notes.txt");

    assert_eq!(
        m.read_all(&format!("{}/thumbnails/first.png", doc)),
        format!("PNG {} thumbnails first.png", id).as_bytes()
    );
    assert_eq!(
        m.fs.readlink(&format!("{}/first.png", doc)).unwrap(),
        "page-images/page00001.png"
    );
    assert_eq!(
        m.read_all(&format!("{}/first.png", doc)),
        format!("PNG {} page-images page00001.png", id).as_bytes()
    );
}

#[test]
fn test_icon_file_hidden_from_listings() {
    let repo = FakeRepository::new();
    let id = repo.add_doc("a.txt", b"alpha", &[]);
    let m = Mounted::new(repo);
    let doc = format!("/docs/{}", id);

    assert!(!m.fs.readdir(&doc).unwrap().iter().any(|n| n == "Icon\r"));
    assert!(m.fs.getattr(&format!("{}/Icon\r", doc), None).is_ok());
}

#[test]
fn test_web_page_archive_unpacked() {
    let repo = FakeRepository::new();
    let archive = zip_of(&[
        ("index.html", b"<html></html>".as_slice()),
        ("index_files/style.css", b"body{}".as_slice()),
    ]);
    let id = repo.add_wpc("page.html", archive);
    let m = Mounted::new(repo);
    let originals = format!("/docs/{}/originals", id);

    assert_eq!(m.fs.readdir(&originals).unwrap(), vec!["index_files", "page.html"]);
    assert_eq!(m.read_all(&format!("{}/page.html", originals)), b"<html></html>");
    let css = m
        .fs
        .getattr(&format!("{}/index_files/style.css", originals), None)
        .unwrap();
    assert_eq!(css.size, 6);

    let created = m.fs.create(&format!("{}/extra.txt", originals), 0o644);
    assert!(matches!(created, Err(UvfsError::PermissionDenied(_))));
    let opened = m.fs.open(&format!("{}/page.html", originals), OpenFlags::write_only());
    assert!(matches!(opened, Err(UvfsError::PermissionDenied(_))));
}

#[test]
fn test_descriptors_reuse_lowest_free() {
    let repo = FakeRepository::new();
    let id = repo.add_doc("a.txt", b"alpha", &[]);
    let m = Mounted::new(repo);
    let path = format!("/docs/{}/originals/a.txt", id);

    let first = m.fs.open(&path, OpenFlags::read_only()).unwrap();
    let second = m.fs.open(&path, OpenFlags::read_only()).unwrap();
    assert_eq!((first, second), (0, 1));
    m.fs.release(first).unwrap();
    assert_eq!(m.fs.open(&path, OpenFlags::read_only()).unwrap(), 0);
    assert_eq!(m.fs.open_files(), 2);
}

#[test]
fn test_unknown_descriptor() {
    let m = Mounted::new(FakeRepository::new());
    let err = m.fs.read(42, 10, 0).unwrap_err();
    assert_eq!(err, UvfsError::BadDescriptor(42));
    assert_eq!(err.errno(), Errno::EBADF);
    assert!(matches!(m.fs.release(42), Err(UvfsError::BadDescriptor(42))));
    assert!(matches!(m.fs.flush(42), Err(UvfsError::BadDescriptor(42))));
}

#[test]
fn test_open_rejects_directories_and_root() {
    let m = Mounted::new(FakeRepository::new());
    assert!(matches!(
        m.fs.open("/", OpenFlags::read_only()),
        Err(UvfsError::PermissionDenied(_))
    ));
    assert!(matches!(
        m.fs.open("/docs", OpenFlags::read_only()),
        Err(UvfsError::PermissionDenied(_))
    ));
    assert!(matches!(
        m.fs.open("/docs/missing.txt", OpenFlags::read_only()),
        Err(UvfsError::NotFound(_))
    ));
}

#[test]
fn test_local_file_lifecycle() {
    let m = Mounted::new(FakeRepository::new());
    let fd = m.fs.create("/draft.txt", 0o644).unwrap();
    assert_eq!(m.fs.write(fd, b"hello world", 0).unwrap(), 11);
    assert_eq!(m.fs.getattr("/draft.txt", Some(fd)).unwrap().size, 11);
    assert_eq!(m.fs.read(fd, 5, 6).unwrap(), b"world");
    m.fs.release(fd).unwrap();

    assert_eq!(m.read_all("/draft.txt"), b"hello world");
    m.fs.truncate("/draft.txt", 5, None).unwrap();
    assert_eq!(m.read_all("/draft.txt"), b"hello");
    assert_eq!(m.fs.getattr("/draft.txt", None).unwrap().size, 5);

    let dup = m.fs.create("/DRAFT.txt", 0o644);
    assert!(matches!(dup, Err(UvfsError::AlreadyExists(_))));

    m.fs.unlink("/draft.txt").unwrap();
    assert!(matches!(m.fs.getattr("/draft.txt", None), Err(UvfsError::NotFound(_))));
    assert_eq!(m.repo.uploads().len(), 0);
}

#[test]
fn test_truncate_through_descriptor() {
    let m = Mounted::new(FakeRepository::new());
    let fd = m.fs.create("/t.txt", 0o644).unwrap();
    m.fs.write(fd, b"abcdef", 0).unwrap();
    assert!(matches!(
        m.fs.truncate("/t.txt", u64::MAX, Some(fd)),
        Err(UvfsError::InvalidArgument(_))
    ));
    m.fs.truncate("/t.txt", 2, Some(fd)).unwrap();
    assert_eq!(m.fs.getattr("/t.txt", Some(fd)).unwrap().size, 2);
    m.fs.release(fd).unwrap();
    assert_eq!(m.read_all("/t.txt"), b"ab");
}

#[test]
fn test_read_only_descriptor_cannot_write() {
    let m = Mounted::new(FakeRepository::new());
    let fd = m.fs.create("/r.txt", 0o644).unwrap();
    m.fs.release(fd).unwrap();

    let fd = m.fs.open("/r.txt", OpenFlags::read_only()).unwrap();
    assert!(matches!(m.fs.write(fd, b"x", 0), Err(UvfsError::PermissionDenied(_))));
    m.fs.release(fd).unwrap();
}

#[test]
fn test_create_needs_writable_directory() {
    let m = Mounted::new(FakeRepository::new());
    assert!(matches!(
        m.fs.create("/docs/new.txt", 0o644),
        Err(UvfsError::PermissionDenied(_))
    ));
    assert!(matches!(
        m.fs.create("/missing/new.txt", 0o644),
        Err(UvfsError::NotFound(_))
    ));
}

#[test]
fn test_mkdir_rules() {
    let repo = FakeRepository::new();
    repo.add_doc("a.txt", b"alpha", &["colors/red"]);
    let m = Mounted::new(repo);

    let err = m.fs.mkdir("/categories/colors/blue", 0o755).unwrap_err();
    assert_eq!(err.errno(), Errno::EACCES);
    assert!(matches!(m.fs.mkdir("/docs/x", 0o755), Err(UvfsError::PermissionDenied(_))));

    m.fs.mkdir("/search/my query", 0o755).unwrap();
    assert!(m.searches_file().lines().any(|line| line == "my query"));
    assert!(matches!(
        m.fs.mkdir("/search/my query", 0o755),
        Err(UvfsError::AlreadyExists(_))
    ));

    m.fs.mkdir("/work", 0o755).unwrap();
    assert_eq!(m.fs.readdir("/work").unwrap(), Vec::<String>::new());
}

#[test]
fn test_placeholder_folder_renamed_into_search() {
    let m = Mounted::new(FakeRepository::new());
    m.fs.mkdir("/search/untitled folder", 0o755).unwrap();
    assert!(!m.searches_file().contains("untitled folder"));

    m.fs.rename("/search/untitled folder", "/search/invoices").unwrap();
    assert_eq!(m.fs.readdir("/search").unwrap(), vec!["invoices"]);
    assert!(m.searches_file().lines().any(|line| line == "invoices"));
}

#[test]
fn test_rename_local_entries() {
    let m = Mounted::new(FakeRepository::new());
    m.fs.mkdir("/inbox", 0o755).unwrap();
    m.fs.mkdir("/archive", 0o755).unwrap();
    let fd = m.fs.create("/inbox/a.txt", 0o644).unwrap();
    m.fs.write(fd, b"moved", 0).unwrap();
    m.fs.release(fd).unwrap();

    m.fs.rename("/inbox/a.txt", "/archive/b.txt").unwrap();
    assert_eq!(m.read_all("/archive/b.txt"), b"moved");
    assert!(m.fs.readdir("/inbox").unwrap().is_empty());

    m.fs.mkdir("/inbox/c", 0o755).unwrap();
    assert!(matches!(
        m.fs.rename("/inbox/c", "/archive/b.txt"),
        Err(UvfsError::AlreadyExists(_))
    ));
    assert!(matches!(
        m.fs.rename("/docs", "/papers"),
        Err(UvfsError::PermissionDenied(_))
    ));
}

#[test]
fn test_rename_into_own_subtree_rejected() {
    let m = Mounted::new(FakeRepository::new());
    m.fs.mkdir("/x", 0o755).unwrap();
    let fd = m.fs.create("/x/keep.txt", 0o644).unwrap();
    m.fs.write(fd, b"kept", 0).unwrap();
    m.fs.release(fd).unwrap();

    for target in ["/x/y", "/X/sub/y", "/x"] {
        assert!(matches!(
            m.fs.rename("/x", target),
            Err(UvfsError::InvalidArgument(_))
        ));
    }
    assert_eq!(
        m.fs.readdir("/").unwrap(),
        vec!["categories", "docs", "search", "x"]
    );
    assert_eq!(m.read_all("/x/keep.txt"), b"kept");
}

#[test]
fn test_rmdir_rules() {
    let repo = FakeRepository::new();
    repo.add_doc("q.txt", b"quarterly", &[]);
    let m = Mounted::new(repo);

    m.fs.mkdir("/search/quarterly", 0o755).unwrap();
    assert_eq!(m.fs.readdir("/search/quarterly").unwrap(), vec!["q.txt"]);
    m.fs.rmdir("/search/quarterly").unwrap();
    assert!(m.fs.readdir("/search").unwrap().is_empty());
    assert!(!m.searches_file().contains("quarterly"));

    m.fs.mkdir("/shadows", 0o755).unwrap();
    let fd = m.fs.create("/shadows/._x", 0o644).unwrap();
    m.fs.release(fd).unwrap();
    let fd = m.fs.create("/._shadows", 0o644).unwrap();
    m.fs.release(fd).unwrap();
    m.fs.rmdir("/shadows").unwrap();
    assert!(matches!(m.fs.getattr("/._shadows", None), Err(UvfsError::NotFound(_))));

    m.fs.mkdir("/full", 0o755).unwrap();
    let fd = m.fs.create("/full/real.txt", 0o644).unwrap();
    m.fs.release(fd).unwrap();
    assert!(matches!(m.fs.rmdir("/full"), Err(UvfsError::PermissionDenied(_))));

    assert!(matches!(m.fs.rmdir("/docs"), Err(UvfsError::PermissionDenied(_))));
}

#[test]
fn test_unlink_and_links() {
    let m = Mounted::new(FakeRepository::new());
    let err = m.fs.unlink("/docs").unwrap_err();
    assert_eq!(err.errno(), Errno::EINVAL);

    let fd = m.fs.create("/plain.txt", 0o644).unwrap();
    m.fs.release(fd).unwrap();
    assert!(matches!(m.fs.readlink("/plain.txt"), Err(UvfsError::PermissionDenied(_))));
    assert_eq!(m.fs.link("/plain.txt", "/hard.txt").unwrap_err().errno(), Errno::EACCES);
    assert_eq!(m.fs.symlink("/plain.txt", "/soft.txt").unwrap_err().errno(), Errno::EACCES);
}

#[test]
fn test_attribute_changes() {
    let m = Mounted::new(FakeRepository::new());
    let fd = m.fs.create("/perm.txt", 0o644).unwrap();
    m.fs.release(fd).unwrap();

    m.fs.chmod("/perm.txt", 0o400).unwrap();
    let stat = m.fs.getattr("/perm.txt", None).unwrap();
    assert_eq!(stat.mode & S_IRWXU, 0o400);
    assert!(!stat.is_writable());

    m.fs.chown("/perm.txt", 1234, 56).unwrap();
    let stat = m.fs.getattr("/perm.txt", None).unwrap();
    assert_eq!((stat.uid, stat.gid), (1234, 56));

    let when = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
    m.fs.utimens("/perm.txt", when, when).unwrap();
    let stat = m.fs.getattr("/perm.txt", None).unwrap();
    assert_eq!(stat.mtime, when);
    assert_eq!(stat.atime, when);
}

#[test]
fn test_synthesized_xattrs() {
    let repo = FakeRepository::new();
    let id = repo.add_doc("a.txt", b"alpha", &["email"]);
    let m = Mounted::new(repo);
    let path = format!("/docs/{}/originals/a.txt", id);

    assert_eq!(m.fs.getxattr(&path, DOC_ID_ATTR).unwrap(), id.as_bytes());
    assert_eq!(m.fs.getxattr(&path, TEXT_ENCODING_ATTR).unwrap(), b"UTF-8;");
    assert_eq!(m.fs.getxattr(&path, FINDER_INFO_ATTR).unwrap().len(), 32);
    assert!(m.fs.getxattr(&path, "user.unknown").unwrap().is_empty());

    let names = m.fs.listxattr(&path).unwrap();
    for name in [DOC_ID_ATTR, TEXT_ENCODING_ATTR, FINDER_INFO_ATTR] {
        assert!(names.iter().any(|n| n == name), "{} not listed", name);
    }

    let link = "/categories/email/a.txt";
    assert_eq!(m.fs.getxattr(link, DOC_ID_ATTR).unwrap(), id.as_bytes());

    let locked = m.fs.getxattr("/categories", FINDER_INFO_ATTR).unwrap();
    assert_eq!(&locked[8..10], &[0x10u8, 0x00]);
    let search = m.fs.getxattr("/search", FINDER_INFO_ATTR).unwrap();
    assert_eq!(search, vec![0u8; 32]);
}

#[test]
fn test_stored_xattrs() {
    let m = Mounted::new(FakeRepository::new());
    let fd = m.fs.create("/x.bin", 0o644).unwrap();
    m.fs.release(fd).unwrap();

    m.fs.setxattr("/x.bin", "user.tag", b"abcdef", 0).unwrap();
    m.fs.setxattr("/x.bin", "user.tag", b"XY", 2).unwrap();
    assert_eq!(m.fs.getxattr("/x.bin", "user.tag").unwrap(), b"abXYef");
    m.fs.setxattr("/x.bin", "user.tag", b"!!", 6).unwrap();
    assert_eq!(m.fs.getxattr("/x.bin", "user.tag").unwrap(), b"abXYef!!");
    assert!(m.fs.listxattr("/x.bin").unwrap().iter().any(|n| n == "user.tag"));

    assert!(matches!(
        m.fs.setxattr("/x.bin", "user.none", b"z", 3),
        Err(UvfsError::PermissionDenied(_))
    ));
    assert!(matches!(
        m.fs.setxattr("/x.bin", "user.tag", b"z", 9),
        Err(UvfsError::InvalidArgument(_))
    ));
    assert!(matches!(
        m.fs.setxattr("/x.bin", "user.tag", b"abc", usize::MAX - 1),
        Err(UvfsError::InvalidArgument(_))
    ));
    assert_eq!(m.fs.getxattr("/x.bin", "user.tag").unwrap(), b"abXYef!!");

    m.fs.removexattr("/x.bin", "user.tag").unwrap();
    assert!(m.fs.getxattr("/x.bin", "user.tag").unwrap().is_empty());
}

#[test]
fn test_statvfs_counts_tracked_nodes() {
    let repo = FakeRepository::new();
    repo.add_doc("a.txt", b"alpha", &["email"]);
    let m = Mounted::new(repo);
    m.fs.readdir("/categories/email").unwrap();

    let stats = m.fs.statvfs("/").unwrap();
    assert_eq!(stats.files, m.fs.store().expiry_len() as u64);
    assert!(stats.files > 0);
    assert!(stats.block_size > 0);
}
