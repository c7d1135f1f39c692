/*!
 * Store Tests
 * Lazy expansion, expiry and the repository-backed listings
 */

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use pretty_assertions::assert_eq;

use uvfs::vfs::node::Expiry;
use uvfs::vfs::{Content, Hook, Node};
use uvfs::{Pathname, UvfsError, UvfsResult};

use crate::common::{FakeRepository, Mounted};

fn p(s: &str) -> Pathname {
    Pathname::new(s).unwrap()
}

fn counting_hook(runs: &Arc<AtomicUsize>) -> Hook {
    let runs = Arc::clone(runs);
    Arc::new(move |path: &Pathname| -> UvfsResult<Node> {
        runs.fetch_add(1, Ordering::SeqCst);
        let owner = uvfs::vfs::Owner { uid: 501, gid: 20 };
        let name = path.file_name().unwrap().as_str().to_string();
        let mut dir = Node::directory(name, owner);
        dir.as_dir_mut().unwrap().entries.insert(
            uvfs::Filename::new("inside.txt").unwrap(),
            Node::file("inside.txt", owner, Content::from_bytes(b"lazy".to_vec())),
        );
        Ok(dir)
    })
}

#[test]
fn test_deferred_hook_runs_once() {
    let m = Mounted::new(FakeRepository::new());
    let owner = m.fs.store().ctx().owner();
    let runs = Arc::new(AtomicUsize::new(0));
    m.fs.store()
        .insert(&p("/lazy"), Node::deferred_directory("lazy", owner, counting_hook(&runs)))
        .unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    for _ in 0..3 {
        assert_eq!(m.fs.readdir("/lazy").unwrap(), vec!["inside.txt"]);
    }
    assert_eq!(m.read_all("/lazy/inside.txt"), b"lazy");
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_expansion_runs_hook_once() {
    let m = Mounted::new(FakeRepository::new());
    let owner = m.fs.store().ctx().owner();
    let runs = Arc::new(AtomicUsize::new(0));
    m.fs.store()
        .insert(&p("/shared"), Node::deferred_directory("shared", owner, counting_hook(&runs)))
        .unwrap();

    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                assert_eq!(m.fs.readdir("/shared").unwrap(), vec!["inside.txt"]);
            });
        }
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_symlink_cycle_is_missing() {
    let m = Mounted::new(FakeRepository::new());
    let owner = m.fs.store().ctx().owner();
    m.fs.store().insert(&p("/a"), Node::symlink("a", owner, "b")).unwrap();
    m.fs.store().insert(&p("/b"), Node::symlink("b", owner, "a")).unwrap();

    assert!(matches!(
        m.fs.store().chase_symlinks(&p("/a")),
        Err(UvfsError::NotFound(_))
    ));
    assert!(matches!(
        m.fs.open("/a", uvfs::OpenFlags::read_only()),
        Err(UvfsError::NotFound(_))
    ));
    assert_eq!(m.fs.readlink("/a").unwrap(), "b");
}

#[test]
fn test_stale_entry_reported_absent() {
    let m = Mounted::new(FakeRepository::new());
    let owner = m.fs.store().ctx().owner();
    let stale = Node::directory("old", owner).expires(Expiry::At(SystemTime::UNIX_EPOCH));
    m.fs.store().insert(&p("/docs/old"), stale).unwrap();

    assert!(!m.fs.store().exists(&p("/docs/old")));
    assert!(m.fs.store().with_node(&p("/docs/old"), |_| ()).is_ok());
}

#[test]
fn test_most_recent_document_precreated() {
    let repo = FakeRepository::new();
    let id = repo.add_doc("latest.txt", b"fresh", &[]);
    repo.set_most_recent(&id);
    let m = Mounted::new(repo);

    let dump = m.fs.store().display_tree(&p("/docs")).unwrap();
    assert!(dump.contains(&format!("/docs/{}/:", id)));
    assert!(dump.contains(&format!("/docs/{}/originals/\t<deferred>", id)));
    assert_eq!(m.repo.fetches(), 0);
}

#[test]
fn test_docs_entries_fetched_on_demand() {
    let repo = FakeRepository::new();
    let id = repo.add_doc("a.txt", b"alpha", &[]);
    let m = Mounted::new(repo);

    assert!(m.fs.readdir("/docs").unwrap().is_empty());
    assert!(m.fs.store().exists(&p(&format!("/docs/{}", id))));
    assert_eq!(
        m.fs.readdir(&format!("/docs/{}", id)).unwrap(),
        vec!["first.png", "metadata", "originals", "page-images", "thumbnails"]
    );
    assert_eq!(m.fs.readdir("/docs").unwrap(), vec![id.clone()]);
    assert!(!m.fs.store().exists(&p("/docs/01227-20-9999-999")));
}

#[test]
fn test_category_listing_links_to_originals() {
    let repo = FakeRepository::new();
    let id = repo.add_doc("a.txt", b"alpha", &["colors/red", "email"]);
    let m = Mounted::new(repo);

    assert_eq!(m.fs.readdir("/categories").unwrap(), vec!["colors", "email"]);
    assert_eq!(m.fs.readdir("/categories/colors").unwrap(), vec!["red"]);
    assert_eq!(m.fs.readdir("/categories/colors/red").unwrap(), vec!["a.txt"]);
    assert_eq!(
        m.fs.readlink("/categories/colors/red/a.txt").unwrap(),
        format!("../../../docs/{}/originals/a.txt", id)
    );
    assert_eq!(
        m.fs.readlink("/categories/email/a.txt").unwrap(),
        format!("../../docs/{}/originals/a.txt", id)
    );
    assert_eq!(m.read_all("/categories/email/a.txt"), b"alpha");
    assert_eq!(m.repo.fetches(), 1);
}

#[test]
fn test_saved_search_lists_hits() {
    let repo = FakeRepository::new();
    let id = repo.add_doc("report.txt", b"quarterly numbers", &[]);
    repo.add_doc("other.txt", b"nothing here", &[]);
    let m = Mounted::new(repo);

    m.fs.store().add_search("quarterly").unwrap();
    assert_eq!(m.fs.readdir("/search").unwrap(), vec!["quarterly"]);
    assert_eq!(m.repo.searches(), 0);

    assert_eq!(m.fs.readdir("/search/quarterly").unwrap(), vec!["report.txt"]);
    assert_eq!(
        m.fs.readlink("/search/quarterly/report.txt").unwrap(),
        format!("../../docs/{}/originals/report.txt", id)
    );
    assert_eq!(m.repo.searches(), 1);
    assert!(m.searches_file().lines().any(|line| line == "quarterly"));
}

#[test]
fn test_saved_searches_survive_remount() {
    let repo = FakeRepository::new();
    let first = Mounted::new(Arc::clone(&repo));
    first.fs.mkdir("/search/foo", 0o755).unwrap();
    assert!(first.fs.destroy(Duration::from_secs(1)));

    let state = first.state.path().to_path_buf();
    let second = Mounted::with_config(repo, |config| config.with_state_dir(state));
    assert_eq!(second.fs.readdir("/search").unwrap(), vec!["foo"]);
}

#[test]
fn test_expired_listing_reaped_and_refetched() {
    let repo = FakeRepository::new();
    repo.add_doc("memo.txt", b"budget memo", &[]);
    let m = Mounted::with_config(repo, |config| {
        config.with_expire_interval(Duration::from_millis(200))
    });

    m.fs.store().add_search("memo").unwrap();
    assert_eq!(m.fs.readdir("/search/memo").unwrap(), vec!["memo.txt"]);
    assert!(m.fs.store().expiry_len() >= 2);

    std::thread::sleep(Duration::from_millis(300));
    assert!(m.fs.store().reap_expired() >= 1);
    assert_eq!(m.fs.store().expiry_len(), 0);
    let dump = m.fs.store().display_tree(&p("/search")).unwrap();
    assert!(dump.contains("/search/memo/\t<deferred>"));

    assert_eq!(m.fs.readdir("/search/memo").unwrap(), vec!["memo.txt"]);
    assert_eq!(m.repo.searches(), 2);
}

#[test]
fn test_poller_invalidates_top_level() {
    let repo = FakeRepository::new();
    repo.add_doc("a.txt", b"alpha", &["email"]);
    let m = Mounted::new(repo);
    assert_eq!(m.fs.readdir("/categories").unwrap(), vec!["email"]);

    m.repo.set_mod_time(4_000_000_000.0);
    m.fs.init().unwrap();

    let mut invalidated = false;
    for _ in 0..200 {
        let dump = m.fs.store().display_tree(&Pathname::root()).unwrap();
        if dump.contains("/categories/\t<deferred>") {
            invalidated = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(invalidated, "poller never invalidated /categories");
    assert!(m.fs.destroy(Duration::from_secs(1)));
    assert_eq!(m.fs.readdir("/categories").unwrap(), vec!["email"]);
}

#[test]
fn test_delete_document_drops_entry() {
    let repo = FakeRepository::new();
    let id = repo.add_doc("gone.txt", b"bye", &[]);
    let m = Mounted::new(repo);
    let path = p(&format!("/docs/{}", id));

    assert!(m.fs.store().exists(&path));
    m.fs.store().delete_document(&id).unwrap();
    assert!(!m.fs.store().exists(&path));
    assert!(m.fs.readdir("/docs").unwrap().is_empty());
}
