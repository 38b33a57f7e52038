use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use titlemap::testing::{CountingWalker, FixedWalker};
use titlemap::{DestinationIndex, Error, FsWalker};

fn touch(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"").unwrap();
}

#[test]
fn test_concurrent_first_lookups_share_one_walk() {
    let walker = CountingWalker::new(FixedWalker::new(["a/b/movie.m4v"]))
        .with_delay(Duration::from_millis(50));
    let index = Arc::new(DestinationIndex::with_walker(walker));
    let root = PathBuf::from("/library");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let index = Arc::clone(&index);
            let root = root.clone();
            thread::spawn(move || index.find(&root, "movie").unwrap())
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), PathBuf::from("a/b"));
    }
    assert_eq!(index.walker().walks(), 1);
}

#[test]
fn test_concurrent_lookups_on_different_roots() {
    let walker = CountingWalker::new(FixedWalker::new(["movie.mp4"]))
        .with_delay(Duration::from_millis(20));
    let index = DestinationIndex::with_walker(walker);

    thread::scope(|scope| {
        for i in 0..4 {
            let index = &index;
            scope.spawn(move || {
                let root = PathBuf::from(format!("/root{i}"));
                assert!(index.exists_under(&root, "movie"));
            });
        }
    });
    assert_eq!(index.walker().walks(), 4);
}

#[test]
fn test_invalidate_reflects_filesystem_changes() {
    let root = tempfile::tempdir().unwrap();
    touch(&root.path().join("TV/Show/S01E01.m4v"));

    let index = DestinationIndex::with_walker(CountingWalker::new(FsWalker));
    assert_eq!(
        index.find(root.path(), "S01E01").unwrap(),
        PathBuf::from("TV/Show")
    );

    touch(&root.path().join("TV/Show/S01E02.m4v"));
    fs::remove_file(root.path().join("TV/Show/S01E01.m4v")).unwrap();
    assert!(index.exists_under(root.path(), "S01E01"));
    assert!(matches!(
        index.find(root.path(), "S01E02"),
        Err(Error::NotFound { .. })
    ));
    assert_eq!(index.walker().walks(), 1);

    index.invalidate(root.path());
    assert!(!index.exists_under(root.path(), "S01E01"));
    assert!(index.exists_under(root.path(), "S01E02"));
    assert_eq!(index.walker().walks(), 2);
}

#[test]
fn test_parsed_output_name_found_in_index() {
    let root = tempfile::tempdir().unwrap();
    touch(&root.path().join("Movies/Am\u{e9}lie (2001).m4v"));

    let (record, _) = titlemap::parse("AMELIE | 1 | Am\u{e9}lie (2001)");
    let index = DestinationIndex::new();
    assert!(index.exists_under(root.path(), &record.output_base_name));
}
