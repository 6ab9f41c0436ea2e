use copyall::scanner::{FilelistError, Filelist, Filters};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn write(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn names(list: &Filelist) -> Vec<String> {
    list.paths()
        .iter()
        .map(|p| {
            p.strip_prefix(list.root())
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect()
}

#[test]
fn test_photo_library_selection() {
    let dir = tempdir().unwrap();
    write(dir.path(), "2023/IMG_0001.jpg", &[0u8; 2048]);
    write(dir.path(), "2023/IMG_0002.JPG", &[0u8; 2048]);
    write(dir.path(), "2023/thumbs/IMG_0001.jpg", &[0u8; 64]);
    write(dir.path(), "2024/DSC_0100.jpg", &[0u8; 4096]);
    write(dir.path(), "2024/IMG_0003.png", &[0u8; 2048]);
    write(dir.path(), "notes.txt", b"hello");

    let filters = Filters::default()
        .with_extensions(vec![".jpg".into(), ".png".into()])
        .with_prefixes(vec!["IMG_".into()])
        .with_min_size(1024);
    let list = Filelist::new(dir.path(), filters).unwrap();

    assert_eq!(
        names(&list),
        vec!["2023/IMG_0001.jpg", "2024/IMG_0003.png"]
    );
    assert_eq!(list.sizes(), &[2048, 2048]);
    assert_eq!(list.total_size(), 4096);
}

#[test]
fn test_extension_set_ignores_noise() {
    let dir = tempdir().unwrap();
    for name in [
        "a.txt",
        "b.TXT",
        "c.tar.gz",
        ".bashrc",
        "README",
        "weird.my ext",
        "sub/d.txt",
        "sub/e.rs",
    ] {
        write(dir.path(), name, b"x");
    }

    let list = Filelist::new(dir.path(), Filters::default()).unwrap();
    let expected: BTreeSet<String> = [".txt", ".TXT", ".gz", ".rs"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(list.extensions(), &expected);
}

#[test]
fn test_accessors_are_cached() {
    let dir = tempdir().unwrap();
    for i in 0..10 {
        write(dir.path(), &format!("d{}/f{i}.bin", i % 3), &vec![1u8; i]);
    }
    let list = Filelist::new(dir.path(), Filters::default()).unwrap();

    let first = list.paths().to_vec();
    let sizes = list.sizes().to_vec();
    let exts = list.extensions().clone();
    let counters = list.io_counters();
    let (walks, stats) = (counters.walks(), counters.stats());

    assert_eq!(list.paths(), first.as_slice());
    assert_eq!(list.sizes(), sizes.as_slice());
    assert_eq!(list.extensions(), &exts);
    assert!(list.has_files());
    assert_eq!(counters.walks(), walks);
    assert_eq!(counters.stats(), stats);
    assert_eq!(walks, 1);
    assert_eq!(stats, 10);
}

#[test]
fn test_has_files_before_walk() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("empty/deeper")).unwrap();
    let list = Filelist::new(dir.path(), Filters::default()).unwrap();
    assert!(!list.has_files());

    write(dir.path(), "empty/deeper/found.txt", b"x");
    let list = Filelist::new(dir.path(), Filters::default()).unwrap();
    assert!(list.has_files());
}

#[test]
fn test_has_files_respects_filters() {
    let dir = tempdir().unwrap();
    write(dir.path(), "only.txt", b"x");
    let filters = Filters::default().with_extensions(vec![".mp4".into()]);
    let list = Filelist::new(dir.path(), filters).unwrap();
    assert!(!list.has_files());
}

#[test]
fn test_vanished_file_dropped_from_sizes() {
    let dir = tempdir().unwrap();
    write(dir.path(), "keep.txt", b"keep");
    write(dir.path(), "gone.txt", b"gone");
    let list = Filelist::new(dir.path(), Filters::default()).unwrap();

    assert_eq!(list.paths().len(), 2);
    fs::remove_file(dir.path().join("gone.txt")).unwrap();

    assert_eq!(list.sizes(), &[4]);
    assert_eq!(list.sized_paths().len(), 1);
    assert!(list.sized_paths()[0].ends_with("keep.txt"));
    // The walked list itself is never rewritten
    assert_eq!(list.paths().len(), 2);
}

#[test]
fn test_construction_errors() {
    let dir = tempdir().unwrap();
    write(dir.path(), "file.txt", b"x");

    let err = Filelist::new(dir.path(), Filters::default().with_min_size(5).with_max_size(4))
        .unwrap_err();
    assert_eq!(err, FilelistError::InvalidRange { min: 5, max: 4 });

    let err = Filelist::new(dir.path().join("missing"), Filters::default()).unwrap_err();
    assert!(matches!(err, FilelistError::PathNotFound(_)));

    let err = Filelist::new(dir.path().join("file.txt"), Filters::default()).unwrap_err();
    assert!(matches!(err, FilelistError::NotADirectory(_)));
}

#[test]
fn test_shared_across_threads() {
    let dir = tempdir().unwrap();
    for i in 0..50 {
        write(dir.path(), &format!("f{i}.dat"), b"data");
    }
    let list = Arc::new(Filelist::new(dir.path(), Filters::default()).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let list = Arc::clone(&list);
            std::thread::spawn(move || list.total_size())
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), 200);
    }
    assert_eq!(list.io_counters().walks(), 1);
    assert_eq!(list.io_counters().stats(), 50);
}

#[test]
fn test_hashes_align_with_sizes() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.txt", b"same");
    write(dir.path(), "b.txt", b"same");
    write(dir.path(), "c.txt", b"diff");
    let list = Filelist::new(dir.path(), Filters::default()).unwrap();

    let hashes = list.hashes();
    assert_eq!(hashes.len(), list.sizes().len());
    assert_eq!(hashes[0], hashes[1]);
    assert_ne!(hashes[0], hashes[2]);
    assert!(hashes.iter().all(Option::is_some));
}
