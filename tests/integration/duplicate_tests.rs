use copyall::duplicates::{DuplicateFinder, FinderConfig};
use copyall::progress::{ProgressCallback, ProgressSnapshot, RateModel};
use copyall::scanner::{Filelist, Filters};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

fn write(root: &Path, rel: &str, content: &[u8]) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    std::path::absolute(path).unwrap()
}

#[test]
fn test_self_search_scenario() {
    let dir = tempdir().unwrap();
    let one = write(dir.path(), "a/1.txt", b"0123456789");
    let two = write(dir.path(), "a/2.txt", b"0123456789");
    let three = write(dir.path(), "b/3.txt", b"abcdefghij");

    let list = Filelist::new(dir.path(), Filters::default()).unwrap();
    let finder = DuplicateFinder::with_defaults();
    let (groups, stats) = finder.find_in_filelists(&list, &list).unwrap();

    assert!(groups.same_universe);
    assert_eq!(groups.len(), 1);
    let group = &groups.groups[0];
    assert_eq!(group.left, vec![one.clone(), two.clone()]);
    assert_eq!(group.right, group.left);
    assert!(!group.contains(&three));
    assert_eq!(groups.removable(), vec![two]);
    assert_eq!(stats.input_files, 3);
    assert_eq!(stats.duplicate_groups, 1);
    assert_eq!(stats.wasted_space, 10);
}

#[test]
fn test_same_set_of_paths_is_self_search() {
    let dir = tempdir().unwrap();
    let a = write(dir.path(), "a.bin", b"payload");
    let b = write(dir.path(), "b.bin", b"payload");

    let finder = DuplicateFinder::with_defaults();
    let (groups, stats) = finder
        .find_duplicates(&[a.clone(), b.clone()], &[b.clone(), a.clone()])
        .unwrap();

    assert!(stats.same_universe);
    assert_eq!(stats.input_files, 2);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups.groups[0].left, vec![a, b]);
}

#[test]
fn test_cross_universe_backup_check() {
    let dir = tempdir().unwrap();
    let incoming = dir.path().join("incoming");
    let archive = dir.path().join("archive");
    let new_photo = write(&incoming, "IMG_1.jpg", b"new photo bytes");
    let known = write(&incoming, "IMG_2.jpg", b"already archived");
    let archived = write(&archive, "2020/IMG_0002.jpg", b"already archived");
    write(&archive, "2020/IMG_0003.jpg", b"something else!");

    let left = Filelist::new(&archive, Filters::default()).unwrap();
    let right = Filelist::new(&incoming, Filters::default()).unwrap();
    let (groups, _) = DuplicateFinder::with_defaults()
        .find_in_filelists(&left, &right)
        .unwrap();

    assert!(!groups.same_universe);
    assert_eq!(groups.len(), 1);
    assert_eq!(groups.groups[0].left, vec![archived]);
    assert_eq!(groups.groups[0].right, vec![known.clone()]);
    assert_eq!(groups.removable(), vec![known]);
    assert!(groups.iter().all(|g| !g.contains(&new_photo)));
}

#[test]
fn test_cross_universe_without_matches_on_one_side() {
    let dir = tempdir().unwrap();
    let l1 = write(dir.path(), "left/x.txt", b"twin");
    let l2 = write(dir.path(), "left/y.txt", b"twin");
    let r = write(dir.path(), "right/z.txt", b"solo");

    let (groups, _) = DuplicateFinder::with_defaults()
        .find_duplicates(&[l1, l2], &[r])
        .unwrap();
    assert!(groups.is_empty());
}

#[test]
fn test_extension_gating_is_configurable() {
    let dir = tempdir().unwrap();
    let txt = write(dir.path(), "notes.txt", b"identical bytes");
    let md = write(dir.path(), "notes.md", b"identical bytes");
    let paths = vec![txt, md];

    let gated = DuplicateFinder::with_defaults();
    let (groups, _) = gated.find_duplicates(&paths, &paths).unwrap();
    assert!(groups.is_empty());

    let ungated = DuplicateFinder::new(FinderConfig::default().with_match_extensions(false));
    let (groups, _) = ungated.find_duplicates(&paths, &paths).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups.groups[0].len(), 2);
}

#[test]
fn test_empty_files_never_grouped() {
    let dir = tempdir().unwrap();
    let paths: Vec<PathBuf> = (0..4)
        .map(|i| write(dir.path(), &format!("empty{i}.log"), b""))
        .collect();

    let (groups, stats) = DuplicateFinder::with_defaults()
        .find_duplicates(&paths, &paths)
        .unwrap();
    assert!(groups.is_empty());
    assert_eq!(stats.size_candidates, 0);
}

#[test]
fn test_same_prefix_different_tail() {
    let dir = tempdir().unwrap();
    let mut a = vec![7u8; 1024 * 1024 + 10];
    let b = a.clone();
    *a.last_mut().unwrap() = 8;
    let pa = write(dir.path(), "a.iso", &a);
    let pb = write(dir.path(), "b.iso", &b);

    let (groups, stats) = DuplicateFinder::with_defaults()
        .find_duplicates(&[pa.clone(), pb.clone()], &[pa, pb])
        .unwrap();
    assert!(groups.is_empty());
    assert_eq!(stats.prehash_candidates, 2);
    assert_eq!(stats.fullhash_candidates, 0);
}

#[test]
fn test_vanished_file_is_dropped() {
    let dir = tempdir().unwrap();
    let a = write(dir.path(), "a.txt", b"dup");
    let b = write(dir.path(), "b.txt", b"dup");
    let ghost = dir.path().join("ghost.txt");

    let paths = vec![a, b, ghost];
    let (groups, stats) = DuplicateFinder::with_defaults()
        .find_duplicates(&paths, &paths)
        .unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(stats.unreadable_files, 1);
}

#[test]
fn test_several_clusters_are_separate_groups() {
    let dir = tempdir().unwrap();
    let mut paths = Vec::new();
    for (i, content) in ["aa", "bb", "aa", "cc", "bb", "aa"].iter().enumerate() {
        paths.push(write(dir.path(), &format!("f{i}.dat"), content.as_bytes()));
    }

    let (groups, _) = DuplicateFinder::new(FinderConfig::default().with_hash_batch_size(1))
        .find_duplicates(&paths, &paths)
        .unwrap();
    let mut sizes: Vec<usize> = groups.iter().map(|g| g.len()).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![2, 3]);
    assert_eq!(groups.duplicate_count(), 3);
}

#[derive(Default)]
struct PhaseLog {
    phases: Mutex<Vec<String>>,
    fractions: Mutex<Vec<f64>>,
}

impl ProgressCallback for PhaseLog {
    fn on_phase_start(&self, phase: &str, _total: u64, _units: RateModel) {
        self.phases.lock().unwrap().push(phase.to_string());
    }

    fn on_update(&self, snapshot: &ProgressSnapshot) {
        self.fractions.lock().unwrap().push(snapshot.fraction);
    }

    fn on_phase_end(&self, _phase: &str) {}
}

#[test]
fn test_progress_fractions_stay_in_range() {
    let dir = tempdir().unwrap();
    let mut paths = Vec::new();
    for i in 0..20 {
        paths.push(write(dir.path(), &format!("f{i}.dat"), format!("{}", i % 4).as_bytes()));
    }

    let log = Arc::new(PhaseLog::default());
    let finder = DuplicateFinder::new(
        FinderConfig::default()
            .with_stat_batch_size(3)
            .with_hash_batch_size(2)
            .with_progress(log.clone()),
    );
    finder.find_duplicates(&paths, &paths).unwrap();

    assert!(log.phases.lock().unwrap().contains(&"size".to_string()));
    let fractions = log.fractions.lock().unwrap();
    assert!(!fractions.is_empty());
    assert!(fractions.iter().all(|f| (0.0..=1.0).contains(f)));
}
