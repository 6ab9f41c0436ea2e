use copyall::actions::{
    ErrorKind, TransferConfig, TransferEngine, TransferError, TransferMode,
};
use copyall::duplicates::DuplicateFinder;
use copyall::progress::{ProgressCallback, ProgressSnapshot, RateModel};
use copyall::scanner::{Filelist, Filters};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

fn write(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn count_files(dir: &Path) -> usize {
    Filelist::new(dir, Filters::default()).unwrap().len()
}

#[test]
fn test_copy_onto_identical_file_writes_nothing() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    write(&input, "x.jpg", b"jpeg bytes");
    write(&output, "x.jpg", b"jpeg bytes");

    let engine = TransferEngine::new(TransferConfig::new(TransferMode::Copy));
    let report = engine.run(&input, Some(&output), Filters::default()).unwrap();

    assert_eq!(count_files(&output), 1);
    assert_eq!(report.summary.count(ErrorKind::NameConflictUnchanged), 1);
    assert_eq!(report.summary.total(), 1);
    assert_eq!(report.error_count(), 0);
    assert!(report.is_complete_success());
}

#[test]
fn test_copy_onto_different_file_renames() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    write(&input, "report.pdf", b"version two");
    write(&output, "report.pdf", b"version one");
    write(&output, "report (1).pdf", b"another one");

    let engine = TransferEngine::new(TransferConfig::new(TransferMode::Copy));
    let report = engine.run(&input, Some(&output), Filters::default()).unwrap();

    assert_eq!(report.summary.count(ErrorKind::NameConflictResolvedByRename), 1);
    assert_eq!(fs::read(output.join("report.pdf")).unwrap(), b"version one");
    assert_eq!(fs::read(output.join("report (1).pdf")).unwrap(), b"another one");
    assert_eq!(fs::read(output.join("report (2).pdf")).unwrap(), b"version two");
}

#[test]
fn test_suffixed_identical_copy_is_detected() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    write(&input, "song.mp3", b"the real song");
    write(&output, "song.mp3", b"a different song");
    write(&output, "song (1).mp3", b"the real song");

    let engine = TransferEngine::new(TransferConfig::new(TransferMode::Copy));
    let report = engine.run(&input, Some(&output), Filters::default()).unwrap();

    assert_eq!(report.summary.count(ErrorKind::NameConflictUnchanged), 1);
    assert_eq!(count_files(&output), 2);
}

#[test]
fn test_retries_exhausted() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    write(&input, "a.txt", b"mine");
    write(&output, "a.txt", b"theirs 0");
    write(&output, "a (1).txt", b"theirs 1");
    write(&output, "a (2).txt", b"theirs 2");

    let engine =
        TransferEngine::new(TransferConfig::new(TransferMode::Copy).with_max_retries(2));
    let report = engine.run(&input, Some(&output), Filters::default()).unwrap();

    assert_eq!(report.summary.count(ErrorKind::NameConflictUnresolved), 1);
    assert_eq!(report.error_count(), 1);
    assert_eq!(report.processed_files, 0);
    assert_eq!(report.failed_files, 1);
    assert_eq!(count_files(&output), 3);
}

#[test]
fn test_move_mirrors_structure_and_empties_input() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    write(&input, "2024/01/a.jpg", b"a");
    write(&input, "2024/02/b.jpg", b"b");
    write(&input, "readme.txt", b"keep me");

    let engine = TransferEngine::new(TransferConfig::new(TransferMode::Move));
    let filters = Filters::default().with_extensions(vec![".jpg".into()]);
    let report = engine.run(&input, Some(&output), filters).unwrap();

    assert_eq!(report.processed_files, 2);
    assert!(output.join("2024/01/a.jpg").exists());
    assert!(output.join("2024/02/b.jpg").exists());
    assert!(!input.join("2024/01/a.jpg").exists());
    assert!(input.join("readme.txt").exists());
}

#[test]
fn test_concurrent_flatten_move_loses_nothing() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    let mut expected = Vec::new();
    for d in 0..4 {
        for f in 0..100 {
            let content = format!("dir {d} file {f}");
            write(&input, &format!("d{d}/f{f}.dat"), content.as_bytes());
            expected.push(content.into_bytes());
        }
    }
    expected.sort();

    let engine = TransferEngine::new(
        TransferConfig::new(TransferMode::Move)
            .with_keep_structure(false)
            .with_io_threads(8)
            .with_batch_size(1),
    );
    let report = engine.run(&input, Some(&output), Filters::default()).unwrap();

    assert_eq!(report.failed_files, 0);
    assert_eq!(report.summary.count(ErrorKind::NameConflictResolvedByRename), 300);
    assert_eq!(count_files(&input), 0);

    let out = Filelist::new(&output, Filters::default()).unwrap();
    let mut moved: Vec<Vec<u8>> = out.paths().iter().map(|p| fs::read(p).unwrap()).collect();
    moved.sort();
    assert_eq!(moved, expected);
}

#[test]
fn test_nothing_selected_leaves_output_uncreated() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    write(&input, "a.txt", b"a");

    let engine = TransferEngine::new(TransferConfig::new(TransferMode::Copy));
    let filters = Filters::default().with_min_size(1_000);
    let report = engine.run(&input, Some(&output), filters).unwrap();

    assert_eq!(report.total_files, 0);
    assert!(report.summary.is_empty());
    assert!(!output.exists());
}

#[test]
fn test_configuration_errors_touch_nothing() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in");
    write(&input, "a.txt", b"a");

    let engine = TransferEngine::new(TransferConfig::new(TransferMode::PermanentDelete));
    let err = engine.run(&input, None, Filters::default()).unwrap_err();
    assert!(matches!(err, TransferError::ConfirmationRequired));
    assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    assert!(input.join("a.txt").exists());

    let engine = TransferEngine::new(TransferConfig::new(TransferMode::Move));
    let err = engine.run(&input, None, Filters::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    assert!(input.join("a.txt").exists());
}

#[derive(Default)]
struct Recorder {
    units: Mutex<Option<RateModel>>,
    snapshots: Mutex<Vec<ProgressSnapshot>>,
}

impl ProgressCallback for Recorder {
    fn on_phase_start(&self, _phase: &str, _total: u64, units: RateModel) {
        *self.units.lock().unwrap() = Some(units);
    }

    fn on_update(&self, snapshot: &ProgressSnapshot) {
        self.snapshots.lock().unwrap().push(snapshot.clone());
    }

    fn on_phase_end(&self, _phase: &str) {}
}

#[test]
fn test_progress_denominator_excludes_failures() {
    let dir = tempdir().unwrap();
    let mut paths = Vec::new();
    for i in 0..10 {
        let path = dir.path().join(format!("f{i}.tmp"));
        if i % 3 != 0 {
            fs::write(&path, b"x").unwrap();
        }
        paths.push(path);
    }
    // f0, f3, f6, f9 never existed
    let recorder = Arc::new(Recorder::default());
    let engine = TransferEngine::new(
        TransferConfig::new(TransferMode::PermanentDelete)
            .with_confirm_permanent_delete(true)
            .with_batch_size(3)
            .with_progress(recorder.clone()),
    );
    let report = engine.discard(&paths).unwrap();

    assert_eq!(report.total_files, 10);
    assert_eq!(report.failed_files, 4);
    assert_eq!(report.processed_files, 6);
    assert_eq!(report.summary.count(ErrorKind::SourceVanished), 4);
    assert_eq!(report.fraction(), 1.0);

    assert_eq!(*recorder.units.lock().unwrap(), Some(RateModel::Files));
    let snapshots = recorder.snapshots.lock().unwrap();
    assert_eq!(snapshots.len(), 4);
    assert!(snapshots.iter().all(|s| (0.0..=1.0).contains(&s.fraction)));
    assert!(snapshots.iter().all(|s| s.processed <= s.total));
    assert_eq!(snapshots.iter().map(|s| s.fraction).fold(0.0, f64::max), 1.0);
}

#[test]
fn test_copy_reports_bytes() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    write(&input, "a.bin", &[1u8; 300]);
    write(&input, "b.bin", &[2u8; 700]);

    let recorder = Arc::new(Recorder::default());
    let engine = TransferEngine::new(
        TransferConfig::new(TransferMode::Copy).with_progress(recorder.clone()),
    );
    let report = engine.run(&input, Some(&output), Filters::default()).unwrap();

    assert_eq!(report.rate_model, RateModel::Bytes);
    assert_eq!(report.total_bytes, 1000);
    assert_eq!(report.processed_bytes, 1000);
    assert_eq!(*recorder.units.lock().unwrap(), Some(RateModel::Bytes));
    let last = recorder.snapshots.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last.processed, 1000);
    assert_eq!(last.fraction, 1.0);
}

#[test]
fn test_dedupe_then_delete_removable() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a/1.txt", b"0123456789");
    write(dir.path(), "a/2.txt", b"0123456789");
    write(dir.path(), "b/3.txt", b"abcdefghij");

    let list = Filelist::new(dir.path(), Filters::default()).unwrap();
    let (groups, _) = DuplicateFinder::with_defaults()
        .find_in_filelists(&list, &list)
        .unwrap();

    let engine = TransferEngine::new(
        TransferConfig::new(TransferMode::PermanentDelete).with_confirm_permanent_delete(true),
    );
    let report = engine.discard(&groups.removable()).unwrap();

    assert_eq!(report.processed_files, 1);
    assert!(dir.path().join("a/1.txt").exists());
    assert!(!dir.path().join("a/2.txt").exists());
    assert!(dir.path().join("b/3.txt").exists());
}

#[test]
fn test_report_serializes() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    write(&input, "x.jpg", b"same");
    write(&output, "x.jpg", b"same");

    let engine = TransferEngine::new(TransferConfig::new(TransferMode::Copy));
    let report = engine.run(&input, Some(&output), Filters::default()).unwrap();
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["mode"], "Copy");
    assert_eq!(json["rate_model"], "bytes");
    assert_eq!(json["summary"]["NameConflictUnchanged"], 1);
}
