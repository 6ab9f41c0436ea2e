use clap::Parser;
use copyall::cli::Cli;
use copyall::error::ExitCode;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn write(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn run(args: &[&str], config: &Path) -> anyhow::Result<ExitCode> {
    let config = config.to_string_lossy().into_owned();
    let mut argv = vec!["copyall", "-q", "--config", config.as_str()];
    argv.extend_from_slice(args);
    copyall::run_app(Cli::try_parse_from(argv)?)
}

#[test]
fn test_transfer_copy_end_to_end() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    let config = dir.path().join("config.toml");
    write(&input, "a/photo.jpg", b"jpg");
    write(&input, "b/doc.txt", b"txt");

    let code = run(
        &[
            "transfer",
            input.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
            "-e",
            "jpg",
            "--flatten",
        ],
        &config,
    )
    .unwrap();

    assert_eq!(code, ExitCode::Success);
    assert!(output.join("photo.jpg").exists());
    assert!(!output.join("doc.txt").exists());
}

#[test]
fn test_transfer_delete_without_confirmation() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in");
    let config = dir.path().join("config.toml");
    write(&input, "a.txt", b"a");

    let err = run(
        &["transfer", input.to_str().unwrap(), "--mode", "delete"],
        &config,
    )
    .unwrap_err();

    assert_eq!(ExitCode::for_error(&err), ExitCode::InvalidConfiguration);
    assert!(input.join("a.txt").exists());
}

#[test]
fn test_missing_input_is_invalid_configuration() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.toml");
    let missing = dir.path().join("missing");

    let err = run(&["count", missing.to_str().unwrap()], &config).unwrap_err();
    assert_eq!(ExitCode::for_error(&err), ExitCode::InvalidConfiguration);
}

#[test]
fn test_dupes_delete_end_to_end() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("data");
    let config = dir.path().join("config.toml");
    write(&root, "a/1.txt", b"0123456789");
    write(&root, "a/2.txt", b"0123456789");
    write(&root, "b/3.txt", b"abcdefghij");

    let code = run(
        &[
            "dupes",
            root.to_str().unwrap(),
            "--delete",
            "--confirm-permanent-delete",
        ],
        &config,
    )
    .unwrap();

    assert_eq!(code, ExitCode::Success);
    assert!(root.join("a/1.txt").exists());
    assert!(!root.join("a/2.txt").exists());
    assert!(root.join("b/3.txt").exists());
}

#[test]
fn test_extensions_and_count() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("data");
    let config = dir.path().join("config.toml");
    write(&root, "x.rs", b"fn main() {}");
    write(&root, "y.toml", b"[package]");

    let code = run(&["extensions", root.to_str().unwrap()], &config).unwrap();
    assert_eq!(code, ExitCode::Success);
    let code = run(&["count", root.to_str().unwrap(), "--json"], &config).unwrap();
    assert_eq!(code, ExitCode::Success);
}
