use clap::Parser;
use copyall::cli::Cli;
use copyall::config::{Config, ConfigError};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use std::fs;
use std::sync::Mutex;
use tempfile::tempdir;

static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Clear all COPYALL_* environment variables to avoid interference.
fn clear_env() {
    for (key, _) in std::env::vars() {
        if key.starts_with("COPYALL_") {
            std::env::remove_var(key);
        }
    }
}

#[test]
fn test_config_load_defaults() {
    let figment = Figment::from(Serialized::defaults(Config::default()));
    let config: Config = figment.extract().unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.io_threads, 4);
    assert_eq!(config.max_rename_retries, 100);
}

#[test]
fn test_config_load_from_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        r#"
io_threads = 8
max_rename_retries = 10
transfer_batch_size = 64
match_extensions = false
"#,
    )
    .unwrap();

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&config_path))
        .extract()
        .unwrap();

    assert_eq!(config.io_threads, 8);
    assert_eq!(config.max_rename_retries, 10);
    assert_eq!(config.transfer_batch_size, 64);
    assert!(!config.match_extensions);
    assert_eq!(config.hash_batch_size, 256);
}

#[test]
fn test_config_hierarchy_file_env_cli() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "io_threads = 8\nbar_width = 60\n").unwrap();

    std::env::set_var("COPYALL_BAR_WIDTH", "40");
    let mut config = Config::try_load_from_path(&config_path).unwrap();
    assert_eq!(config.io_threads, 8);
    assert_eq!(config.bar_width, 40);

    let cli = Cli::try_parse_from(["copyall", "--io-threads", "2", "count", "."]).unwrap();
    config.merge_cli(&cli);
    assert_eq!(config.io_threads, 2);
    assert_eq!(config.bar_width, 40);

    clear_env();
}

#[test]
fn test_env_prefix_and_split() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    std::env::set_var("COPYALL_STAT_BATCH_SIZE", "500");

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed("COPYALL_").split("__"))
        .extract()
        .unwrap();
    assert_eq!(config.stat_batch_size, 500);

    clear_env();
}

#[test]
fn test_missing_file_uses_defaults() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let temp_dir = tempdir().unwrap();
    let config = Config::try_load_from_path(&temp_dir.path().join("nope.toml")).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_invalid_values_rejected() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    fs::write(&config_path, "io_threads = 0\n").unwrap();
    let err = Config::try_load_from_path(&config_path).unwrap_err();
    assert!(matches!(err, ConfigError::Zero { field: "io_threads" }));

    fs::write(&config_path, "io_threads = \"many\"\n").unwrap();
    let err = Config::try_load_from_path(&config_path).unwrap_err();
    assert!(matches!(err, ConfigError::Load(_)));

    // The forgiving loader falls back to defaults
    assert_eq!(Config::load_from_path(&config_path), Config::default());
}

#[test]
fn test_save_then_load() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("sub/config.toml");
    let config = Config {
        max_rename_retries: 7,
        ..Config::default()
    };
    config.save(&config_path).unwrap();
    assert_eq!(Config::try_load_from_path(&config_path).unwrap(), config);
}
